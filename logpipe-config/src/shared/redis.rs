use secrecy::SecretString;
use serde::Deserialize;

use crate::shared::ValidationError;
use crate::shared::base::require_non_empty;

/// Connection settings of the Redis server hosting the durable log.
#[derive(Clone, Debug, Deserialize)]
pub struct RedisConfig {
    /// Host on which Redis is running (e.g. localhost or an IP address).
    pub host: String,
    /// Port on which Redis is listening.
    pub port: u16,
    /// ACL user name, if any.
    #[serde(default)]
    pub username: Option<String>,
    /// Password, redacted in debug output.
    #[serde(default)]
    pub password: Option<SecretString>,
}

impl RedisConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("redis.host", &self.host)
    }
}
