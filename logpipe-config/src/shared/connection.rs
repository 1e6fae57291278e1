use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions as SqlxConnectOptions, PgSslMode as SqlxSslMode};
use std::sync::LazyLock;

use crate::shared::ValidationError;
use crate::shared::base::require_non_empty;

/// Session settings shared by every connection to the sink database.
const COMMON_DATESTYLE: &str = "ISO";
const COMMON_CLIENT_ENCODING: &str = "UTF8";
const COMMON_TIMEZONE: &str = "UTC";

const APP_NAME_SINK: &str = "logpipe_sink";
const APP_NAME_MIGRATIONS: &str = "logpipe_migrations";

/// Options for the batch insert connections.
pub static LOGPIPE_SINK_OPTIONS: LazyLock<PgConnectionOptions> =
    LazyLock::new(|| PgConnectionOptions {
        datestyle: COMMON_DATESTYLE.to_string(),
        client_encoding: COMMON_CLIENT_ENCODING.to_string(),
        timezone: COMMON_TIMEZONE.to_string(),
        statement_timeout: 30_000,
        lock_timeout: 10_000,
        idle_in_transaction_session_timeout: 60_000,
        application_name: APP_NAME_SINK.to_string(),
    });

/// Options for the schema migration connection, which may build indexes on a large table.
pub static LOGPIPE_MIGRATION_OPTIONS: LazyLock<PgConnectionOptions> =
    LazyLock::new(|| PgConnectionOptions {
        datestyle: COMMON_DATESTYLE.to_string(),
        client_encoding: COMMON_CLIENT_ENCODING.to_string(),
        timezone: COMMON_TIMEZONE.to_string(),
        statement_timeout: 300_000,
        lock_timeout: 10_000,
        idle_in_transaction_session_timeout: 60_000,
        application_name: APP_NAME_MIGRATIONS.to_string(),
    });

/// Runtime parameters sent with every new Postgres session.
#[derive(Debug, Clone)]
pub struct PgConnectionOptions {
    pub datestyle: String,
    pub client_encoding: String,
    pub timezone: String,
    pub statement_timeout: u32,
    pub lock_timeout: u32,
    pub idle_in_transaction_session_timeout: u32,
    pub application_name: String,
}

impl PgConnectionOptions {
    pub fn to_key_value_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("datestyle".to_string(), self.datestyle.clone()),
            ("client_encoding".to_string(), self.client_encoding.clone()),
            ("timezone".to_string(), self.timezone.clone()),
            (
                "statement_timeout".to_string(),
                self.statement_timeout.to_string(),
            ),
            ("lock_timeout".to_string(), self.lock_timeout.to_string()),
            (
                "idle_in_transaction_session_timeout".to_string(),
                self.idle_in_transaction_session_timeout.to_string(),
            ),
            (
                "application_name".to_string(),
                self.application_name.clone(),
            ),
        ]
    }
}

/// Connection settings of the sink database.
#[derive(Debug, Clone, Deserialize)]
pub struct PgConnectionConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub password: Option<SecretString>,
    #[serde(default = "TlsConfig::disabled")]
    pub tls: TlsConfig,
}

impl PgConnectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("database.host", &self.host)?;
        require_non_empty("database.name", &self.name)?;
        require_non_empty("database.username", &self.username)?;
        self.tls.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    pub trusted_root_certs: String,
    pub enabled: bool,
}

impl TlsConfig {
    pub fn disabled() -> Self {
        Self {
            trusted_root_certs: "".to_string(),
            enabled: false,
        }
    }

    /// Checks that certificates are present when TLS is enabled.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

/// Converts a connection config into crate specific connect options.
pub trait IntoConnectOptions<Output> {
    /// Options for the server without selecting a database.
    fn without_db(&self, options: Option<&PgConnectionOptions>) -> Output;

    /// Options for the configured database.
    fn with_db(&self, options: Option<&PgConnectionOptions>) -> Output;
}

impl IntoConnectOptions<SqlxConnectOptions> for PgConnectionConfig {
    fn without_db(&self, options: Option<&PgConnectionOptions>) -> SqlxConnectOptions {
        let ssl_mode = if self.tls.enabled {
            SqlxSslMode::VerifyFull
        } else {
            SqlxSslMode::Prefer
        };
        let mut connect_options = SqlxConnectOptions::new_without_pgpass()
            .host(&self.host)
            .username(&self.username)
            .port(self.port)
            .ssl_mode(ssl_mode);

        if self.tls.enabled {
            connect_options = connect_options
                .ssl_root_cert_from_pem(self.tls.trusted_root_certs.clone().into_bytes());
        }

        if let Some(password) = &self.password {
            connect_options = connect_options.password(password.expose_secret());
        }

        if let Some(opts) = options {
            connect_options = connect_options.options(opts.to_key_value_pairs());
        }

        connect_options
    }

    fn with_db(&self, options: Option<&PgConnectionOptions>) -> SqlxConnectOptions {
        let connect_options: SqlxConnectOptions = self.without_db(options);
        connect_options.database(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(tls: TlsConfig) -> PgConnectionConfig {
        PgConnectionConfig {
            host: "localhost".to_owned(),
            port: 5432,
            name: "logs".to_owned(),
            username: "postgres".to_owned(),
            password: None,
            tls,
        }
    }

    #[test]
    fn tls_without_certificates_is_rejected() {
        let tls = TlsConfig {
            trusted_root_certs: String::new(),
            enabled: true,
        };

        assert_eq!(
            config(tls).validate(),
            Err(ValidationError::MissingTrustedRootCerts)
        );
        assert!(config(TlsConfig::disabled()).validate().is_ok());
    }

    #[test]
    fn sink_options_carry_application_name() {
        let pairs = LOGPIPE_SINK_OPTIONS.to_key_value_pairs();

        assert!(pairs.contains(&("application_name".to_string(), "logpipe_sink".to_string())));
        assert!(pairs.contains(&("timezone".to_string(), "UTC".to_string())));
    }

    #[test]
    fn connect_options_select_database() {
        let options: SqlxConnectOptions =
            config(TlsConfig::disabled()).with_db(Some(&LOGPIPE_SINK_OPTIONS));

        assert_eq!(options.get_database(), Some("logs"));
        assert_eq!(options.get_port(), 5432);
    }
}
