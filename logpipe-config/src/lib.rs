//! Configuration types and loading for the log pipeline services.
//!
//! Configuration is layered from `configuration/base.*`, `configuration/{environment}.*` and
//! `APP_`-prefixed environment variables. See [`load_config`].

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from};
