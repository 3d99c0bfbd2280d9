use crate::error::ConfigError;
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File, FileFormat};
use std::path::Path;

// Declare the modules that make up this crate.
pub mod credentials;
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use settings::{
    Config, CredentialsConfig, FilterRuleConfig, LoggingConfig, ServerConfig, SessionConfig,
    DEFAULT_SERVER_URL,
};

/// Prefix of the environment variables that override file settings,
/// e.g. `KLINEWATCH__SERVER__BASE_URL`.
const ENV_PREFIX: &str = "KLINEWATCH";

/// Loads the application configuration.
///
/// Built-in defaults come first, then the TOML file (required when `path` is
/// given, otherwise an optional `klinewatch.toml` in the working directory),
/// then `KLINEWATCH__*` environment variables.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name("klinewatch").required(false),
    };

    let builder = defaults()?
        .add_source(file)
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;
    Ok(config)
}

/// Loads the configuration from an in-memory TOML document layered over the
/// defaults. Environment variables are not consulted.
pub fn load_config_from_str(toml: &str) -> Result<Config, ConfigError> {
    let config = defaults()?
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()?
        .try_deserialize::<Config>()?;
    config.validate()?;
    Ok(config)
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let session = SessionConfig::default();
    Ok(config::Config::builder()
        .set_default("server.base_url", DEFAULT_SERVER_URL)?
        .set_default("server.request_timeout_secs", 30_i64)?
        .set_default("session.backoff_ms", session.backoff_ms as i64)?
        .set_default("session.error_threshold", session.error_threshold as i64)?
        .set_default("session.stale_request_secs", session.stale_request_secs as i64)?
        .set_default(
            "session.maintenance_interval_secs",
            session.maintenance_interval_secs as i64,
        )?
        .set_default("credentials.path", "klinewatch-credentials.json")?
        .set_default("logging.level", "info")?
        .set_default("logging.file_prefix", "klinewatch.log")?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::IntervalCode;

    #[test]
    fn empty_document_yields_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.server.base_url, DEFAULT_SERVER_URL);
        assert_eq!(config.session.backoff_ms, 5000);
        assert_eq!(config.session.error_threshold, 10);
        assert_eq!(config.session.stale_request_secs, 600);
        assert!(config.logging.directory.is_none());
        assert!(config.filter.is_empty());
    }

    #[test]
    fn file_values_override_defaults() {
        let config = load_config_from_str(
            r#"
            [server]
            base_url = "http://localhost:59923"

            [session]
            backoff_ms = 250

            [[filter]]
            exchange = "MEXC"
            interval = "15m"
            delta = 4.5
            volume = 800.0
            "#,
        )
        .unwrap();

        assert_eq!(config.server.base_url, "http://localhost:59923");
        assert_eq!(config.session.backoff().as_millis(), 250);
        let rules = config.filter_rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].symbol, "ALL");
        assert_eq!(rules[0].interval, IntervalCode::Min15);
    }

    #[test]
    fn unknown_filter_interval_is_rejected() {
        let err = load_config_from_str(
            r#"
            [[filter]]
            exchange = "MEXC"
            interval = "2h"
            delta = 4.5
            volume = 800.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn zero_backoff_is_rejected() {
        let err = load_config_from_str("[session]\nbackoff_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
