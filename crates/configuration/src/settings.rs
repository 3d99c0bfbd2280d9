use crate::error::ConfigError;
use core_types::{CoreError, FilterRule, IntervalCode};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "https://tradingcat.ru";

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub credentials: CredentialsConfig,
    pub logging: LoggingConfig,
    /// Rules pushed to the server once the first catalog has arrived.
    #[serde(default)]
    pub filter: Vec<FilterRuleConfig>,
}

/// Where the market-data service lives.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Scheme and host, without a trailing slash (e.g. "https://tradingcat.ru").
    pub base_url: String,
    /// Upper bound on a single HTTP exchange.
    pub request_timeout_secs: u64,
}

/// Timing and retry parameters of the session engine.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Fixed delay before every retry and between data polls.
    pub backoff_ms: u64,
    /// Consecutive transport errors tolerated before a forced relogin.
    pub error_threshold: u32,
    /// In-flight requests older than this are evicted by the maintenance sweep.
    pub stale_request_secs: u64,
    /// How often the maintenance sweep runs.
    pub maintenance_interval_secs: u64,
}

impl SessionConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn stale_request_age(&self) -> Duration {
        Duration::from_secs(self.stale_request_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs.max(1))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backoff_ms: 5000,
            error_threshold: 10,
            stale_request_secs: 600,
            maintenance_interval_secs: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// JSON file holding the stored user, password and auto-login flag.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive such as "info" or "engine=debug,info".
    pub level: String,
    /// When set, logs are also written to a daily-rolling file in this directory.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

/// A filter rule as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct FilterRuleConfig {
    pub exchange: String,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    pub interval: String,
    pub delta: f64,
    pub volume: f64,
}

fn default_symbol() -> String {
    "ALL".to_string()
}

impl FilterRuleConfig {
    pub fn to_rule(&self) -> Result<FilterRule, CoreError> {
        let interval = IntervalCode::parse(&self.interval);
        if !interval.is_known() {
            return Err(CoreError::InvalidInput(
                "interval".to_string(),
                self.interval.clone(),
            ));
        }
        Ok(FilterRule {
            exchange: self.exchange.clone(),
            symbol: self.symbol.clone(),
            interval,
            min_delta_percent: self.delta,
            min_volume: self.volume,
        })
    }
}

impl Config {
    /// Checks the invariants `serde` cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "server.base_url must not be empty".to_string(),
            ));
        }
        if self.session.backoff_ms == 0 {
            return Err(ConfigError::ValidationError(
                "session.backoff_ms must be positive".to_string(),
            ));
        }
        for rule in &self.filter {
            rule.to_rule()
                .map_err(|e| ConfigError::ValidationError(format!("filter: {e}")))?;
        }
        Ok(())
    }

    /// The configured startup filter, already validated.
    pub fn filter_rules(&self) -> Vec<FilterRule> {
        self.filter
            .iter()
            .filter_map(|rule| rule.to_rule().ok())
            .collect()
    }
}
