//! Layered configuration.
//!
//! Settings come from an optional `config/config.toml`, overridden by
//! environment variables prefixed with `STOCKLEDGER` (`__` separates
//! sections, e.g. `STOCKLEDGER__DATABASE__URL`).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use crate::pool::config::*;

const CONFIG_FILE: &str = "config/config.toml";
const ENV_PREFIX: &str = "STOCKLEDGER";

/// `[ledger]` section of the configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSettings {
    /// How many recent transactions `get_material` returns
    #[serde(default = "default_recent_transactions_limit")]
    pub recent_transactions_limit: usize,
    /// Author recorded when a request names none
    #[serde(default = "default_author")]
    pub default_author: String,
    /// Re-evaluate stock alerts on every mutation
    #[serde(default = "default_alerts_enabled")]
    pub alerts_enabled: bool,
}

fn default_recent_transactions_limit() -> usize {
    50
}

fn default_author() -> String {
    "System".to_string()
}

fn default_alerts_enabled() -> bool {
    true
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            recent_transactions_limit: default_recent_transactions_limit(),
            default_author: default_author(),
            alerts_enabled: default_alerts_enabled(),
        }
    }
}

/// Full application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockLedgerConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ledger: LedgerSettings,
}

impl StockLedgerConfig {
    /// Load from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                if std::path::Path::new(CONFIG_FILE).exists() {
                    log::warn!(
                        "Failed to load {}, falling back to environment: {}",
                        CONFIG_FILE,
                        err
                    );
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        settings.try_deserialize::<StockLedgerConfig>().map_err(|e| {
            ConfigError::Message(format!("Configuration could not be deserialized: {}", e))
        })
    }

    /// Parse a TOML document, ignoring the environment
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
