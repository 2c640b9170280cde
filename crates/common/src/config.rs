use std::time::Duration;

use crate::{Error, Result};

const DEFAULT_FUTURES_URL: &str = "https://fapi.binance.com";

/// Runtime configuration loaded from environment variables at startup.
/// Every variable is optional; malformed values are a configuration error.
#[derive(Debug, Clone)]
pub struct Config {
    // Exchange
    pub futures_base_url: String,
    pub http_timeout: Duration,

    // Evaluator defaults file
    pub evaluator_config_path: String,
}

impl Config {
    /// Load configuration from the environment, reading `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let http_timeout_secs = match optional_env("HTTP_TIMEOUT_SECS") {
            Some(v) => v.trim().parse::<u64>().map_err(|_| {
                Error::Config(format!("HTTP_TIMEOUT_SECS must be a whole number, got '{v}'"))
            })?,
            None => 10,
        };

        Ok(Config {
            futures_base_url: optional_env("BINANCE_FUTURES_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_FUTURES_URL.to_string()),
            http_timeout: Duration::from_secs(http_timeout_secs),
            evaluator_config_path: optional_env("EVALUATOR_CONFIG_PATH")
                .unwrap_or_else(|| "config/evaluator.toml".to_string()),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            futures_base_url: DEFAULT_FUTURES_URL.to_string(),
            http_timeout: Duration::from_secs(10),
            evaluator_config_path: "config/evaluator.toml".to_string(),
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
