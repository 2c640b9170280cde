use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use common::{Direction, Error, EvaluationRequest, Interval, IntervalTable, Result};

use crate::indicators::RsiIndicator;

/// Evaluator config file (TOML).
///
/// Example `config/evaluator.toml`:
/// ```toml
/// [defaults]
/// interval = "3m"
/// max_steps = 7
/// deviation_threshold_pct = 4.0
/// direction = "fall"
/// rsi_period = 14
/// rsi_interval = "1m"
///
/// [intervals]
/// "1m" = 60000
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EvaluatorFileConfig {
    #[serde(default)]
    pub defaults: EvaluationDefaults,
    /// Interval duration overrides in milliseconds, keyed by interval token.
    #[serde(default)]
    pub intervals: BTreeMap<String, i64>,
}

/// Fallback values for anything the caller leaves unset.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EvaluationDefaults {
    pub interval: Interval,
    pub max_steps: usize,
    pub deviation_threshold_pct: f64,
    pub direction: Direction,
    /// RSI lookback period printed alongside each evaluation.
    pub rsi_period: usize,
    pub rsi_interval: Interval,
}

impl Default for EvaluationDefaults {
    fn default() -> Self {
        Self {
            interval: Interval::default(),
            max_steps: EvaluationRequest::DEFAULT_MAX_STEPS,
            deviation_threshold_pct: EvaluationRequest::DEFAULT_DEVIATION_THRESHOLD_PCT,
            direction: Direction::default(),
            rsi_period: RsiIndicator::DEFAULT_PERIOD,
            rsi_interval: Interval::default(),
        }
    }
}

impl EvaluatorFileConfig {
    /// Load from a TOML file. A missing file yields the built-in defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No evaluator config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let cfg = Self::parse(&content)?;
        info!(path = %path.display(), overrides = cfg.intervals.len(), "Loaded evaluator config");
        Ok(cfg)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        cfg.interval_table()?;
        Ok(cfg)
    }

    /// Default interval table with this file's overrides applied.
    pub fn interval_table(&self) -> Result<IntervalTable> {
        let mut table = IntervalTable::default();
        for (token, duration_ms) in &self.intervals {
            table.set(token.parse()?, *duration_ms)?;
        }
        Ok(table)
    }
}
