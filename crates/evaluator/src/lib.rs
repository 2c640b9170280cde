pub mod config;
pub mod evaluator;
pub mod indicators;
pub mod series;

pub use config::{EvaluationDefaults, EvaluatorFileConfig};
pub use evaluator::{price_change_pct, SignalEvaluator};
pub use indicators::RsiIndicator;
pub use series::close_prices;
