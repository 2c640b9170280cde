use thiserror::Error;

use crate::Candle;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The candle source failed mid-evaluation. `consumed` holds every candle
    /// retrieved before the failing step.
    #[error("Candle source unavailable at step {step}: {source}")]
    SourceUnavailable {
        step: usize,
        #[source]
        source: Box<Error>,
        consumed: Vec<Candle>,
    },

    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("No kline for {symbol} at {open_time}")]
    MissingKline { symbol: String, open_time: i64 },

    #[error("Malformed kline: {0}")]
    MalformedKline(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
