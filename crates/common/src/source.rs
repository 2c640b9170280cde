use async_trait::async_trait;

use crate::{Candle, Interval, Result};

/// Abstraction over wherever klines come from.
///
/// `BinanceFuturesClient` implements this against the live REST API.
/// `ReplaySource` implements this over a fixed, preloaded sequence.
///
/// The evaluator calls `candle` once per step and awaits each call before
/// issuing the next, so implementations never see concurrent requests from
/// a single evaluation.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// The candle for `symbol` whose interval covers `open_time`.
    async fn candle(&self, symbol: &str, open_time: i64, interval: Interval) -> Result<Candle>;
}
