use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use common::{Candle, CandleSource, Error, Interval, IntervalTable, Result};

/// Candle source backed by a fixed, preloaded sequence.
///
/// A request for time `t` is answered with the candle whose interval covers
/// `t` (`open_time <= t < open_time + duration`). Nothing is ever fetched,
/// so evaluations against a replay are fully deterministic.
pub struct ReplaySource {
    candles: Vec<Candle>,
    intervals: IntervalTable,
    /// Number of candles handed out so far.
    requests: AtomicUsize,
}

impl ReplaySource {
    pub fn new(mut candles: Vec<Candle>, intervals: IntervalTable) -> Self {
        candles.sort_by_key(|c| c.open_time);
        info!(candles = candles.len(), "ReplaySource initialized");
        Self {
            candles,
            intervals,
            requests: AtomicUsize::new(0),
        }
    }

    /// Load a JSON array of candles, as written in the `data` field of an
    /// evaluation result. Every candle must satisfy the OHLC invariants.
    pub fn from_json_file(path: impl AsRef<Path>, intervals: IntervalTable) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let candles: Vec<Candle> = serde_json::from_str(&content)?;
        for candle in &candles {
            candle.validate()?;
        }
        Ok(Self::new(candles, intervals))
    }

    /// How many candles this source has served.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }
}

#[async_trait]
impl CandleSource for ReplaySource {
    async fn candle(&self, symbol: &str, open_time: i64, interval: Interval) -> Result<Candle> {
        let duration = self.intervals.duration_ms(interval);
        let found = self
            .candles
            .iter()
            .find(|c| c.open_time <= open_time && open_time < c.open_time.saturating_add(duration))
            .cloned()
            .ok_or_else(|| Error::MissingKline {
                symbol: symbol.to_string(),
                open_time,
            })?;

        self.requests.fetch_add(1, Ordering::Relaxed);
        debug!(symbol, open_time, candle_open = found.open_time, "Replayed kline");
        Ok(found)
    }
}
