use tracing::debug;

use common::{Candle, CandleSource, Error, Interval, IntervalTable, Result};

/// Fetch the `period + 1` candles immediately preceding `before`, oldest
/// first. This is the window an RSI of `period` needs at the alert time.
///
/// Requests are issued one at a time; the first failure aborts the fetch.
pub async fn fetch_lookback(
    source: &dyn CandleSource,
    symbol: &str,
    before: i64,
    interval: Interval,
    period: usize,
    intervals: &IntervalTable,
) -> Result<Vec<Candle>> {
    let duration = intervals.duration_ms(interval);
    let count = period + 1;
    let mut window = Vec::with_capacity(count);

    for k in 0..count {
        let at = i64::try_from(count - k)
            .ok()
            .and_then(|offset| offset.checked_mul(duration))
            .and_then(|span| before.checked_sub(span))
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "lookback of {count} {interval} candles before {before} overflows the timestamp range"
                ))
            })?;
        window.push(source.candle(symbol, at, interval).await?);
    }

    debug!(symbol, %interval, candles = window.len(), "Lookback window fetched");
    Ok(window)
}
