use common::Candle;

/// Close prices of `candles`, in the same order. Input for RSI and moving
/// averages.
pub fn close_prices(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}
