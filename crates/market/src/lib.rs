pub mod binance;
pub mod lookback;
pub mod replay;

pub use binance::BinanceFuturesClient;
pub use lookback::fetch_lookback;
pub use replay::ReplaySource;
