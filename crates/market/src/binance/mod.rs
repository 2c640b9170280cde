pub mod futures;

pub use futures::BinanceFuturesClient;
