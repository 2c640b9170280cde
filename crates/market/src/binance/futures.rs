use async_trait::async_trait;
use reqwest::Client;
use serde::de::IgnoredAny;
use serde::Deserialize;
use tracing::debug;

use common::{Candle, CandleSource, Config, Error, Interval, Result};

const KLINES_PATH: &str = "/fapi/v1/klines";

/// REST client for Binance USDⓈ-M futures klines. Public market data only,
/// so requests are unsigned.
pub struct BinanceFuturesClient {
    base_url: String,
    http: Client,
}

impl BinanceFuturesClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            base_url: config.futures_base_url.clone(),
            http,
        })
    }

    async fn get(&self, url: &str) -> Result<String> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        Ok(body)
    }
}

#[async_trait]
impl CandleSource for BinanceFuturesClient {
    async fn candle(&self, symbol: &str, open_time: i64, interval: Interval) -> Result<Candle> {
        let url = format!(
            "{}{KLINES_PATH}?{}",
            self.base_url,
            klines_query(symbol, interval, open_time)
        );

        debug!(symbol, %interval, open_time, "Requesting kline from Binance futures");
        let body = self.get(&url).await?;

        parse_first_kline(&body)?
            .filter(|kline| covers(kline, open_time))
            .ok_or_else(|| Error::MissingKline {
                symbol: symbol.to_string(),
                open_time,
            })
    }
}

/// Query for the kline whose interval covers `at`: with only `endTime` set,
/// the endpoint returns the latest klines opening at or before it.
fn klines_query(symbol: &str, interval: Interval, at: i64) -> String {
    format!("symbol={symbol}&interval={interval}&endTime={at}&limit=1")
}

/// A kline opening at or before `at` that has already closed before it
/// belongs to an earlier interval (gap in history or unlisted symbol).
fn covers(kline: &Candle, at: i64) -> bool {
    kline.open_time <= at && at <= kline.close_time
}

// ─── Kline array parsing ─────────────────────────────────────────────────────

/// One row of the klines response:
/// `[open_time, "open", "high", "low", "close", "volume", close_time,
///   "quote_volume", trades, "taker_base", "taker_quote", "ignore"]`.
#[derive(Deserialize)]
#[allow(dead_code)] // trailing "ignore" column
struct RawKline(
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    u64,
    String,
    String,
    IgnoredAny,
);

impl TryFrom<RawKline> for Candle {
    type Error = Error;

    fn try_from(raw: RawKline) -> Result<Self> {
        let candle = Candle {
            open_time: raw.0,
            open: parse_decimal("open", &raw.1)?,
            high: parse_decimal("high", &raw.2)?,
            low: parse_decimal("low", &raw.3)?,
            close: parse_decimal("close", &raw.4)?,
            volume: parse_decimal("volume", &raw.5)?,
            close_time: raw.6,
            quote_asset_volume: parse_decimal("quote_asset_volume", &raw.7)?,
            number_of_trades: raw.8,
            taker_buy_base_asset_volume: parse_decimal("taker_buy_base_asset_volume", &raw.9)?,
            taker_buy_quote_asset_volume: parse_decimal("taker_buy_quote_asset_volume", &raw.10)?,
        };
        candle.validate()?;
        Ok(candle)
    }
}

fn parse_decimal(field: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|e| Error::MalformedKline(format!("{field} = '{value}': {e}")))
}

/// First kline of a klines response body, or `None` if the array is empty.
fn parse_first_kline(body: &str) -> Result<Option<Candle>> {
    let rows: Vec<RawKline> =
        serde_json::from_str(body).map_err(|e| Error::MalformedKline(e.to_string()))?;
    rows.into_iter().next().map(Candle::try_from).transpose()
}
