use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One OHLCV kline for a fixed interval.
///
/// Fields past `close` are carried through for reporting and never influence
/// the evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Interval start, epoch milliseconds.
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub close_time: i64,
    #[serde(default)]
    pub quote_asset_volume: f64,
    #[serde(default)]
    pub number_of_trades: u64,
    #[serde(default)]
    pub taker_buy_base_asset_volume: f64,
    #[serde(default)]
    pub taker_buy_quote_asset_volume: f64,
}

impl Candle {
    /// Bare OHLC candle with zeroed auxiliary fields.
    pub fn ohlc(open_time: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume: 0.0,
            close_time: 0,
            quote_asset_volume: 0.0,
            number_of_trades: 0,
            taker_buy_base_asset_volume: 0.0,
            taker_buy_quote_asset_volume: 0.0,
        }
    }

    /// Check the OHLC invariants: finite, non-negative, and
    /// `low <= open, close <= high`.
    pub fn validate(&self) -> Result<()> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(Error::MalformedKline(format!(
                "candle at {} has a non-finite or negative price",
                self.open_time
            )));
        }
        let within = |p: f64| self.low <= p && p <= self.high;
        if !within(self.open) || !within(self.close) {
            return Err(Error::MalformedKline(format!(
                "candle at {} violates low <= open/close <= high (o={} h={} l={} c={})",
                self.open_time, self.open, self.high, self.low, self.close
            )));
        }
        Ok(())
    }

    /// True when `price` lies inside `[low, high]`.
    pub fn contains(&self, price: f64) -> bool {
        self.low <= price && price <= self.high
    }
}

/// Kline interval, named by its Binance token.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Interval {
    #[default]
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "3m")]
    ThreeMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "8h")]
    EightHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "3d")]
    ThreeDays,
    #[serde(rename = "1w")]
    OneWeek,
}

impl Interval {
    pub const ALL: [Interval; 14] = [
        Interval::OneMinute,
        Interval::ThreeMinutes,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::OneHour,
        Interval::TwoHours,
        Interval::FourHours,
        Interval::SixHours,
        Interval::EightHours,
        Interval::TwelveHours,
        Interval::OneDay,
        Interval::ThreeDays,
        Interval::OneWeek,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::ThreeMinutes => "3m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::OneHour => "1h",
            Interval::TwoHours => "2h",
            Interval::FourHours => "4h",
            Interval::SixHours => "6h",
            Interval::EightHours => "8h",
            Interval::TwelveHours => "12h",
            Interval::OneDay => "1d",
            Interval::ThreeDays => "3d",
            Interval::OneWeek => "1w",
        }
    }

    /// Nominal duration in milliseconds.
    pub fn default_duration_ms(&self) -> i64 {
        const MINUTE: i64 = 60_000;
        match self {
            Interval::OneMinute => MINUTE,
            Interval::ThreeMinutes => 3 * MINUTE,
            Interval::FiveMinutes => 5 * MINUTE,
            Interval::FifteenMinutes => 15 * MINUTE,
            Interval::ThirtyMinutes => 30 * MINUTE,
            Interval::OneHour => 60 * MINUTE,
            Interval::TwoHours => 120 * MINUTE,
            Interval::FourHours => 240 * MINUTE,
            Interval::SixHours => 360 * MINUTE,
            Interval::EightHours => 480 * MINUTE,
            Interval::TwelveHours => 720 * MINUTE,
            Interval::OneDay => 1_440 * MINUTE,
            Interval::ThreeDays => 4_320 * MINUTE,
            Interval::OneWeek => 10_080 * MINUTE,
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Interval::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown interval '{s}'")))
    }
}

/// Interval → duration (ms) lookup, handed explicitly to every component
/// that needs to step through time.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalTable {
    durations: HashMap<Interval, i64>,
}

impl IntervalTable {
    pub fn duration_ms(&self, interval: Interval) -> i64 {
        self.durations
            .get(&interval)
            .copied()
            .unwrap_or_else(|| interval.default_duration_ms())
    }

    /// Replace one entry. Durations must be positive.
    pub fn set(&mut self, interval: Interval, duration_ms: i64) -> Result<()> {
        if duration_ms <= 0 {
            return Err(Error::Config(format!(
                "duration for {interval} must be positive, got {duration_ms}"
            )));
        }
        self.durations.insert(interval, duration_ms);
        Ok(())
    }
}

impl Default for IntervalTable {
    fn default() -> Self {
        Self {
            durations: Interval::ALL
                .iter()
                .map(|i| (*i, i.default_duration_ms()))
                .collect(),
        }
    }
}

/// Which way the alert expects price to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Rise,
    Fall,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Rise => write!(f, "rise"),
            Direction::Fall => write!(f, "fall"),
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "rise" | "up" => Ok(Direction::Rise),
            "fall" | "down" => Ok(Direction::Fall),
            other => Err(Error::Config(format!(
                "direction must be 'rise' or 'fall', got '{other}'"
            ))),
        }
    }
}

/// Parameters of one alert evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub symbol: String,
    pub alert_price: f64,
    /// Alert timestamp, epoch milliseconds.
    pub alert_time: i64,
    pub interval: Interval,
    pub max_steps: usize,
    pub deviation_threshold_pct: f64,
    pub direction: Direction,
}

impl EvaluationRequest {
    pub const DEFAULT_MAX_STEPS: usize = 5;
    pub const DEFAULT_DEVIATION_THRESHOLD_PCT: f64 = 3.0;

    pub fn new(symbol: impl Into<String>, alert_price: f64, alert_time: i64) -> Self {
        Self {
            symbol: symbol.into(),
            alert_price,
            alert_time,
            interval: Interval::default(),
            max_steps: Self::DEFAULT_MAX_STEPS,
            deviation_threshold_pct: Self::DEFAULT_DEVIATION_THRESHOLD_PCT,
            direction: Direction::default(),
        }
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_threshold(mut self, deviation_threshold_pct: f64) -> Self {
        self.deviation_threshold_pct = deviation_threshold_pct;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.alert_price.is_finite() || self.alert_price <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "alert_price must be positive, got {}",
                self.alert_price
            )));
        }
        if self.max_steps == 0 {
            return Err(Error::InvalidInput("max_steps must be at least 1".into()));
        }
        if !self.deviation_threshold_pct.is_finite() || self.deviation_threshold_pct <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "deviation_threshold_pct must be positive, got {}",
                self.deviation_threshold_pct
            )));
        }
        Ok(())
    }
}

/// Terminal classification of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Success,
    Failure,
    OutOfRange,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Success => write!(f, "success"),
            Verdict::Failure => write!(f, "failure"),
            Verdict::OutOfRange => write!(f, "out of range"),
        }
    }
}

/// The gate that ended an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Alert price outside the first candle's range.
    RangeGate,
    /// A later candle moved against the expected direction.
    Reversal,
    /// Deviation threshold reached.
    Threshold,
    /// Step budget used up without any other gate firing.
    Exhausted,
}

/// Outcome of an evaluation, in the legacy record shape when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    #[serde(rename = "kline")]
    pub steps_consumed: usize,
    #[serde(rename = "price_change")]
    pub price_change_pct: Option<f64>,
    #[serde(rename = "status")]
    pub verdict: Verdict,
    pub termination: Termination,
    pub message: Option<String>,
    #[serde(rename = "data")]
    pub candles: Vec<Candle>,
}
