use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{CandleSource, Config, Direction, Error, EvaluationRequest, Interval};
use evaluator::{close_prices, EvaluatorFileConfig, RsiIndicator, SignalEvaluator};
use market::{fetch_lookback, BinanceFuturesClient, ReplaySource};

/// Check whether a price alert was confirmed by the klines that followed it.
#[derive(Debug, Parser)]
#[command(name = "alert-check", version)]
struct Cli {
    /// Futures symbol, e.g. CELRUSDT.
    #[arg(long)]
    symbol: String,

    /// Alert price.
    #[arg(long)]
    price: f64,

    /// Alert time: epoch milliseconds or RFC 3339 (2023-11-09T17:13:00.304Z).
    #[arg(long, value_parser = parse_time)]
    time: i64,

    /// Kline interval to step through (1m, 3m, 5m, ... 1w).
    #[arg(long)]
    interval: Option<Interval>,

    /// Maximum number of klines to examine.
    #[arg(long)]
    steps: Option<usize>,

    /// Deviation threshold in percent.
    #[arg(long)]
    threshold: Option<f64>,

    /// Expected move: rise or fall.
    #[arg(long)]
    direction: Option<Direction>,

    /// RSI period for the lookback window; 0 skips the RSI.
    #[arg(long)]
    rsi_period: Option<usize>,

    /// Interval of the RSI lookback window.
    #[arg(long)]
    rsi_interval: Option<Interval>,

    /// Evaluator TOML file (overrides EVALUATOR_CONFIG_PATH).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replay candles from a JSON file instead of querying Binance.
    #[arg(long)]
    replay: Option<PathBuf>,
}

fn parse_time(s: &str) -> Result<i64, String> {
    if let Ok(ms) = s.parse::<i64>() {
        return Ok(ms);
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| format!("expected epoch milliseconds or RFC 3339, got '{s}': {e}"))
}

fn display_time(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.evaluator_config_path));
    let file_cfg = EvaluatorFileConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let intervals = file_cfg.interval_table()?;
    let defaults = &file_cfg.defaults;

    let request = EvaluationRequest::new(&args.symbol, args.price, args.time)
        .with_interval(args.interval.unwrap_or(defaults.interval))
        .with_max_steps(args.steps.unwrap_or(defaults.max_steps))
        .with_threshold(args.threshold.unwrap_or(defaults.deviation_threshold_pct))
        .with_direction(args.direction.unwrap_or(defaults.direction));

    info!(
        symbol = %request.symbol,
        price = request.alert_price,
        time = %display_time(request.alert_time),
        interval = %request.interval,
        steps = request.max_steps,
        threshold = request.deviation_threshold_pct,
        direction = %request.direction,
        "Checking alert"
    );

    // ── Candle source ─────────────────────────────────────────────────────────
    let source: Box<dyn CandleSource> = match &args.replay {
        Some(path) => {
            info!(path = %path.display(), "Replaying candles from file");
            Box::new(
                ReplaySource::from_json_file(path, intervals.clone())
                    .with_context(|| format!("loading replay file {}", path.display()))?,
            )
        }
        None => {
            info!(url = %cfg.futures_base_url, "Using Binance futures klines");
            Box::new(BinanceFuturesClient::new(&cfg)?)
        }
    };

    // ── RSI at alert time ─────────────────────────────────────────────────────
    let rsi_period = args.rsi_period.unwrap_or(defaults.rsi_period);
    if rsi_period >= 2 {
        let rsi_interval = args.rsi_interval.unwrap_or(defaults.rsi_interval);
        match fetch_lookback(
            source.as_ref(),
            &request.symbol,
            request.alert_time,
            rsi_interval,
            rsi_period,
            &intervals,
        )
        .await
        {
            Ok(window) => {
                let closes = close_prices(&window);
                match RsiIndicator::new(rsi_period).compute(&closes) {
                    Some(rsi) => info!(period = rsi_period, interval = %rsi_interval, rsi, "RSI before alert"),
                    None => info!(period = rsi_period, "RSI undefined over flat lookback window"),
                }
            }
            Err(e) => warn!(error = %e, "Lookback fetch failed, skipping RSI"),
        }
    }

    // ── Evaluation ────────────────────────────────────────────────────────────
    let evaluator = SignalEvaluator::new(intervals);
    match evaluator.evaluate(&request, source.as_ref()).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(Error::SourceUnavailable {
            step,
            source: cause,
            consumed,
        }) => {
            error!(step, error = %cause, "Candle source failed during evaluation");
            eprintln!("{}", serde_json::to_string_pretty(&consumed)?);
            anyhow::bail!("evaluation aborted at step {step}: {cause}")
        }
        Err(e) => Err(e.into()),
    }
}
