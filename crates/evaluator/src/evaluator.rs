use tracing::{debug, info};

use common::{
    Candle, CandleSource, Direction, Error, EvaluationRequest, EvaluationResult, IntervalTable,
    Result, Termination, Verdict,
};

/// Replays klines from the alert time forward and classifies the alert.
///
/// Candles are pulled one at a time and only as many as the verdict needs.
/// The evaluator holds no per-evaluation state, so one instance can serve
/// any number of independent evaluations.
#[derive(Debug, Clone, Default)]
pub struct SignalEvaluator {
    intervals: IntervalTable,
}

/// What a single candle says about the alert.
#[derive(Debug, Clone, Copy, PartialEq)]
enum StepOutcome {
    /// First candle's range does not contain the alert price.
    OutOfRange,
    /// Candle body points against the expected direction.
    Reversed,
    /// Deviation threshold reached at this change.
    Reached(f64),
    /// No gate fired; change measured at this step.
    Pending(f64),
}

impl SignalEvaluator {
    pub fn new(intervals: IntervalTable) -> Self {
        Self { intervals }
    }

    /// Evaluate `request` against candles pulled from `source`.
    ///
    /// Fails with `InvalidInput` before touching the source if the request
    /// is malformed or its last step lies outside the timestamp range, and
    /// with `SourceUnavailable` if the source fails; the latter carries the
    /// candles consumed up to that point.
    pub async fn evaluate(
        &self,
        request: &EvaluationRequest,
        source: &dyn CandleSource,
    ) -> Result<EvaluationResult> {
        request.validate()?;

        let step_ms = self.intervals.duration_ms(request.interval);
        if step_open_time(request.alert_time, request.max_steps, step_ms).is_none() {
            return Err(Error::InvalidInput(format!(
                "{} steps of {} from {} overflow the timestamp range",
                request.max_steps, request.interval, request.alert_time
            )));
        }

        let mut candles: Vec<Candle> = Vec::with_capacity(request.max_steps);
        let mut price_change_pct: Option<f64> = None;

        for step in 1..=request.max_steps {
            let open_time = step_open_time(request.alert_time, step, step_ms).ok_or_else(|| {
                Error::InvalidInput(format!("step {step} overflows the timestamp range"))
            })?;
            let candle = match source
                .candle(&request.symbol, open_time, request.interval)
                .await
            {
                Ok(candle) => candle,
                Err(e) => {
                    return Err(Error::SourceUnavailable {
                        step,
                        source: Box::new(e),
                        consumed: candles,
                    })
                }
            };

            let outcome = classify(request, step, &candle);
            let message = match outcome {
                StepOutcome::OutOfRange => Some(format!(
                    "alert price {} outside first candle range [{}, {}]",
                    request.alert_price, candle.low, candle.high
                )),
                StepOutcome::Reversed => Some(format!(
                    "candle {step} reversed against {} (open {}, close {})",
                    request.direction, candle.open, candle.close
                )),
                StepOutcome::Reached(_) | StepOutcome::Pending(_) => None,
            };
            candles.push(candle);
            debug!(
                symbol = %request.symbol,
                step,
                open_time,
                outcome = ?outcome,
                "Evaluated kline"
            );

            match outcome {
                StepOutcome::OutOfRange => {
                    return Ok(self.finish(
                        request,
                        candles,
                        None,
                        Verdict::OutOfRange,
                        Termination::RangeGate,
                        message,
                    ));
                }
                StepOutcome::Reversed => {
                    return Ok(self.finish(
                        request,
                        candles,
                        price_change_pct,
                        Verdict::Failure,
                        Termination::Reversal,
                        message,
                    ));
                }
                StepOutcome::Reached(pct) => {
                    return Ok(self.finish(
                        request,
                        candles,
                        Some(pct),
                        Verdict::Success,
                        Termination::Threshold,
                        None,
                    ));
                }
                StepOutcome::Pending(pct) => price_change_pct = Some(pct),
            }
        }

        // Budget exhausted without a terminal gate: report the last deviation
        // as a failure.
        let message = format!(
            "deviation threshold {}% not reached within {} candles",
            request.deviation_threshold_pct, request.max_steps
        );
        Ok(self.finish(
            request,
            candles,
            price_change_pct,
            Verdict::Failure,
            Termination::Exhausted,
            Some(message),
        ))
    }

    fn finish(
        &self,
        request: &EvaluationRequest,
        candles: Vec<Candle>,
        price_change_pct: Option<f64>,
        verdict: Verdict,
        termination: Termination,
        message: Option<String>,
    ) -> EvaluationResult {
        info!(
            symbol = %request.symbol,
            direction = %request.direction,
            steps = candles.len(),
            price_change_pct = ?price_change_pct,
            termination = ?termination,
            "Alert {verdict}"
        );
        EvaluationResult {
            steps_consumed: candles.len(),
            price_change_pct,
            verdict,
            termination,
            message,
            candles,
        }
    }
}

/// Open time requested at `step` (1-based), or `None` on overflow.
fn step_open_time(alert_time: i64, step: usize, step_ms: i64) -> Option<i64> {
    i64::try_from(step.saturating_sub(1))
        .ok()?
        .checked_mul(step_ms)?
        .checked_add(alert_time)
}

/// Apply the gates for one step. `step` is 1-based.
fn classify(request: &EvaluationRequest, step: usize, candle: &Candle) -> StepOutcome {
    if step == 1 && !candle.contains(request.alert_price) {
        return StepOutcome::OutOfRange;
    }

    // The first candle is the alert's own and carries no directional
    // expectation.
    if step > 1 {
        let reversed = match request.direction {
            Direction::Rise => candle.open >= candle.close,
            Direction::Fall => candle.open <= candle.close,
        };
        if reversed {
            return StepOutcome::Reversed;
        }
    }

    let check_price = match request.direction {
        Direction::Rise => candle.high,
        Direction::Fall => candle.low,
    };
    let pct = price_change_pct(request.alert_price, check_price);

    if pct.abs() >= request.deviation_threshold_pct {
        StepOutcome::Reached(pct)
    } else {
        StepOutcome::Pending(pct)
    }
}

/// Percent move from `alert_price` to `price`.
pub fn price_change_pct(alert_price: f64, price: f64) -> f64 {
    (price - alert_price) / alert_price * 100.0
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use common::Interval;

    use super::*;

    /// Serves candles in order regardless of the requested time, recording
    /// every timestamp asked for.
    struct Fixture {
        candles: Vec<Candle>,
        served: AtomicUsize,
        requested_at: std::sync::Mutex<Vec<i64>>,
    }

    impl Fixture {
        fn new(candles: Vec<Candle>) -> Self {
            Self {
                candles,
                served: AtomicUsize::new(0),
                requested_at: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn served(&self) -> usize {
            self.served.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CandleSource for Fixture {
        async fn candle(&self, symbol: &str, open_time: i64, _interval: Interval) -> Result<Candle> {
            self.requested_at.lock().unwrap().push(open_time);
            let i = self.served.load(Ordering::SeqCst);
            let candle = self.candles.get(i).cloned().ok_or_else(|| Error::MissingKline {
                symbol: symbol.to_string(),
                open_time,
            })?;
            self.served.fetch_add(1, Ordering::SeqCst);
            Ok(candle)
        }
    }

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::ohlc(0, open, high, low, close)
    }

    #[tokio::test]
    async fn rise_success_on_first_candle() {
        let source = Fixture::new(vec![candle(100.0, 105.0, 95.0, 102.0)]);
        let request = EvaluationRequest::new("TESTUSDT", 100.0, 0).with_threshold(3.0);

        let result = SignalEvaluator::default().evaluate(&request, &source).await.unwrap();

        assert_eq!(result.verdict, Verdict::Success);
        assert_eq!(result.termination, Termination::Threshold);
        assert_eq!(result.steps_consumed, 1);
        assert!((result.price_change_pct.unwrap() - 5.0).abs() < 1e-9);
        assert!(result.message.is_none());
        assert_eq!(source.served(), 1);
    }

    #[tokio::test]
    async fn rise_fails_on_down_candle_at_step_two() {
        let source = Fixture::new(vec![
            candle(100.0, 101.0, 99.0, 100.5),
            candle(101.0, 120.0, 98.0, 99.0),
            candle(99.0, 130.0, 98.0, 129.0),
        ]);
        let request = EvaluationRequest::new("TESTUSDT", 100.0, 0);

        let result = SignalEvaluator::default().evaluate(&request, &source).await.unwrap();

        assert_eq!(result.verdict, Verdict::Failure);
        assert_eq!(result.termination, Termination::Reversal);
        assert_eq!(result.steps_consumed, 2);
        // Deviation reported from step 1; the reversed candle is not measured
        // even though its high would clear the threshold.
        assert!((result.price_change_pct.unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(source.served(), 2);
    }

    #[tokio::test]
    async fn flat_candle_counts_as_reversal_both_ways() {
        let flat = candle(100.0, 100.5, 99.5, 100.0);
        for direction in [Direction::Rise, Direction::Fall] {
            let source = Fixture::new(vec![candle(100.0, 100.5, 99.5, 100.0), flat.clone()]);
            let request = EvaluationRequest::new("TESTUSDT", 100.0, 0).with_direction(direction);
            let result = SignalEvaluator::default().evaluate(&request, &source).await.unwrap();
            assert_eq!(result.termination, Termination::Reversal, "{direction}");
        }
    }

    #[tokio::test]
    async fn fall_out_of_range_on_first_candle() {
        let source = Fixture::new(vec![candle(65.0, 70.0, 60.0, 62.0), candle(62.0, 63.0, 40.0, 41.0)]);
        let request = EvaluationRequest::new("TESTUSDT", 50.0, 0).with_direction(Direction::Fall);

        let result = SignalEvaluator::default().evaluate(&request, &source).await.unwrap();

        assert_eq!(result.verdict, Verdict::OutOfRange);
        assert_eq!(result.termination, Termination::RangeGate);
        assert_eq!(result.steps_consumed, 1);
        assert_eq!(result.candles.len(), 1);
        assert!(result.price_change_pct.is_none());
        assert!(result.message.unwrap().contains("[60, 70]"));
        assert_eq!(source.served(), 1);
    }

    #[tokio::test]
    async fn range_gate_is_inclusive() {
        let source = Fixture::new(vec![candle(101.0, 110.0, 100.0, 105.0)]);
        let request = EvaluationRequest::new("TESTUSDT", 100.0, 0).with_max_steps(1);

        let result = SignalEvaluator::default().evaluate(&request, &source).await.unwrap();

        assert_ne!(result.verdict, Verdict::OutOfRange);
    }

    #[tokio::test]
    async fn exhausted_budget_reports_last_deviation_as_failure() {
        let source = Fixture::new(vec![
            candle(100.0, 100.5, 99.5, 100.2),
            candle(100.2, 101.0, 100.0, 100.8),
            candle(100.8, 102.0, 100.5, 101.5),
            candle(101.5, 150.0, 101.0, 149.0),
        ]);
        let request = EvaluationRequest::new("TESTUSDT", 100.0, 0).with_max_steps(3);

        let result = SignalEvaluator::default().evaluate(&request, &source).await.unwrap();

        assert_eq!(result.verdict, Verdict::Failure);
        assert_eq!(result.termination, Termination::Exhausted);
        assert_eq!(result.steps_consumed, 3);
        assert!((result.price_change_pct.unwrap() - 2.0).abs() < 1e-9);
        assert_eq!(source.served(), 3);
    }

    #[tokio::test]
    async fn threshold_boundary_is_inclusive() {
        // 8 -> 10 is exactly +25% in binary floating point.
        let source = Fixture::new(vec![candle(8.0, 10.0, 7.0, 9.0)]);
        let request = EvaluationRequest::new("TESTUSDT", 8.0, 0).with_threshold(25.0);

        let result = SignalEvaluator::default().evaluate(&request, &source).await.unwrap();

        assert_eq!(result.price_change_pct, Some(25.0));
        assert_eq!(result.verdict, Verdict::Success);
    }

    #[tokio::test]
    async fn fall_success_uses_low_and_absolute_change() {
        let source = Fixture::new(vec![
            candle(8.0, 8.5, 7.9, 8.1),
            candle(8.1, 8.2, 6.0, 6.5),
        ]);
        let request = EvaluationRequest::new("TESTUSDT", 8.0, 0)
            .with_direction(Direction::Fall)
            .with_threshold(25.0);

        let result = SignalEvaluator::default().evaluate(&request, &source).await.unwrap();

        assert_eq!(result.verdict, Verdict::Success);
        assert_eq!(result.steps_consumed, 2);
        assert_eq!(result.price_change_pct, Some(-25.0));
    }

    #[tokio::test]
    async fn requests_step_through_interval_durations() {
        let source = Fixture::new(vec![
            candle(100.0, 100.5, 99.5, 100.2),
            candle(100.2, 101.0, 100.0, 100.8),
            candle(100.8, 102.0, 100.5, 101.5),
        ]);
        let request = EvaluationRequest::new("TESTUSDT", 100.0, 1_000)
            .with_interval(Interval::ThreeMinutes)
            .with_max_steps(3);

        SignalEvaluator::default().evaluate(&request, &source).await.unwrap();

        let requested = source.requested_at.lock().unwrap().clone();
        assert_eq!(requested, vec![1_000, 181_000, 361_000]);
    }

    #[tokio::test]
    async fn source_failure_carries_step_and_consumed_candles() {
        let source = Fixture::new(vec![
            candle(100.0, 100.5, 99.5, 100.2),
            candle(100.2, 101.0, 100.0, 100.8),
        ]);
        let request = EvaluationRequest::new("TESTUSDT", 100.0, 0);

        let err = SignalEvaluator::default()
            .evaluate(&request, &source)
            .await
            .unwrap_err();

        match err {
            Error::SourceUnavailable { step, consumed, source } => {
                assert_eq!(step, 3);
                assert_eq!(consumed.len(), 2);
                assert!(matches!(*source, Error::MissingKline { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn invalid_request_never_touches_source() {
        let source = Fixture::new(vec![candle(100.0, 105.0, 95.0, 102.0)]);
        let evaluator = SignalEvaluator::default();

        for request in [
            EvaluationRequest::new("TESTUSDT", 0.0, 0),
            EvaluationRequest::new("TESTUSDT", -1.0, 0),
            EvaluationRequest::new("TESTUSDT", 100.0, 0).with_max_steps(0),
            EvaluationRequest::new("TESTUSDT", 100.0, 0).with_threshold(0.0),
        ] {
            let err = evaluator.evaluate(&request, &source).await.unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)));
        }
        assert!(source.requested_at.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn timestamp_overflow_is_invalid_input() {
        let source = Fixture::new(vec![candle(100.0, 105.0, 95.0, 102.0)]);
        let mut intervals = IntervalTable::default();
        intervals.set(Interval::OneMinute, i64::MAX / 2).unwrap();
        let evaluator = SignalEvaluator::new(intervals);

        for request in [
            EvaluationRequest::new("TESTUSDT", 100.0, i64::MAX - 1_000).with_max_steps(2),
            EvaluationRequest::new("TESTUSDT", 100.0, 0).with_max_steps(4),
        ] {
            let err = evaluator.evaluate(&request, &source).await.unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{err}");
        }
        assert!(source.requested_at.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reversal_message_names_the_reversed_candle() {
        let source = Fixture::new(vec![
            candle(100.0, 101.0, 99.0, 100.5),
            candle(101.0, 102.0, 98.0, 99.0),
        ]);
        let request = EvaluationRequest::new("TESTUSDT", 100.0, 0);

        let result = SignalEvaluator::default().evaluate(&request, &source).await.unwrap();

        assert_eq!(
            result.message.as_deref(),
            Some("candle 2 reversed against rise (open 101, close 99)")
        );
    }

    #[test]
    fn price_change_is_signed_percent() {
        assert_eq!(price_change_pct(8.0, 10.0), 25.0);
        assert_eq!(price_change_pct(8.0, 6.0), -25.0);
    }
}
