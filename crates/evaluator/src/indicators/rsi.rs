/// RSI (Relative Strength Index) indicator.
///
/// Uses simple rolling means of gains and losses over the last `period`
/// changes (Cutler's RSI) rather than Wilder smoothing, so a value depends
/// only on the `period + 1` closes that end at it.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
}

impl RsiIndicator {
    pub const DEFAULT_PERIOD: usize = 14;

    pub fn new(period: usize) -> Self {
        assert!(period >= 2, "RSI period must be >= 2");
        Self { period }
    }

    /// One value per close (oldest first). The first `period` entries are
    /// `None`, as is any window with neither gains nor losses.
    pub fn series(&self, closes: &[f64]) -> Vec<Option<f64>> {
        (0..closes.len())
            .map(|i| {
                if i < self.period {
                    None
                } else {
                    self.window_rsi(&closes[i - self.period..=i])
                }
            })
            .collect()
    }

    /// RSI at the latest close. Returns `None` with fewer than `period + 1`
    /// values.
    pub fn compute(&self, closes: &[f64]) -> Option<f64> {
        if closes.len() < self.period + 1 {
            return None;
        }
        self.window_rsi(&closes[closes.len() - self.period - 1..])
    }

    fn window_rsi(&self, window: &[f64]) -> Option<f64> {
        let changes = window.windows(2).map(|w| w[1] - w[0]);
        let (gain, loss) = changes.fold((0.0, 0.0), |(g, l), c| {
            if c > 0.0 {
                (g + c, l)
            } else {
                (g, l - c)
            }
        });
        let avg_gain = gain / self.period as f64;
        let avg_loss = loss / self.period as f64;

        if avg_loss == 0.0 {
            return if avg_gain == 0.0 { None } else { Some(100.0) };
        }

        let rs = avg_gain / avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }
}

impl Default for RsiIndicator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PERIOD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_returns_none_when_insufficient_data() {
        let rsi = RsiIndicator::new(14);
        // Need at least period+1 = 15 values
        let prices = vec![100.0; 14];
        assert!(rsi.compute(&prices).is_none());
    }

    #[test]
    fn rsi_all_gains_returns_100() {
        let rsi = RsiIndicator::new(3);
        let prices = vec![10.0, 11.0, 12.0, 13.0, 14.0];
        let value = rsi.compute(&prices).unwrap();
        assert!((value - 100.0).abs() < 1e-6, "Expected ~100, got {value}");
    }

    #[test]
    fn rsi_all_losses_returns_0() {
        let rsi = RsiIndicator::new(3);
        let prices = vec![14.0, 13.0, 12.0, 11.0, 10.0];
        let value = rsi.compute(&prices).unwrap();
        assert!(value.abs() < 1e-6, "Expected ~0, got {value}");
    }

    #[test]
    fn rsi_flat_window_is_undefined() {
        let rsi = RsiIndicator::new(3);
        assert!(rsi.compute(&[5.0, 5.0, 5.0, 5.0]).is_none());
    }

    #[test]
    fn rsi_balanced_moves_return_50() {
        // gains 2, losses 2 over the window
        let rsi = RsiIndicator::new(4);
        let value = rsi.compute(&[10.0, 11.0, 10.0, 11.0, 10.0]).unwrap();
        assert!((value - 50.0).abs() < 1e-9, "Expected 50, got {value}");
    }

    #[test]
    fn rsi_series_pads_first_period_values() {
        let rsi = RsiIndicator::new(3);
        let series = rsi.series(&[1.0, 2.0, 3.0, 4.0, 3.0]);
        assert_eq!(series.len(), 5);
        assert!(series[..3].iter().all(Option::is_none));
        assert_eq!(series[3], Some(100.0));
        // window 2,3,4,3: gains 2, loss 1 -> rs 2 -> 66.67
        let last = series[4].unwrap();
        assert!((last - 200.0 / 3.0).abs() < 1e-9, "got {last}");
        assert_eq!(series[4], rsi.compute(&[1.0, 2.0, 3.0, 4.0, 3.0]));
    }
}
