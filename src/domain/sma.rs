//! Simple moving average over closing prices.

/// Mean of the `period` closes ending at and including `index`, clipped at
/// the series start: fewer than `period` bars available uses however many
/// exist.
pub fn sma_at(closes: &[f64], index: usize, period: usize) -> f64 {
    debug_assert!(period > 0 && index < closes.len());
    let start = (index + 1).saturating_sub(period);
    let window = &closes[start..=index];
    window.iter().sum::<f64>() / window.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn full_window_mean() {
        let closes = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_relative_eq!(sma_at(&closes, 4, 3), 40.0);
        assert_relative_eq!(sma_at(&closes, 2, 3), 20.0);
    }

    #[test]
    fn clipped_at_series_start() {
        let closes = [10.0, 20.0, 30.0];
        // Only 1 and 2 bars exist before the window fills.
        assert_relative_eq!(sma_at(&closes, 0, 3), 10.0);
        assert_relative_eq!(sma_at(&closes, 1, 3), 15.0);
    }

    #[test]
    fn period_one_is_identity() {
        let closes = [10.0, 20.0, 30.0];
        assert_relative_eq!(sma_at(&closes, 1, 1), 20.0);
    }

    #[test]
    fn constant_series() {
        let closes = [100.0; 8];
        assert_relative_eq!(sma_at(&closes, 7, 5), 100.0);
    }
}
