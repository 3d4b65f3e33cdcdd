// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
// SMA_i = (close_{i-period+1} + ... + close_i) / period
//
// Positions before the first full window are `None`.
// =============================================================================

/// Compute the SMA series aligned 1:1 with `closes`.
///
/// # Edge cases
/// - `period == 0` => every position is `None`
/// - `closes.len() < period` => every position is `None`
pub fn calculate_sma(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; closes.len()];
    if period == 0 || closes.len() < period {
        return result;
    }

    let divisor = period as f64;
    for (i, window) in closes.windows(period).enumerate() {
        result[i + period - 1] = Some(window.iter().sum::<f64>() / divisor);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_three_over_five() {
        let sma = calculate_sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(sma, vec![None, None, Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn sma_period_zero() {
        assert_eq!(calculate_sma(&[1.0, 2.0], 0), vec![None, None]);
    }

    #[test]
    fn sma_insufficient_data() {
        assert_eq!(calculate_sma(&[1.0, 2.0], 3), vec![None, None]);
        assert!(calculate_sma(&[], 3).is_empty());
    }

    #[test]
    fn sma_period_one_is_identity() {
        let closes = [3.5, 1.25, 8.0];
        let sma = calculate_sma(&closes, 1);
        assert_eq!(sma, vec![Some(3.5), Some(1.25), Some(8.0)]);
    }

    #[test]
    fn sma_matches_window_mean_everywhere() {
        let closes: Vec<f64> = (0..40).map(|i| ((i * 7) % 13) as f64 + 0.1 * i as f64).collect();
        let period = 6;
        let sma = calculate_sma(&closes, period);
        assert_eq!(sma.len(), closes.len());
        for (i, value) in sma.iter().enumerate() {
            if i + 1 < period {
                assert!(value.is_none());
            } else {
                let window = &closes[i + 1 - period..=i];
                let mean = window.iter().sum::<f64>() / period as f64;
                assert_eq!(*value, Some(mean));
            }
        }
    }
}
