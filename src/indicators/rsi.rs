// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// RSI measures the speed and magnitude of recent price changes to evaluate
// whether an asset is overbought or oversold.
//
// Step 1 — Compute price changes (deltas) from consecutive closes.
// Step 2 — Seed average gain / average loss with the SMA of the first `period`
//          gains / losses.
// Step 3 — Apply Wilder's exponential smoothing:
//            avg_gain = (prev_avg_gain * (period - 1) + current_gain) / period
//            avg_loss = (prev_avg_loss * (period - 1) + current_loss) / period
// Step 4 — RS  = avg_gain / avg_loss   (RS = 100 when avg_loss == 0)
//          RSI = 100 - 100 / (1 + RS)
//
// Output alignment: the first `period + 1` positions are `None` (one for the
// missing first delta, `period` for the seed window); the seed RSI lands at
// index `period + 1` and each smoothed value follows one slot later.
//
// Thresholds:  RSI >= 70 => OVERBOUGHT,  RSI <= 30 => OVERSOLD.
// =============================================================================

use serde::Serialize;

/// RS substituted when the average loss is zero. Keeps the output finite; RSI
/// then reads 100 - 100/101 rather than a true 100.
const ZERO_LOSS_RS: f64 = 100.0;

pub const OVERBOUGHT: f64 = 70.0;
pub const OVERSOLD: f64 = 30.0;

/// Momentum zone of an RSI reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RsiZone {
    Overbought,
    Neutral,
    Oversold,
}

impl RsiZone {
    pub fn classify(value: f64) -> Self {
        if value >= OVERBOUGHT {
            Self::Overbought
        } else if value <= OVERSOLD {
            Self::Oversold
        } else {
            Self::Neutral
        }
    }
}

/// Compute the RSI series aligned 1:1 with `closes`.
///
/// # Edge cases
/// - `period == 0` => every position is `None`
/// - `closes.len() < period + 1` => every position is `None`
/// - Average loss of zero uses `RS = 100`, never dividing by zero.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let len = closes.len();
    let mut result = vec![None; len];
    if period == 0 || len < period + 1 {
        return result;
    }

    // --- Compute price deltas ------------------------------------------------
    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    // --- Seed averages with SMA of first `period` deltas ---------------------
    let (sum_gain, sum_loss) = deltas[..period].iter().fold((0.0_f64, 0.0_f64), |(g, l), &d| {
        if d > 0.0 {
            (g + d, l)
        } else {
            (g, l + d.abs())
        }
    });

    let period_f = period as f64;
    let mut avg_gain = sum_gain / period_f;
    let mut avg_loss = sum_loss / period_f;

    let mut slot = period + 1;
    if slot >= len {
        return result;
    }
    result[slot] = Some(rsi_from_averages(avg_gain, avg_loss));

    // --- Wilder's smoothing for subsequent values ----------------------------
    for &delta in &deltas[period..] {
        slot += 1;
        if slot >= len {
            break;
        }

        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { delta.abs() } else { 0.0 };

        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;

        result[slot] = Some(rsi_from_averages(avg_gain, avg_loss));
    }

    result
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    let rs = if avg_loss == 0.0 {
        ZERO_LOSS_RS
    } else {
        avg_gain / avg_loss
    };
    100.0 - 100.0 / (1.0 + rs)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    const SATURATED: f64 = 100.0 - 100.0 / 101.0;

    fn ascending(n: usize) -> Vec<f64> {
        (1..=n).map(|x| x as f64).collect()
    }

    #[test]
    fn rsi_empty_input() {
        assert!(calculate_rsi(&[], 14).is_empty());
    }

    #[test]
    fn rsi_period_zero() {
        assert_eq!(calculate_rsi(&[1.0, 2.0, 3.0], 0), vec![None; 3]);
    }

    #[test]
    fn rsi_insufficient_data() {
        assert_eq!(calculate_rsi(&ascending(14), 14), vec![None; 14]);
        // Exactly period + 1 closes still leaves every slot in warm-up.
        assert_eq!(calculate_rsi(&ascending(15), 14), vec![None; 15]);
    }

    #[test]
    fn rsi_warm_up_is_period_plus_one() {
        let series = calculate_rsi(&ascending(20), 14);
        assert_eq!(series.len(), 20);
        assert!(series[..15].iter().all(Option::is_none));
        assert!(series[15..].iter().all(Option::is_some));
    }

    #[test]
    fn rsi_all_gains_saturates_via_zero_loss_rs() {
        let series = calculate_rsi(&ascending(30), 14);
        for v in series.into_iter().flatten() {
            assert_eq!(v, SATURATED);
        }
    }

    #[test]
    fn rsi_all_losses_is_zero() {
        let closes: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        let series = calculate_rsi(&closes, 14);
        let values: Vec<f64> = series.into_iter().flatten().collect();
        assert!(!values.is_empty());
        for v in values {
            assert!(v.abs() < 1e-10, "expected 0.0, got {v}");
        }
    }

    #[test]
    fn rsi_flat_market_uses_zero_loss_branch() {
        let series = calculate_rsi(&[100.0; 30], 14);
        for v in series.into_iter().flatten() {
            assert_eq!(v, SATURATED);
            assert!(v.is_finite());
        }
    }

    #[test]
    fn rsi_seed_value_matches_hand_computation() {
        // period 2: deltas +1, -1 => avg_gain 0.5, avg_loss 0.5, RS 1 => 50.
        // next delta +2 => gain avg (0.5 + 2)/2 = 1.25, loss avg 0.25 => RS 5.
        let series = calculate_rsi(&[10.0, 11.0, 10.0, 12.0, 13.0], 2);
        assert_eq!(series[..3], [None, None, None]);
        assert_eq!(series[3], Some(50.0));
        let expected = 100.0 - 100.0 / (1.0 + 5.0);
        assert!((series[4].unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn rsi_range_check() {
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 44.18, 44.22, 44.57, 43.42, 42.66, 43.13, 41.0, 47.5,
        ];
        for period in [2, 5, 14] {
            for v in calculate_rsi(&closes, period).into_iter().flatten() {
                assert!((0.0..=100.0).contains(&v), "RSI {v} out of range");
            }
        }
    }

    #[test]
    fn latest_rsi_zones() {
        let last = |closes: &[f64]| calculate_rsi(closes, 14).into_iter().flatten().last();

        let rising = last(&ascending(30)).unwrap();
        assert_eq!(RsiZone::classify(rising), RsiZone::Overbought);

        let falling: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        let val = last(&falling).unwrap();
        assert!(val.abs() < 1e-10);
        assert_eq!(RsiZone::classify(val), RsiZone::Oversold);

        assert_eq!(RsiZone::classify(50.0), RsiZone::Neutral);
        assert!(last(&[]).is_none());
    }
}
