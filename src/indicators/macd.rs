// =============================================================================
// MACD — Moving Average Convergence Divergence
// =============================================================================
//
//   macd_i      = EMA(fast)_i - EMA(slow)_i
//   signal      = EMA(signal_period) over the *valid* MACD values only; the
//                 first signal is the mean of the first `signal_period` valid
//                 MACD values, later values smooth forward as a normal EMA.
//   histogram_i = macd_i - signal_i
//
// Every output is `None` while any of its operands is still warming up.
// =============================================================================

use serde::{Deserialize, Serialize};

use super::ema::calculate_ema;

/// One aligned MACD sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MacdPoint {
    pub macd: Option<f64>,
    pub signal: Option<f64>,
    pub histogram: Option<f64>,
}

/// Compute MACD, signal and histogram aligned 1:1 with `closes`.
pub fn calculate_macd(
    closes: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> Vec<MacdPoint> {
    let fast = calculate_ema(closes, fast_period);
    let slow = calculate_ema(closes, slow_period);

    let multiplier = 2.0 / (signal_period + 1) as f64;
    let mut seed_window: Vec<f64> = Vec::with_capacity(signal_period);
    let mut prev_signal: Option<f64> = None;

    fast.iter()
        .zip(slow.iter())
        .map(|(f, s)| {
            let (Some(f), Some(s)) = (f, s) else {
                return MacdPoint::default();
            };
            let macd = f - s;

            let signal = match prev_signal {
                Some(prev) => Some(macd * multiplier + prev * (1.0 - multiplier)),
                None if signal_period > 0 => {
                    seed_window.push(macd);
                    (seed_window.len() == signal_period)
                        .then(|| seed_window.iter().sum::<f64>() / signal_period as f64)
                }
                None => None,
            };
            prev_signal = signal;

            MacdPoint {
                macd: Some(macd),
                signal,
                histogram: signal.map(|sig| macd - sig),
            }
        })
        .collect()
}
