// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The very first EMA value (index `period - 1`) is seeded with the SMA of the
// first `period` closes.
// =============================================================================

/// Compute the EMA series aligned 1:1 with `closes`.
///
/// # Edge cases
/// - `period == 0` => every position is `None`
/// - `closes.len() < period` => every position is `None`
pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; closes.len()];
    if period == 0 || closes.len() < period {
        return result;
    }

    let multiplier = 2.0 / (period + 1) as f64;

    // Seed: SMA of the first `period` values.
    let mut prev_ema = closes[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = Some(prev_ema);

    for (i, &close) in closes.iter().enumerate().skip(period) {
        prev_ema = close * multiplier + prev_ema * (1.0 - multiplier);
        result[i] = Some(prev_ema);
    }

    result
}
