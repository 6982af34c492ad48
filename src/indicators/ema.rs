// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
//   k     = 2 / (period + 1)
//   EMA_t = close_t * k + EMA_{t-1} * (1 - k)
//
// The series is seeded with the SMA of the first `period` closes, so the first
// output lines up with close index `period - 1`.
// =============================================================================

/// Smoothing constant for a given look-back.
fn smoothing(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// Compute the EMA series for `closes` over `period`.
///
/// Returns an empty `Vec` when `period == 0` or there are fewer than `period`
/// closes. A non-finite intermediate value truncates the series at that point.
pub fn ema_series(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let seed = closes[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return Vec::new();
    }

    let k = smoothing(period);
    let mut out = Vec::with_capacity(closes.len() - period + 1);
    out.push(seed);

    let mut prev = seed;
    for &close in &closes[period..] {
        let next = close * k + prev * (1.0 - k);
        if !next.is_finite() {
            break;
        }
        out.push(next);
        prev = next;
    }

    out
}

/// Most recent EMA value, or `None` if the series could not be computed all
/// the way to the last close.
pub fn latest_ema(closes: &[f64], period: usize) -> Option<f64> {
    let series = ema_series(closes, period);
    // A truncated series would report a stale value as "latest".
    if series.len() != closes.len().saturating_sub(period) + 1 {
        return None;
    }
    series.last().copied()
}
