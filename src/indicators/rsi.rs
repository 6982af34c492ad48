// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// 1. Deltas between consecutive closes, split into gains and losses.
// 2. Seed the average gain / loss with the plain mean of the first `period`
//    deltas.
// 3. Smooth every later delta:
//      avg = (prev_avg * (period - 1) + current) / period
// 4. RS = avg_gain / avg_loss,  RSI = 100 - 100 / (1 + RS)
// =============================================================================

/// Running Wilder averages.
struct WilderAverages {
    gain: f64,
    loss: f64,
    period: f64,
}

impl WilderAverages {
    fn seed(deltas: &[f64]) -> Self {
        let period = deltas.len() as f64;
        let (gain, loss) = deltas.iter().fold((0.0_f64, 0.0_f64), |(g, l), &d| {
            if d > 0.0 {
                (g + d, l)
            } else {
                (g, l - d)
            }
        });
        Self {
            gain: gain / period,
            loss: loss / period,
            period,
        }
    }

    fn push(&mut self, delta: f64) {
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        self.gain = (self.gain * (self.period - 1.0) + gain) / self.period;
        self.loss = (self.loss * (self.period - 1.0) + loss) / self.period;
    }

    /// Oscillator value in [0, 100]; `None` when non-finite.
    ///
    /// No movement at all reads as 50, gains without losses as 100.
    fn rsi(&self) -> Option<f64> {
        let rsi = if self.gain == 0.0 && self.loss == 0.0 {
            50.0
        } else if self.loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + self.gain / self.loss)
        };
        rsi.is_finite().then_some(rsi)
    }
}

/// Full RSI series: one value per close from index `period` onward.
///
/// Empty when `period == 0` or fewer than `period + 1` closes are given.
/// A non-finite value truncates the series.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let mut averages = WilderAverages::seed(&deltas[..period]);

    let mut out = Vec::with_capacity(deltas.len() - period + 1);
    match averages.rsi() {
        Some(v) => out.push(v),
        None => return out,
    }

    for &delta in &deltas[period..] {
        averages.push(delta);
        match averages.rsi() {
            Some(v) => out.push(v),
            None => break,
        }
    }

    out
}

/// Most recent RSI value, or `None` if the series stopped short of the last
/// close.
pub fn latest_rsi(closes: &[f64], period: usize) -> Option<f64> {
    let series = rsi_series(closes, period);
    if series.len() != closes.len().saturating_sub(period) {
        return None;
    }
    series.last().copied()
}
