// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator math over closing prices. The per-series
// functions return `Option<T>` so callers must handle insufficient data and
// numerical edge cases; `IndicatorSnapshot::compute` folds those into the
// signal pipeline's error type.

pub mod ema;
pub mod rsi;

use serde::Serialize;

use crate::error::SignalError;
use crate::runtime_config::SignalPolicy;

/// Fewest closes the engine will ever compute on, whatever the periods.
pub const MIN_CANDLES: usize = 30;

/// Latest indicator values for one request. Never cached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub fast_ema: f64,
    pub slow_ema: f64,
    pub rsi: f64,
    /// Last close in the window; the classifier's entry price.
    pub price: f64,
}

impl IndicatorSnapshot {
    /// Closes needed before `compute` will run with `policy`'s periods.
    pub fn required_closes(policy: &SignalPolicy) -> usize {
        MIN_CANDLES
            .max(policy.slow_period)
            .max(policy.fast_period)
            .max(policy.rsi_period + 1)
    }

    /// Compute fast/slow EMA and RSI over `closes` (oldest first).
    ///
    /// # Errors
    /// - `InsufficientHistory` when the window is shorter than
    ///   [`IndicatorSnapshot::required_closes`].
    /// - `DataFetchFailure` when the closes contain values the math cannot
    ///   carry through to the last candle (NaN, infinities).
    pub fn compute(closes: &[f64], policy: &SignalPolicy) -> Result<Self, SignalError> {
        let required = Self::required_closes(policy);
        if closes.len() < required {
            return Err(SignalError::InsufficientHistory {
                available: closes.len(),
                required,
            });
        }

        let malformed = || SignalError::DataFetchFailure(anyhow::anyhow!("non-finite close in candle window"));

        let price = *closes.last().ok_or_else(malformed)?;
        if !price.is_finite() {
            return Err(malformed());
        }

        let fast_ema = ema::latest_ema(closes, policy.fast_period).ok_or_else(malformed)?;
        let slow_ema = ema::latest_ema(closes, policy.slow_period).ok_or_else(malformed)?;
        let rsi = rsi::latest_rsi(closes, policy.rsi_period).ok_or_else(malformed)?;

        Ok(Self {
            fast_ema,
            slow_ema,
            rsi,
            price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_every_window_below_thirty() {
        let policy = SignalPolicy::default();
        for n in 0..MIN_CANDLES {
            let closes = vec![100.0; n];
            match IndicatorSnapshot::compute(&closes, &policy) {
                Err(SignalError::InsufficientHistory { available, required }) => {
                    assert_eq!(available, n);
                    assert_eq!(required, MIN_CANDLES);
                }
                other => panic!("expected InsufficientHistory for {n} closes, got {other:?}"),
            }
        }
    }

    #[test]
    fn computes_on_exactly_thirty() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64 * 0.1).collect();
        let snap = IndicatorSnapshot::compute(&closes, &SignalPolicy::default()).unwrap();
        assert!((snap.price - closes[29]).abs() < 1e-12);
        assert!(snap.fast_ema > snap.slow_ema);
        assert!((snap.rsi - 100.0).abs() < 1e-10);
    }

    #[test]
    fn longer_periods_raise_the_minimum() {
        let policy = SignalPolicy {
            fast_period: 20,
            slow_period: 50,
            ..SignalPolicy::default()
        };
        assert_eq!(IndicatorSnapshot::required_closes(&policy), 50);
        let closes = vec![10.0; 40];
        assert!(matches!(
            IndicatorSnapshot::compute(&closes, &policy),
            Err(SignalError::InsufficientHistory { required: 50, .. })
        ));
    }

    #[test]
    fn non_finite_last_close_is_malformed() {
        let mut closes = vec![10.0; 40];
        closes[39] = f64::INFINITY;
        assert!(matches!(
            IndicatorSnapshot::compute(&closes, &SignalPolicy::default()),
            Err(SignalError::DataFetchFailure(_))
        ));
    }

    #[test]
    fn same_input_same_output() {
        let closes: Vec<f64> = (0..120).map(|i| 50.0 + ((i as f64) / 7.0).sin() * 3.0).collect();
        let policy = SignalPolicy::default();
        let a = IndicatorSnapshot::compute(&closes, &policy).unwrap();
        let b = IndicatorSnapshot::compute(&closes, &policy).unwrap();
        assert_eq!(a, b);
    }
}
