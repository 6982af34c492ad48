// =============================================================================
// Signal Classifier — EMA cross + RSI band decision rule
// =============================================================================
//
// Checks run in a fixed order:
//   1. fast > slow and RSI < long ceiling  => strong LONG
//   2. fast < slow and RSI > short floor   => strong SHORT
//   3. otherwise                            => fallback, side by EMA order
//                                              (a tie goes LONG)
//
// Strong setups get the wide stop/target pair with High confidence and Low
// risk; the fallback uses the tighter pair with Medium/Medium. Every price is
// rounded half-up to cents. Once a snapshot exists a call is always made.
// =============================================================================

use serde::Serialize;

use crate::indicators::IndicatorSnapshot;
use crate::runtime_config::SignalPolicy;
use crate::types::{Confidence, Direction, RiskLevel};

/// Which branch of the decision rule produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Setup {
    StrongTrend,
    Fallback,
}

/// A directional call with price targets. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    #[serde(rename = "type")]
    pub direction: Direction,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub confidence: Confidence,
    pub risk: RiskLevel,
    /// Fixed annotation per branch, not a measured statistic.
    pub win_rate: String,
    #[serde(skip)]
    pub setup: Setup,
}

/// Round half away from zero to two decimals.
///
/// Works on the stored `f64`, so a decimal tie that is not exact in binary
/// (`1.005` is really `1.00499...`) rounds by its binary value.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Apply the decision rule to `snapshot`.
pub fn classify(snapshot: &IndicatorSnapshot, policy: &SignalPolicy) -> Signal {
    let IndicatorSnapshot {
        fast_ema,
        slow_ema,
        rsi,
        price,
    } = *snapshot;

    let (direction, setup) = if fast_ema > slow_ema && rsi < policy.long_rsi_ceiling {
        (Direction::Long, Setup::StrongTrend)
    } else if fast_ema < slow_ema && rsi > policy.short_rsi_floor {
        (Direction::Short, Setup::StrongTrend)
    } else if fast_ema >= slow_ema {
        (Direction::Long, Setup::Fallback)
    } else {
        (Direction::Short, Setup::Fallback)
    };

    let (stop_pct, target_pct, confidence, risk, win_rate) = match setup {
        Setup::StrongTrend => (
            policy.strong_stop_pct,
            policy.strong_target_pct,
            Confidence::High,
            RiskLevel::Low,
            &policy.strong_win_rate,
        ),
        Setup::Fallback => (
            policy.fallback_stop_pct,
            policy.fallback_target_pct,
            Confidence::Medium,
            RiskLevel::Medium,
            &policy.fallback_win_rate,
        ),
    };

    let stop = stop_pct / 100.0;
    let target = target_pct / 100.0;
    let (stop_loss, take_profit) = match direction {
        Direction::Long => (price * (1.0 - stop), price * (1.0 + target)),
        Direction::Short => (price * (1.0 + stop), price * (1.0 - target)),
    };

    Signal {
        direction,
        entry: round_cents(price),
        stop_loss: round_cents(stop_loss),
        take_profit: round_cents(take_profit),
        confidence,
        risk,
        win_rate: win_rate.clone(),
        setup,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(fast_ema: f64, slow_ema: f64, rsi: f64, price: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            fast_ema,
            slow_ema,
            rsi,
            price,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn strong_long_example() {
        let s = classify(&snap(101.0, 99.0, 50.0, 100.0), &SignalPolicy::default());
        assert_eq!(s.direction, Direction::Long);
        assert_eq!(s.confidence, Confidence::High);
        assert_eq!(s.risk, RiskLevel::Low);
        assert_eq!(s.setup, Setup::StrongTrend);
        assert!(close(s.entry, 100.00));
        assert!(close(s.stop_loss, 99.20));
        assert!(close(s.take_profit, 102.00));
    }

    #[test]
    fn strong_short_example() {
        let s = classify(&snap(49.0, 51.0, 50.0, 50.0), &SignalPolicy::default());
        assert_eq!(s.direction, Direction::Short);
        assert_eq!(s.confidence, Confidence::High);
        assert!(close(s.entry, 50.00));
        assert!(close(s.stop_loss, 50.40));
        assert!(close(s.take_profit, 49.00));
    }

    #[test]
    fn overbought_bull_cross_falls_back_long() {
        let s = classify(&snap(101.0, 99.0, 70.0, 200.0), &SignalPolicy::default());
        assert_eq!(s.direction, Direction::Long);
        assert_eq!(s.setup, Setup::Fallback);
        assert_eq!(s.confidence, Confidence::Medium);
        assert_eq!(s.risk, RiskLevel::Medium);
        assert!(close(s.stop_loss, 199.00));
        assert!(close(s.take_profit, 202.40));
    }

    #[test]
    fn oversold_bear_cross_falls_back_short() {
        let s = classify(&snap(99.0, 101.0, 30.0, 200.0), &SignalPolicy::default());
        assert_eq!(s.direction, Direction::Short);
        assert_eq!(s.setup, Setup::Fallback);
        assert!(close(s.stop_loss, 201.00));
        assert!(close(s.take_profit, 197.60));
    }

    #[test]
    fn ema_tie_favours_long() {
        for rsi in [10.0, 50.0, 90.0] {
            let s = classify(&snap(100.0, 100.0, rsi, 100.0), &SignalPolicy::default());
            assert_eq!(s.direction, Direction::Long, "rsi={rsi}");
            assert_eq!(s.setup, Setup::Fallback);
        }
    }

    #[test]
    fn band_edges_are_exclusive() {
        let policy = SignalPolicy::default();
        let at_ceiling = classify(&snap(2.0, 1.0, 55.0, 10.0), &policy);
        assert_eq!(at_ceiling.setup, Setup::Fallback);
        let at_floor = classify(&snap(1.0, 2.0, 45.0, 10.0), &policy);
        assert_eq!(at_floor.setup, Setup::Fallback);
        assert_eq!(at_floor.direction, Direction::Short);
    }

    #[test]
    fn rounding_is_half_up_to_cents() {
        // Ties that are exact in binary round away from zero.
        assert_eq!(round_cents(0.125), 0.13);
        assert_eq!(round_cents(0.375), 0.38);
        assert_eq!(round_cents(-0.125), -0.13);
        // 1.005 is stored as 1.00499999..., so it rounds down.
        assert_eq!(round_cents(1.005), 1.0);
        assert!(close(round_cents(2.344), 2.34));
        assert!(close(round_cents(2.345_01), 2.35));
        assert!(close(round_cents(99.199_999_999_999_99), 99.20));
    }

    #[test]
    fn win_rate_label_follows_branch() {
        let policy = SignalPolicy::default();
        let strong = classify(&snap(101.0, 99.0, 50.0, 100.0), &policy);
        let fallback = classify(&snap(101.0, 99.0, 80.0, 100.0), &policy);
        assert_eq!(strong.win_rate, policy.strong_win_rate);
        assert_eq!(fallback.win_rate, policy.fallback_win_rate);
    }

    #[test]
    fn tuned_thresholds_keep_branch_order() {
        let policy = SignalPolicy {
            long_rsi_ceiling: 80.0,
            short_rsi_floor: 20.0,
            ..SignalPolicy::default()
        };
        let s = classify(&snap(101.0, 99.0, 70.0, 100.0), &policy);
        assert_eq!(s.setup, Setup::StrongTrend);
        assert_eq!(s.direction, Direction::Long);
    }

    #[test]
    fn payload_uses_client_field_names() {
        let s = classify(&snap(101.0, 99.0, 50.0, 100.0), &SignalPolicy::default());
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["type"], "LONG");
        assert_eq!(json["stopLoss"], 99.2);
        assert_eq!(json["takeProfit"], 102.0);
        assert_eq!(json["confidence"], "High");
        assert_eq!(json["risk"], "Low");
        assert!(json.get("winRate").is_some());
        assert!(json.get("setup").is_none());
    }
}
