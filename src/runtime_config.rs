// =============================================================================
// Runtime Configuration — signal policy and access limits with atomic save
// =============================================================================
//
// Every tunable of the signal service lives here. The classifier thresholds
// are policy, not truth: operators may retune them through the API without a
// restart, and the branch structure of the classifier stays fixed.
//
// Persistence uses an atomic tmp + rename pattern. All fields carry
// `#[serde(default)]` so that adding new fields never breaks loading an older
// config file.
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_free_signal_limit() -> u32 {
    2
}

fn default_candle_limit() -> u32 {
    120
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_candle_source_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_fast_period() -> usize {
    9
}

fn default_slow_period() -> usize {
    21
}

fn default_rsi_period() -> usize {
    14
}

fn default_long_rsi_ceiling() -> f64 {
    55.0
}

fn default_short_rsi_floor() -> f64 {
    45.0
}

fn default_strong_stop_pct() -> f64 {
    0.8
}

fn default_strong_target_pct() -> f64 {
    2.0
}

fn default_fallback_stop_pct() -> f64 {
    0.5
}

fn default_fallback_target_pct() -> f64 {
    1.2
}

fn default_strong_win_rate() -> String {
    "72%".to_string()
}

fn default_fallback_win_rate() -> String {
    "58%".to_string()
}

// =============================================================================
// SignalPolicy
// =============================================================================

/// Indicator periods and classifier constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPolicy {
    /// Fast EMA look-back.
    #[serde(default = "default_fast_period")]
    pub fast_period: usize,

    /// Slow EMA look-back. Must exceed `fast_period`.
    #[serde(default = "default_slow_period")]
    pub slow_period: usize,

    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    /// A bullish EMA cross only counts as a strong LONG below this RSI.
    #[serde(default = "default_long_rsi_ceiling")]
    pub long_rsi_ceiling: f64,

    /// A bearish EMA cross only counts as a strong SHORT above this RSI.
    #[serde(default = "default_short_rsi_floor")]
    pub short_rsi_floor: f64,

    /// Stop distance for strong setups, percent of entry.
    #[serde(default = "default_strong_stop_pct")]
    pub strong_stop_pct: f64,

    /// Target distance for strong setups, percent of entry.
    #[serde(default = "default_strong_target_pct")]
    pub strong_target_pct: f64,

    #[serde(default = "default_fallback_stop_pct")]
    pub fallback_stop_pct: f64,

    #[serde(default = "default_fallback_target_pct")]
    pub fallback_target_pct: f64,

    /// Informational win-rate label shown on strong setups.
    #[serde(default = "default_strong_win_rate")]
    pub strong_win_rate: String,

    #[serde(default = "default_fallback_win_rate")]
    pub fallback_win_rate: String,
}

impl Default for SignalPolicy {
    fn default() -> Self {
        Self {
            fast_period: default_fast_period(),
            slow_period: default_slow_period(),
            rsi_period: default_rsi_period(),
            long_rsi_ceiling: default_long_rsi_ceiling(),
            short_rsi_floor: default_short_rsi_floor(),
            strong_stop_pct: default_strong_stop_pct(),
            strong_target_pct: default_strong_target_pct(),
            fallback_stop_pct: default_fallback_stop_pct(),
            fallback_target_pct: default_fallback_target_pct(),
            strong_win_rate: default_strong_win_rate(),
            fallback_win_rate: default_fallback_win_rate(),
        }
    }
}

impl SignalPolicy {
    /// Reject policies the indicator engine or classifier cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.fast_period == 0 || self.slow_period == 0 || self.rsi_period == 0 {
            anyhow::bail!("indicator periods must be non-zero");
        }
        if self.fast_period >= self.slow_period {
            anyhow::bail!(
                "fast_period ({}) must be shorter than slow_period ({})",
                self.fast_period,
                self.slow_period
            );
        }
        let band = 0.0..=100.0;
        if !band.contains(&self.long_rsi_ceiling) || !band.contains(&self.short_rsi_floor) {
            anyhow::bail!("RSI thresholds must lie within 0..=100");
        }
        let pcts = [
            self.strong_stop_pct,
            self.strong_target_pct,
            self.fallback_stop_pct,
            self.fallback_target_pct,
        ];
        if pcts.iter().any(|p| !p.is_finite() || *p <= 0.0 || *p >= 100.0) {
            anyhow::bail!("stop/target percentages must lie strictly between 0 and 100");
        }
        Ok(())
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the signal service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Access control ------------------------------------------------------

    /// Operator account: never throttled, always subscribed.
    #[serde(default)]
    pub admin_user_id: Option<String>,

    /// Free signals an unsubscribed user may receive.
    #[serde(default = "default_free_signal_limit")]
    pub free_signal_limit: u32,

    /// Register unknown callers on their first signal request.
    #[serde(default = "default_true")]
    pub auto_register_on_signal: bool,

    /// When set, the public payment-confirmation toggle is refused and only
    /// the operator endpoint can activate subscriptions.
    #[serde(default)]
    pub require_operator_activation: bool,

    // --- Candle source -------------------------------------------------------

    #[serde(default = "default_candle_source_url")]
    pub candle_source_url: String,

    /// Closes requested per signal.
    #[serde(default = "default_candle_limit")]
    pub candle_limit: u32,

    /// Upper bound on a single candle fetch.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    // --- Classifier ----------------------------------------------------------

    #[serde(default)]
    pub signal_policy: SignalPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            admin_user_id: None,
            free_signal_limit: default_free_signal_limit(),
            auto_register_on_signal: true,
            require_operator_activation: false,
            candle_source_url: default_candle_source_url(),
            candle_limit: default_candle_limit(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            signal_policy: SignalPolicy::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        config
            .signal_policy
            .validate()
            .with_context(|| format!("invalid signal policy in {}", path.display()))?;

        info!(
            path = %path.display(),
            free_signal_limit = config.free_signal_limit,
            candle_limit = config.candle_limit,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply `ALPINA_*` environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(admin) = std::env::var("ALPINA_ADMIN_ID") {
            let admin = admin.trim();
            if !admin.is_empty() {
                self.admin_user_id = Some(admin.to_string());
            }
        }
        if let Ok(url) = std::env::var("ALPINA_CANDLE_SOURCE_URL") {
            let url = url.trim().trim_end_matches('/');
            if !url.is_empty() {
                self.candle_source_url = url.to_string();
            }
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
