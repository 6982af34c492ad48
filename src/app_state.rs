// =============================================================================
// Central Application State — Alpina Signal Service
// =============================================================================
//
// Ties the access controller, the signal service, the served-signal log and
// the runtime configuration together for the API layer.
//
// Thread safety:
//   - parking_lot::RwLock around the runtime config (never held across await).
//   - The access controller and user store manage their own interior
//     mutability.
// =============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use tracing::warn;

use crate::access::{AccessController, UserStore};
use crate::market_data::CandleSource;
use crate::runtime_config::{RuntimeConfig, SignalPolicy};
use crate::service::SignalService;
use crate::signals::SignalLog;
use crate::types::UserId;

/// Default on-disk location of the runtime config.
pub const CONFIG_PATH: &str = "runtime_config.json";

/// Shared state handed to every request handler via `Arc<AppState>`.
pub struct AppState {
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
    pub access: Arc<AccessController>,
    pub signals: SignalService,
    pub signal_log: SignalLog,
    /// Where policy changes are persisted; `None` disables saving.
    pub config_path: Option<PathBuf>,
    /// Bearer token for the operator endpoints; `None` locks them.
    pub operator_token: Option<String>,
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Wire up the service from `config`, a candle source and a user store.
    pub fn new(
        config: RuntimeConfig,
        source: Arc<dyn CandleSource>,
        store: Arc<dyn UserStore>,
        config_path: Option<PathBuf>,
    ) -> Self {
        let admin = config.admin_user_id.as_deref().and_then(UserId::parse);
        let access = Arc::new(AccessController::new(store, admin, config.free_signal_limit));
        let runtime_config = Arc::new(RwLock::new(config));
        let signals = SignalService::new(access.clone(), source, runtime_config.clone());

        Self {
            runtime_config,
            access,
            signals,
            signal_log: SignalLog::default(),
            config_path,
            operator_token: None,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_operator_token(mut self, token: Option<String>) -> Self {
        self.operator_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Replace the signal policy after validating it. Persisting to disk is
    /// best-effort; a failed save leaves the new policy active in memory.
    pub fn update_policy(&self, policy: SignalPolicy) -> Result<RuntimeConfig> {
        policy.validate()?;
        let snapshot = {
            let mut cfg = self.runtime_config.write();
            cfg.signal_policy = policy;
            cfg.clone()
        };
        if let Some(path) = &self.config_path {
            if let Err(e) = snapshot.save(path) {
                warn!(error = %e, "Failed to save signal policy to disk");
            }
        }
        Ok(snapshot)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
