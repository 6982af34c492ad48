// =============================================================================
// Signal Service — per-request orchestration
// =============================================================================
//
// Pipeline (strictly sequential, no partial results):
//   1. Validate identifier / symbol / timeframe
//   2. Look up the account             (UnknownUser)
//   3. Authorize                       (Blocked; candle source untouched)
//   4. Fetch candles, bounded timeout  (Error; no quota action)
//   5. Indicator snapshot              (NoSignal when history is short)
//   6. Classify
//   7. Charge one free signal
//   8. Return the signal
//
// Steps 3 through 7 run under the caller's per-user lock; callers exempt from
// the quota release it after step 3. Every failure is folded into exactly one
// of the four outcomes at this boundary. The candle fetch gets a single
// attempt; retrying is the caller's business.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::access::{AccessController, AccessDecision, DenyReason};
use crate::error::SignalError;
use crate::indicators::IndicatorSnapshot;
use crate::market_data::{closes, Candle, CandleSource};
use crate::runtime_config::RuntimeConfig;
use crate::signals::{classify, Signal};
use crate::types::{Timeframe, UserId};

// =============================================================================
// Requests
// =============================================================================

/// Signal request as it arrives over the wire. Every field is optional so
/// that missing data surfaces as `MalformedRequest` instead of a framework
/// rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSignalRequest {
    #[serde(default)]
    pub user_id: Option<serde_json::Value>,
    #[serde(default, alias = "symbol")]
    pub coin: Option<String>,
    #[serde(default)]
    pub timeframe: Option<serde_json::Value>,
}

/// A validated signal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalRequest {
    pub user_id: UserId,
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl SignalRequest {
    pub fn new(user_id: UserId, symbol: &str, timeframe: Timeframe) -> Result<Self, SignalError> {
        Ok(Self {
            user_id,
            symbol: normalise_symbol(symbol)?,
            timeframe,
        })
    }

    pub fn from_raw(raw: &RawSignalRequest) -> Result<Self, SignalError> {
        let user_id = raw
            .user_id
            .as_ref()
            .and_then(UserId::from_json)
            .ok_or_else(|| SignalError::MalformedRequest("missing user id".into()))?;

        let symbol = raw
            .coin
            .as_deref()
            .ok_or_else(|| SignalError::MalformedRequest("missing symbol".into()))?;

        let code = match raw.timeframe.as_ref() {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => return Err(SignalError::MalformedRequest("missing timeframe".into())),
        };
        let timeframe = Timeframe::from_code(&code)
            .ok_or_else(|| SignalError::MalformedRequest(format!("unsupported timeframe '{code}'")))?;

        Self::new(user_id, symbol, timeframe)
    }
}

/// Trim, strip a `BINANCE:` chart prefix, upper-case, and check shape.
fn normalise_symbol(raw: &str) -> Result<String, SignalError> {
    let trimmed = raw.trim();
    let bare = trimmed
        .strip_prefix("BINANCE:")
        .or_else(|| trimmed.strip_prefix("binance:"))
        .unwrap_or(trimmed);
    let symbol = bare.to_ascii_uppercase();

    let valid_len = (5..=20).contains(&symbol.len());
    if !valid_len || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(SignalError::MalformedRequest(format!("invalid symbol '{raw}'")));
    }
    Ok(symbol)
}

// =============================================================================
// Outcomes
// =============================================================================

/// Why a request ended in the generic error outcome. Kept server side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    MalformedRequest,
    UnknownUser,
    Transport,
}

/// The four mutually exclusive answers to a signal request.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    Served(Signal),
    Blocked,
    NoSignal,
    Error(FailureKind),
}

impl SignalOutcome {
    /// Fold any pipeline failure into its outcome.
    pub fn from_error(err: &SignalError) -> Self {
        match err {
            SignalError::MalformedRequest(_) => Self::Error(FailureKind::MalformedRequest),
            SignalError::UnknownUser(_) => Self::Error(FailureKind::UnknownUser),
            SignalError::QuotaExceeded(_) => Self::Blocked,
            SignalError::DataFetchFailure(_) | SignalError::FetchTimeout(_) => {
                Self::Error(FailureKind::Transport)
            }
            SignalError::InsufficientHistory { .. } => Self::NoSignal,
        }
    }

    pub fn signal(&self) -> Option<&Signal> {
        match self {
            Self::Served(signal) => Some(signal),
            _ => None,
        }
    }
}

/// `Served` encodes as the signal payload; the others as `{"blocked":true}`,
/// `{"noSignal":true}` and `{"error":true}`.
impl Serialize for SignalOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let flag = match self {
            Self::Served(signal) => return signal.serialize(serializer),
            Self::Blocked => "blocked",
            Self::NoSignal => "noSignal",
            Self::Error(_) => "error",
        };
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(flag, &true)?;
        map.end()
    }
}

// =============================================================================
// Service
// =============================================================================

pub struct SignalService {
    access: Arc<AccessController>,
    source: Arc<dyn CandleSource>,
    config: Arc<RwLock<RuntimeConfig>>,
}

impl SignalService {
    pub fn new(
        access: Arc<AccessController>,
        source: Arc<dyn CandleSource>,
        config: Arc<RwLock<RuntimeConfig>>,
    ) -> Self {
        Self {
            access,
            source,
            config,
        }
    }

    /// Run the full pipeline for an already validated request.
    pub async fn serve(&self, req: &SignalRequest) -> SignalOutcome {
        match self.try_serve(req).await {
            Ok(signal) => {
                info!(
                    user = %req.user_id,
                    symbol = %req.symbol,
                    timeframe = %req.timeframe,
                    direction = %signal.direction,
                    confidence = %signal.confidence,
                    "signal served"
                );
                SignalOutcome::Served(signal)
            }
            Err(e) => {
                match &e {
                    SignalError::QuotaExceeded(_) => {
                        info!(user = %req.user_id, "signal blocked: free quota exhausted")
                    }
                    SignalError::InsufficientHistory { .. } => {
                        debug!(user = %req.user_id, symbol = %req.symbol, error = %e, "no setup")
                    }
                    e if e.is_transport() => {
                        warn!(user = %req.user_id, symbol = %req.symbol, error = %e, "candle source failed")
                    }
                    _ => debug!(user = %req.user_id, error = %e, "signal request rejected"),
                }
                SignalOutcome::from_error(&e)
            }
        }
    }

    async fn try_serve(&self, req: &SignalRequest) -> Result<Signal, SignalError> {
        let user = &req.user_id;
        if self.access.account(user).is_none() {
            return Err(SignalError::UnknownUser(user.clone()));
        }

        let guard = self.access.lock_user(user).await;

        match self.access.authorize(user)? {
            AccessDecision::Permit => {}
            AccessDecision::Deny(DenyReason::QuotaExceeded) => {
                return Err(SignalError::QuotaExceeded(user.clone()));
            }
        }

        // Exempt callers are never charged, so their fetches need not queue.
        let _guard = if self.access.is_quota_exempt(user) {
            drop(guard);
            None
        } else {
            Some(guard)
        };

        // Snapshot config before the first await point.
        let (limit, timeout, policy) = {
            let cfg = self.config.read();
            (cfg.candle_limit, cfg.fetch_timeout(), cfg.signal_policy.clone())
        };

        let candles = self.fetch_candles(req, limit, timeout).await?;
        let snapshot = IndicatorSnapshot::compute(&closes(&candles), &policy)?;
        let signal = classify(&snapshot, &policy);

        self.access.charge(user)?;
        Ok(signal)
    }

    /// One bounded attempt against the candle source.
    async fn fetch_candles(
        &self,
        req: &SignalRequest,
        limit: u32,
        timeout: Duration,
    ) -> Result<Vec<Candle>, SignalError> {
        let fetch = self.source.fetch_candles(&req.symbol, req.timeframe, limit);
        match tokio::time::timeout(timeout, fetch).await {
            Ok(Ok(candles)) => Ok(candles),
            Ok(Err(e)) => Err(SignalError::DataFetchFailure(e)),
            Err(_) => Err(SignalError::FetchTimeout(timeout)),
        }
    }
}
