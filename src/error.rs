// =============================================================================
// Signal pipeline errors
// =============================================================================
//
// Every failure a signal request can hit. The orchestrator catches all of them
// and folds them into one of the four response outcomes; none of these ever
// reach a client verbatim.
// =============================================================================

use std::time::Duration;

use thiserror::Error;

use crate::types::UserId;

#[derive(Debug, Error)]
pub enum SignalError {
    /// Missing or invalid identifier, symbol, or timeframe.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("unknown user {0}")]
    UnknownUser(UserId),

    #[error("free signal quota exhausted for {0}")]
    QuotaExceeded(UserId),

    /// Candle source unreachable or returned something that is not a candle list.
    #[error("candle fetch failed: {0:#}")]
    DataFetchFailure(anyhow::Error),

    #[error("candle fetch timed out after {0:?}")]
    FetchTimeout(Duration),

    #[error("insufficient history: have {available} closes, need {required}")]
    InsufficientHistory { available: usize, required: usize },
}

impl SignalError {
    /// Whether the failure came from the external candle source.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::DataFetchFailure(_) | Self::FetchTimeout(_))
    }
}
