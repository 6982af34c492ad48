// =============================================================================
// Candle Source — where closing prices come from
// =============================================================================
//
// The signal service only needs an ordered window of closes. Anything that can
// produce one (the Binance REST client, a fixture in tests) implements
// `CandleSource`. Implementations make exactly one attempt per call: retries
// and backoff belong to whoever calls the service, and the timeout is applied
// by the service around the call.
// =============================================================================

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Timeframe;

/// A single kline. Only the close feeds the indicators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close: f64,
}

#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Fetch up to `limit` most recent candles for `symbol`, oldest first.
    ///
    /// A malformed payload is an error, never a partial list.
    async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: u32) -> Result<Vec<Candle>>;
}

/// Closing prices of `candles`, in order.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}
