// =============================================================================
// Binance REST Client — public kline data
// =============================================================================
//
// Only the unsigned market-data endpoint is used, so no API key is needed.
// Every payload is checked strictly: a non-array body, a short kline row, or
// a close that does not parse fails the whole fetch rather than yielding a
// thinner window.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::market_data::{Candle, CandleSource};
use crate::types::Timeframe;

/// Binance public REST client.
#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    client: reqwest::Client,
}

impl BinanceClient {
    /// Create a client against `base_url` (e.g. `https://api.binance.com`)
    /// whose requests give up after `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;

        debug!(base_url = %base_url, "BinanceClient initialised");

        Ok(Self { base_url, client })
    }

    /// GET /api/v3/klines (public, unsigned).
    ///
    /// Array indices used: [0] openTime, [4] close.
    #[instrument(skip(self), name = "binance::get_klines")]
    pub async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /api/v3/klines request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse klines response")?;

        if !status.is_success() {
            anyhow::bail!("Binance GET /api/v3/klines returned {}: {}", status, body);
        }

        let candles = parse_klines(&body)?;
        debug!(symbol, interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }
}

#[async_trait]
impl CandleSource for BinanceClient {
    async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: u32) -> Result<Vec<Candle>> {
        self.get_klines(symbol, timeframe.interval(), limit).await
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Payload parsing
// -----------------------------------------------------------------------------

/// Decode Binance's array-of-arrays kline payload, oldest first.
pub fn parse_klines(body: &serde_json::Value) -> Result<Vec<Candle>> {
    let raw = body.as_array().context("klines response is not an array")?;

    let mut candles: Vec<Candle> = Vec::with_capacity(raw.len());
    for (i, entry) in raw.iter().enumerate() {
        let arr = entry
            .as_array()
            .with_context(|| format!("kline entry {i} is not an array"))?;
        if arr.len() < 5 {
            anyhow::bail!("kline entry {i} has {} elements, expected at least 5", arr.len());
        }

        let open_time = arr[0]
            .as_i64()
            .with_context(|| format!("kline entry {i} has a non-integer open time"))?;
        let close = parse_str_f64(&arr[4]).with_context(|| format!("kline entry {i} close"))?;

        if let Some(prev) = candles.last() {
            if open_time <= prev.open_time {
                anyhow::bail!("kline entry {i} is out of order");
            }
        }
        candles.push(Candle { open_time, close });
    }

    Ok(candles)
}

/// Parse a JSON value that may be either a string or a number into `f64`.
fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
    let parsed = if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .with_context(|| format!("failed to parse '{s}' as f64"))?
    } else if let Some(n) = val.as_f64() {
        n
    } else {
        anyhow::bail!("expected string or number, got: {val}")
    };
    if !parsed.is_finite() {
        anyhow::bail!("non-finite price: {val}");
    }
    Ok(parsed)
}
