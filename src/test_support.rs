// Shared fixtures for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::market_data::{Candle, CandleSource};
use crate::types::Timeframe;

pub enum Behaviour {
    Closes(Vec<f64>),
    /// Same closes, delivered after a pause.
    Slow(Vec<f64>, Duration),
    Fail,
    Hang,
}

/// Scripted candle source that counts how often it was asked and how many
/// fetches overlapped.
pub struct FakeSource {
    behaviour: Behaviour,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeSource {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

fn candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            open_time: i as i64 * 300_000,
            close,
        })
        .collect()
}

#[async_trait]
impl CandleSource for FakeSource {
    async fn fetch_candles(&self, _symbol: &str, _tf: Timeframe, _limit: u32) -> anyhow::Result<Vec<Candle>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = match &self.behaviour {
            Behaviour::Closes(closes) => Ok(candles(closes)),
            Behaviour::Slow(closes, pause) => {
                tokio::time::sleep(*pause).await;
                Ok(candles(closes))
            }
            Behaviour::Fail => Err(anyhow::anyhow!("connection reset by peer")),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Vec::new())
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Steady climb of 0.5 per candle from 100.
pub fn uptrend(n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 + i as f64 * 0.5).collect()
}

/// Steady trend of `step` per candle from 100, then an 8-candle retrace at
/// 1.2x the pace. With `step = 0.5` the EMAs still follow the trend while RSI
/// settles near 50 (fast 152.36 / slow 151.57 / RSI 50.7 over 120 closes), so
/// the strong branch fires; a negative `step` mirrors it.
pub fn trend_with_pullback(n: usize, step: f64) -> Vec<f64> {
    const PULLBACK: usize = 8;
    let trend_len = n.saturating_sub(PULLBACK);
    let mut closes: Vec<f64> = (0..trend_len).map(|i| 100.0 + step * i as f64).collect();
    let top = closes.last().copied().unwrap_or(100.0);
    closes.extend((1..=n - trend_len).map(|j| top - 1.2 * step * j as f64));
    closes
}

/// Sine wave around 100 with a linear drift.
pub fn wave(n: usize, phase: f64, drift: f64) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 + drift * i as f64 + ((i as f64 + phase) / 4.0).sin() * 2.0)
        .collect()
}
