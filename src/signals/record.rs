// =============================================================================
// Signal Records — audit trail of served signals
// =============================================================================
//
// One record per signal actually delivered (and charged). Blocked, no-setup
// and failed requests are not recorded here; they only show up in the logs.
// =============================================================================

use std::collections::VecDeque;

use parking_lot::RwLock;
use serde::Serialize;

use crate::signals::{Setup, Signal};
use crate::types::{Direction, Timeframe, UserId};

/// Maximum number of served signals retained.
pub const MAX_RECENT_SIGNALS: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct SignalRecord {
    /// Unique identifier for this record (UUID v4).
    pub id: String,
    pub user_id: UserId,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub direction: Direction,
    pub setup: Setup,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// ISO 8601 timestamp.
    pub created_at: String,
}

impl SignalRecord {
    pub fn new(user_id: UserId, symbol: impl Into<String>, timeframe: Timeframe, signal: &Signal) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            symbol: symbol.into(),
            timeframe,
            direction: signal.direction,
            setup: signal.setup,
            entry: signal.entry,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Bounded, thread-safe log of recent records; oldest entries are evicted.
pub struct SignalLog {
    records: RwLock<VecDeque<SignalRecord>>,
    capacity: usize,
}

impl SignalLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, record: SignalRecord) {
        let mut records = self.records.write();
        records.push_back(record);
        while records.len() > self.capacity {
            records.pop_front();
        }
    }

    /// Newest first.
    pub fn recent(&self) -> Vec<SignalRecord> {
        self.records.read().iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }
}

impl Default for SignalLog {
    fn default() -> Self {
        Self::new(MAX_RECENT_SIGNALS)
    }
}
