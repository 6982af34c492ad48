// =============================================================================
// Signals Module
// =============================================================================
//
// `classifier` turns an indicator snapshot into a directional call;
// `record` keeps the audit trail of served calls for operators.

pub mod classifier;
pub mod record;

pub use classifier::{classify, Setup, Signal};
pub use record::{SignalLog, SignalRecord};
