pub mod source;

// Re-export for convenient access (e.g. `use crate::market_data::CandleSource`).
pub use source::{closes, Candle, CandleSource};
