pub mod candle_series;
pub mod tick_state;

// Re-export the core value types for convenient access (e.g. `use crate::market_data::Candle`).
pub use candle_series::{Candle, CandleSeries, MergeOutcome};
pub use tick_state::{Tick, TickState};
