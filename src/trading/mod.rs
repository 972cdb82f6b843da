pub mod paper;

pub use paper::{PaperExecutor, Position, PositionStatus, TradingStats};

use crate::core::AllocationEntry;
use crate::models::AggregatedSignal;

/// Execution capability. Translating `capital x leverage` into an
/// exchange-native order (lot rounding, minimum quantity) is the
/// implementor's concern, not the decision core's.
pub trait ExecutionClient: Send + Sync {
    /// Open a position for a signal at the size the allocator granted it.
    /// None when the signal carries no prices or the instrument already
    /// holds an open position.
    fn open_position(
        &mut self,
        signal: &AggregatedSignal,
        entry: &AllocationEntry,
    ) -> Option<Position>;

    /// Mark all open positions on an instrument against a fresh price and
    /// return those that closed.
    fn check_positions(&mut self, instrument: &str, current_price: f64) -> Vec<Position>;

    fn has_open_position(&self, instrument: &str) -> bool;

    fn open_count(&self) -> usize;

    fn stats(&self) -> TradingStats;
}
