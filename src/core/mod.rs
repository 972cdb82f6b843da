pub mod aggregator;
pub mod allocator;
pub mod capital;
pub mod precision;

pub use aggregator::SignalAggregator;
pub use allocator::{AllocationOutcome, CapitalAllocator};
pub use capital::{AllocationEntry, AllocationError, CapitalState, CapitalStatus};
