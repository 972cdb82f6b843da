pub mod heuristic;

pub use heuristic::HeuristicAnalysisSource;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::models::{CandleSeries, ComponentSet, Timeframe};

/// Boundary to the analysis-component fleet. Implementations fill whatever
/// slots they can; missing slots are legal output and carry no weight.
#[async_trait]
pub trait AnalysisSource: Send + Sync {
    async fn components(
        &mut self,
        instrument: &str,
        data: &HashMap<Timeframe, CandleSeries>,
    ) -> Result<ComponentSet>;
}
