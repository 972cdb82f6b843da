use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ComponentDirection, ComponentKind, DataQuality, SignalDirection};

/// What one component contributed to an aggregated signal. Inactive entries
/// record the slot was absent and carried no weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentContribution {
    pub kind: ComponentKind,
    pub active: bool,
    pub weight: f64,
    pub direction: ComponentDirection,
    pub confidence: f64,
    pub quality: DataQuality,
}

impl ComponentContribution {
    pub fn absent(kind: ComponentKind, weight: f64) -> Self {
        Self {
            kind,
            active: false,
            weight,
            direction: ComponentDirection::Neutral,
            confidence: 0.0,
            quality: DataQuality::Real,
        }
    }
}

/// One actionable decision for one instrument. Immutable once produced;
/// consumed by the allocator or discarded on hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedSignal {
    pub instrument: String,
    pub direction: SignalDirection,
    /// 0..=1, the score that triggered the decision.
    pub confidence: f64,
    pub entry_price: Option<f64>,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
    /// Fixed absolute profit target per trade, from config.
    pub target_profit: f64,
    pub contributions: Vec<ComponentContribution>,
    /// Set when the signal was degraded (missing price, read failure).
    #[serde(default)]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AggregatedSignal {
    /// A degraded hold signal with zero confidence.
    pub fn hold(instrument: &str, target_profit: f64, note: Option<String>) -> Self {
        Self {
            instrument: instrument.to_string(),
            direction: SignalDirection::Hold,
            confidence: 0.0,
            entry_price: None,
            take_profit: None,
            stop_loss: None,
            target_profit,
            contributions: Vec::new(),
            note,
            created_at: Utc::now(),
        }
    }

    /// Simulated if any active contribution is simulated.
    pub fn data_quality(&self) -> DataQuality {
        let simulated = self
            .contributions
            .iter()
            .any(|c| c.active && c.quality == DataQuality::Simulated);
        if simulated {
            DataQuality::Simulated
        } else {
            DataQuality::Real
        }
    }

    /// Derive the allocator's view of this signal. None when the signal is
    /// not actionable.
    pub fn to_candidate(&self, estimated_volatility: f64) -> Option<CandidateAsset> {
        if !self.direction.is_actionable() {
            return None;
        }
        Some(CandidateAsset {
            instrument: self.instrument.clone(),
            confidence: self.confidence,
            estimated_volatility,
        })
    }
}

/// A direction-filtered signal eligible for capital allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateAsset {
    pub instrument: String,
    pub confidence: f64,
    pub estimated_volatility: f64,
}
