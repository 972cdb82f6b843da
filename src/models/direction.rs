use serde::{Deserialize, Serialize};
use std::fmt;

/// Final direction of an aggregated signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalDirection {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl SignalDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalDirection::Buy => "buy",
            SignalDirection::Sell => "sell",
            SignalDirection::Hold => "hold",
        }
    }

    pub fn is_actionable(&self) -> bool {
        !matches!(self, SignalDirection::Hold)
    }
}

/// Direction reported by a single analysis component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentDirection {
    Buy,
    Sell,
    Neutral,
}

impl fmt::Display for ComponentDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentDirection::Buy => write!(f, "buy"),
            ComponentDirection::Sell => write!(f, "sell"),
            ComponentDirection::Neutral => write!(f, "neutral"),
        }
    }
}

impl ComponentDirection {
    pub fn to_signal(self) -> Option<SignalDirection> {
        match self {
            ComponentDirection::Buy => Some(SignalDirection::Buy),
            ComponentDirection::Sell => Some(SignalDirection::Sell),
            ComponentDirection::Neutral => None,
        }
    }
}

/// Whether a component result came from a real analysis backend or a
/// heuristic stand-in. Simulated results never trade without an explicit
/// config override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    Real,
    Simulated,
}

impl fmt::Display for DataQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQuality::Real => write!(f, "real"),
            DataQuality::Simulated => write!(f, "simulated"),
        }
    }
}
