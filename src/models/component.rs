use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{ComponentDirection, DataQuality, Timeframe};

/// The eight named analysis slots feeding the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Pattern,
    Trend,
    Statistical,
    Volume,
    Indicator,
    Model,
    Exploratory,
    Sentiment,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 8] = [
        ComponentKind::Pattern,
        ComponentKind::Trend,
        ComponentKind::Statistical,
        ComponentKind::Volume,
        ComponentKind::Indicator,
        ComponentKind::Model,
        ComponentKind::Exploratory,
        ComponentKind::Sentiment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Pattern => "pattern",
            ComponentKind::Trend => "trend",
            ComponentKind::Statistical => "statistical",
            ComponentKind::Volume => "volume",
            ComponentKind::Indicator => "indicator",
            ComponentKind::Model => "model",
            ComponentKind::Exploratory => "exploratory",
            ComponentKind::Sentiment => "sentiment",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A per-timeframe reading inside a component result. Ordered by timeframe,
/// finest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeReading {
    pub timeframe: Timeframe,
    pub direction: ComponentDirection,
    pub confidence: f64,
}

/// One analysis component's output for one instrument. Read-only to the
/// decision core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisComponentResult {
    pub kind: ComponentKind,
    pub direction: ComponentDirection,
    /// 0..=1
    pub confidence: f64,
    pub quality: DataQuality,
    #[serde(default)]
    pub timeframes: Vec<TimeframeReading>,
}

impl AnalysisComponentResult {
    pub fn new(
        kind: ComponentKind,
        direction: ComponentDirection,
        confidence: f64,
        quality: DataQuality,
    ) -> Self {
        Self {
            kind,
            direction,
            confidence: confidence.clamp(0.0, 1.0),
            quality,
            timeframes: Vec::new(),
        }
    }
}

/// The full slot table for one instrument. Absence is an explicit state:
/// an empty slot contributes neither score nor weight.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentSet {
    pub pattern: Option<AnalysisComponentResult>,
    pub trend: Option<AnalysisComponentResult>,
    pub statistical: Option<AnalysisComponentResult>,
    pub volume: Option<AnalysisComponentResult>,
    pub indicator: Option<AnalysisComponentResult>,
    pub model: Option<AnalysisComponentResult>,
    pub exploratory: Option<AnalysisComponentResult>,
    pub sentiment: Option<AnalysisComponentResult>,
}

impl ComponentSet {
    pub fn get(&self, kind: ComponentKind) -> Option<&AnalysisComponentResult> {
        match kind {
            ComponentKind::Pattern => self.pattern.as_ref(),
            ComponentKind::Trend => self.trend.as_ref(),
            ComponentKind::Statistical => self.statistical.as_ref(),
            ComponentKind::Volume => self.volume.as_ref(),
            ComponentKind::Indicator => self.indicator.as_ref(),
            ComponentKind::Model => self.model.as_ref(),
            ComponentKind::Exploratory => self.exploratory.as_ref(),
            ComponentKind::Sentiment => self.sentiment.as_ref(),
        }
    }

    pub fn insert(&mut self, result: AnalysisComponentResult) {
        let slot = match result.kind {
            ComponentKind::Pattern => &mut self.pattern,
            ComponentKind::Trend => &mut self.trend,
            ComponentKind::Statistical => &mut self.statistical,
            ComponentKind::Volume => &mut self.volume,
            ComponentKind::Indicator => &mut self.indicator,
            ComponentKind::Model => &mut self.model,
            ComponentKind::Exploratory => &mut self.exploratory,
            ComponentKind::Sentiment => &mut self.sentiment,
        };
        *slot = Some(result);
    }

    /// Present components in slot order.
    pub fn present(&self) -> impl Iterator<Item = &AnalysisComponentResult> {
        ComponentKind::ALL.iter().filter_map(|&k| self.get(k))
    }

    pub fn present_count(&self) -> usize {
        self.present().count()
    }

    pub fn is_empty(&self) -> bool {
        self.present_count() == 0
    }
}
