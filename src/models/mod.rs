pub mod candle;
pub mod component;
pub mod direction;
pub mod signal;
pub mod timeframe;

pub use candle::{Candle, CandleSeries, PriceView};
pub use component::{AnalysisComponentResult, ComponentKind, ComponentSet, TimeframeReading};
pub use direction::{ComponentDirection, DataQuality, SignalDirection};
pub use signal::{AggregatedSignal, CandidateAsset, ComponentContribution};
pub use timeframe::Timeframe;
