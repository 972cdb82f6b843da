use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::analysis::AnalysisSource;
use crate::models::{
    AnalysisComponentResult, CandleSeries, ComponentDirection, ComponentKind, ComponentSet,
    DataQuality, Timeframe,
};

const TREND_FAST: usize = 10;
const TREND_SLOW: usize = 30;
const RSI_PERIOD: usize = 14;
const LOOKBACK: usize = 20;

/// Candle-derived stand-ins for the external analyzer fleet, one heuristic
/// per slot. Every result is tagged `Simulated`: these are placeholders,
/// not real model backends, and the bot will not trade on them unless
/// explicitly configured to.
pub struct HeuristicAnalysisSource;

impl HeuristicAnalysisSource {
    pub fn new() -> Self {
        Self
    }

    fn series<'a>(data: &'a HashMap<Timeframe, CandleSeries>) -> Option<&'a CandleSeries> {
        // Finest timeframe with enough history.
        [Timeframe::M1, Timeframe::M5, Timeframe::M15, Timeframe::H1]
            .iter()
            .filter_map(|tf| data.get(tf))
            .find(|s| s.len() >= TREND_SLOW + 1)
    }

    fn result(
        kind: ComponentKind,
        direction: ComponentDirection,
        confidence: f64,
    ) -> AnalysisComponentResult {
        AnalysisComponentResult::new(kind, direction, confidence, DataQuality::Simulated)
    }

    fn pattern(series: &CandleSeries) -> Option<AnalysisComponentResult> {
        let last = series.last()?;
        let prev = series.get(series.len().checked_sub(2)?)?;

        let range = last.total_range();
        if range <= 0.0 || last.body() < range * 0.1 {
            // Doji-like candle carries no directional information.
            return Some(Self::result(
                ComponentKind::Pattern,
                ComponentDirection::Neutral,
                0.5,
            ));
        }
        if prev.is_bearish() && last.is_bullish() && last.close > prev.open {
            return Some(Self::result(
                ComponentKind::Pattern,
                ComponentDirection::Buy,
                0.8,
            ));
        }
        if prev.is_bullish() && last.is_bearish() && last.close < prev.open {
            return Some(Self::result(
                ComponentKind::Pattern,
                ComponentDirection::Sell,
                0.8,
            ));
        }
        let direction = if last.is_bullish() {
            ComponentDirection::Buy
        } else {
            ComponentDirection::Sell
        };
        Some(Self::result(ComponentKind::Pattern, direction, 0.6))
    }

    fn trend(closes: &[f64]) -> Option<AnalysisComponentResult> {
        let fast = sma(closes, TREND_FAST)?;
        let slow = sma(closes, TREND_SLOW)?;
        if slow <= 0.0 {
            return None;
        }
        let spread = (fast - slow) / slow;
        let direction = if spread > 0.0 {
            ComponentDirection::Buy
        } else if spread < 0.0 {
            ComponentDirection::Sell
        } else {
            ComponentDirection::Neutral
        };
        let confidence = (0.5 + spread.abs() * 50.0).min(0.95);
        Some(Self::result(ComponentKind::Trend, direction, confidence))
    }

    fn statistical(closes: &[f64]) -> Option<AnalysisComponentResult> {
        if closes.len() < TREND_SLOW {
            return None;
        }
        let window = &closes[closes.len() - TREND_SLOW..];
        let n = window.len() as f64;
        let mean = window.iter().sum::<f64>() / n;
        let var = window.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let std = var.sqrt();
        if std <= 0.0 {
            return Some(Self::result(
                ComponentKind::Statistical,
                ComponentDirection::Neutral,
                0.5,
            ));
        }
        let z = (closes[closes.len() - 1] - mean) / std;
        // Mean reversion: stretched prices argue for the opposite side.
        let (direction, confidence) = if z < -1.5 {
            (ComponentDirection::Buy, (z.abs() / 3.0).min(0.9))
        } else if z > 1.5 {
            (ComponentDirection::Sell, (z.abs() / 3.0).min(0.9))
        } else {
            (ComponentDirection::Neutral, 0.5)
        };
        Some(Self::result(ComponentKind::Statistical, direction, confidence))
    }

    fn volume(series: &CandleSeries) -> Option<AnalysisComponentResult> {
        let volumes = series.volumes();
        if volumes.len() < LOOKBACK + 1 {
            return None;
        }
        let avg = volumes[volumes.len() - LOOKBACK - 1..volumes.len() - 1]
            .iter()
            .sum::<f64>()
            / LOOKBACK as f64;
        let last_vol = volumes[volumes.len() - 1];
        let last = series.last()?;
        if avg > 0.0 && last_vol > avg * 1.5 {
            let direction = if last.is_bullish() {
                ComponentDirection::Buy
            } else if last.is_bearish() {
                ComponentDirection::Sell
            } else {
                ComponentDirection::Neutral
            };
            return Some(Self::result(ComponentKind::Volume, direction, 0.65));
        }
        Some(Self::result(
            ComponentKind::Volume,
            ComponentDirection::Neutral,
            0.5,
        ))
    }

    fn indicator(closes: &[f64]) -> Option<AnalysisComponentResult> {
        let rsi = rsi(closes, RSI_PERIOD)?;
        let (direction, confidence) = if rsi < 30.0 {
            (ComponentDirection::Buy, 0.6 + (30.0 - rsi) / 100.0)
        } else if rsi > 70.0 {
            (ComponentDirection::Sell, 0.6 + (rsi - 70.0) / 100.0)
        } else {
            (ComponentDirection::Neutral, 0.5)
        };
        Some(Self::result(ComponentKind::Indicator, direction, confidence))
    }

    fn model(closes: &[f64]) -> Option<AnalysisComponentResult> {
        if closes.len() < TREND_FAST + 1 {
            return None;
        }
        let past = closes[closes.len() - 1 - TREND_FAST];
        if past <= 0.0 {
            return None;
        }
        let momentum = (closes[closes.len() - 1] - past) / past;
        let (direction, confidence) = if momentum > 0.02 {
            (ComponentDirection::Buy, (0.6 + momentum * 5.0).min(0.9))
        } else if momentum < -0.02 {
            (ComponentDirection::Sell, (0.6 + momentum.abs() * 5.0).min(0.9))
        } else {
            (ComponentDirection::Neutral, 0.5)
        };
        Some(Self::result(ComponentKind::Model, direction, confidence))
    }

    fn exploratory(series: &CandleSeries) -> Option<AnalysisComponentResult> {
        if series.len() < LOOKBACK + 1 {
            return None;
        }
        let last = series.last()?;
        let prior = series.tail(LOOKBACK + 1);
        let prior = prior.as_slice();
        let prior = &prior[..prior.len() - 1];
        let high = prior.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let low = prior.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let (direction, confidence) = if last.close > high {
            (ComponentDirection::Buy, 0.7)
        } else if last.close < low {
            (ComponentDirection::Sell, 0.7)
        } else {
            (ComponentDirection::Neutral, 0.5)
        };
        Some(Self::result(ComponentKind::Exploratory, direction, confidence))
    }

    fn sentiment(series: &CandleSeries) -> Option<AnalysisComponentResult> {
        if series.len() < LOOKBACK {
            return None;
        }
        let tail = series.tail(LOOKBACK);
        let bullish = tail.iter().filter(|c| c.is_bullish()).count() as f64;
        let ratio = bullish / LOOKBACK as f64;
        let (direction, confidence) = if ratio > 0.6 {
            (ComponentDirection::Buy, ratio)
        } else if ratio < 0.4 {
            (ComponentDirection::Sell, 1.0 - ratio)
        } else {
            (ComponentDirection::Neutral, 0.5)
        };
        Some(Self::result(ComponentKind::Sentiment, direction, confidence))
    }
}

impl Default for HeuristicAnalysisSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisSource for HeuristicAnalysisSource {
    async fn components(
        &mut self,
        _instrument: &str,
        data: &HashMap<Timeframe, CandleSeries>,
    ) -> Result<ComponentSet> {
        let mut set = ComponentSet::default();
        let series = match Self::series(data) {
            Some(s) => s,
            None => return Ok(set),
        };
        let closes = series.closes();

        for result in [
            Self::pattern(series),
            Self::trend(&closes),
            Self::statistical(&closes),
            Self::volume(series),
            Self::indicator(&closes),
            Self::model(&closes),
            Self::exploratory(series),
            Self::sentiment(series),
        ]
        .into_iter()
        .flatten()
        {
            set.insert(result);
        }
        Ok(set)
    }
}

fn sma(values: &[f64], period: usize) -> Option<f64> {
    if values.len() < period || period == 0 {
        return None;
    }
    Some(values[values.len() - period..].iter().sum::<f64>() / period as f64)
}

fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period + 1 {
        return None;
    }
    let window = &closes[closes.len() - period - 1..];
    let mut gains = 0.0;
    let mut losses = 0.0;
    for pair in window.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            gains += delta;
        } else {
            losses += -delta;
        }
    }
    if losses == 0.0 {
        return Some(100.0);
    }
    let rs = gains / losses;
    Some(100.0 - 100.0 / (1.0 + rs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{make_bearish_trend, make_bullish_trend};

    fn data_for(series: CandleSeries) -> HashMap<Timeframe, CandleSeries> {
        let mut data = HashMap::new();
        data.insert(Timeframe::M1, series);
        data
    }

    #[tokio::test]
    async fn all_outputs_are_tagged_simulated() {
        let mut source = HeuristicAnalysisSource::new();
        let set = source
            .components("BTC-USD", &data_for(make_bullish_trend(60, 1000.0)))
            .await
            .unwrap();
        assert!(set.present_count() > 0);
        for result in set.present() {
            assert_eq!(result.quality, DataQuality::Simulated);
        }
    }

    #[tokio::test]
    async fn bullish_trend_reads_bullish() {
        let mut source = HeuristicAnalysisSource::new();
        let set = source
            .components("BTC-USD", &data_for(make_bullish_trend(60, 1000.0)))
            .await
            .unwrap();
        let trend = set.get(ComponentKind::Trend).unwrap();
        assert_eq!(trend.direction, ComponentDirection::Buy);
        let model = set.get(ComponentKind::Model).unwrap();
        assert_eq!(model.direction, ComponentDirection::Buy);
    }

    #[tokio::test]
    async fn bearish_trend_reads_bearish() {
        let mut source = HeuristicAnalysisSource::new();
        let set = source
            .components("BTC-USD", &data_for(make_bearish_trend(60, 5000.0)))
            .await
            .unwrap();
        let trend = set.get(ComponentKind::Trend).unwrap();
        assert_eq!(trend.direction, ComponentDirection::Sell);
    }

    #[tokio::test]
    async fn insufficient_data_yields_empty_set() {
        let mut source = HeuristicAnalysisSource::new();
        let set = source
            .components("BTC-USD", &data_for(make_bullish_trend(5, 1000.0)))
            .await
            .unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn rsi_of_straight_rally_is_maximal() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert!((rsi(&closes, 14).unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn sma_requires_enough_samples() {
        assert!(sma(&[1.0, 2.0], 3).is_none());
        assert!((sma(&[1.0, 2.0, 3.0], 3).unwrap() - 2.0).abs() < 1e-12);
    }
}
