use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::Timeframe;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn total_range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.close.max(self.open)
    }

    pub fn lower_wick(&self) -> f64 {
        self.close.min(self.open) - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Wraps Vec<Candle> with the helpers the analysis heuristics and the
/// volatility estimate need.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self { candles }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn tail(&self, n: usize) -> CandleSeries {
        let start = self.candles.len().saturating_sub(n);
        CandleSeries::new(self.candles[start..].to_vec())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candle> {
        self.candles.iter()
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }

    pub fn push(&mut self, candle: Candle) {
        self.candles.push(candle);
    }

    /// Sample standard deviation of close-to-close returns. Feeds the
    /// candidate's estimated volatility and the leverage rule.
    pub fn estimated_volatility(&self) -> Option<f64> {
        if self.candles.len() < 3 {
            return None;
        }
        let returns: Vec<f64> = self
            .candles
            .windows(2)
            .filter(|w| w[0].close > 0.0)
            .map(|w| (w[1].close - w[0].close) / w[0].close)
            .collect();
        if returns.len() < 2 {
            return None;
        }
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        Some(var.sqrt())
    }
}

impl std::ops::Index<usize> for CandleSeries {
    type Output = Candle;
    fn index(&self, index: usize) -> &Self::Output {
        &self.candles[index]
    }
}

impl<'a> IntoIterator for &'a CandleSeries {
    type Item = &'a Candle;
    type IntoIter = std::slice::Iter<'a, Candle>;
    fn into_iter(self) -> Self::IntoIter {
        self.candles.iter()
    }
}

/// Current prices per timeframe for one instrument, as delivered by the
/// market-data collaborator. The aggregator reads the finest available
/// timeframe as the entry price.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceView {
    prices: BTreeMap<Timeframe, f64>,
}

impl PriceView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, tf: Timeframe, price: f64) {
        if price.is_finite() && price > 0.0 {
            self.prices.insert(tf, price);
        }
    }

    pub fn get(&self, tf: Timeframe) -> Option<f64> {
        self.prices.get(&tf).copied()
    }

    /// Price from the most granular timeframe present, if any.
    pub fn most_granular(&self) -> Option<f64> {
        self.prices.iter().next().map(|(_, &p)| p)
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}
