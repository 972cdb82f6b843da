use chrono::{DateTime, Duration, Utc};

use crate::config::{ComponentWeights, Config, LeverageRange};
use crate::models::{
    AnalysisComponentResult, CandidateAsset, Candle, CandleSeries, ComponentDirection,
    ComponentKind, DataQuality,
};

/// Create candles from (open, high, low, close) tuples with auto-incrementing 1m timestamps.
pub fn make_candles(data: &[(f64, f64, f64, f64)]) -> CandleSeries {
    let base = DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc);

    let candles: Vec<Candle> = data
        .iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| Candle {
            timestamp: base + Duration::minutes(i as i64),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 100.0,
        })
        .collect();

    CandleSeries::new(candles)
}

/// Create n rising (bullish) candles starting from `start` price.
pub fn make_bullish_trend(n: usize, start: f64) -> CandleSeries {
    let base = DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc);

    let candles: Vec<Candle> = (0..n)
        .map(|i| {
            let open = start + i as f64 * 10.0;
            let close = open + 8.0;
            Candle {
                timestamp: base + Duration::minutes(i as i64),
                open,
                high: close + 2.0,
                low: open - 1.0,
                close,
                volume: 100.0,
            }
        })
        .collect();

    CandleSeries::new(candles)
}

/// Create n falling (bearish) candles starting from `start` price.
pub fn make_bearish_trend(n: usize, start: f64) -> CandleSeries {
    let base = DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc);

    let candles: Vec<Candle> = (0..n)
        .map(|i| {
            let open = start - i as f64 * 10.0;
            let close = open - 8.0;
            Candle {
                timestamp: base + Duration::minutes(i as i64),
                open,
                high: open + 1.0,
                low: close - 2.0,
                close,
                volume: 100.0,
            }
        })
        .collect();

    CandleSeries::new(candles)
}

/// A Config suitable for testing: paper mode, no API keys needed, temp log dir.
pub fn default_test_config() -> Config {
    Config {
        exchange: "coinbase".to_string(),
        instruments: vec![
            "BTC-USD".to_string(),
            "ETH-USD".to_string(),
            "SOL-USD".to_string(),
            "XRP-USD".to_string(),
            "ADA-USD".to_string(),
        ],
        coinbase_api_key: String::new(),
        coinbase_api_secret: String::new(),
        total_capital: 12.0,
        active_capital: 10.0,
        safety_buffer: 2.0,
        minimum_trade_size: 1.0,
        min_positions: 3,
        max_positions: 5,
        confidence_threshold: 0.75,
        min_fraction_per_asset: 0.10,
        max_fraction_per_asset: 0.60,
        diversification_threshold: 0.005,
        leverage: LeverageRange {
            min: 5.0,
            max: 20.0,
            default: 10.0,
        },
        reference_volatility: 0.02,
        efficiency_floor: 0.8,
        order_value: 5.0,
        target_profit: 0.6,
        stop_fraction: 0.0025,
        component_weights: ComponentWeights::default(),
        allow_simulated_signals: false,
        fee_rate: 0.001,
        slippage_rate: 0.0005,
        analysis_interval: 30,
        trade_interval: 60,
        rebalance_interval: 900,
        status_interval: 300,
        request_timeout_secs: 10,
        paper_trade: true,
        log_dir: std::env::temp_dir()
            .join("confluence_bot_test")
            .to_string_lossy()
            .to_string(),
        log_level: "ERROR".to_string(),
    }
}

/// A present analysis-slot result with real data quality.
pub fn component(
    kind: ComponentKind,
    direction: ComponentDirection,
    confidence: f64,
) -> AnalysisComponentResult {
    AnalysisComponentResult::new(kind, direction, confidence, DataQuality::Real)
}

/// An allocation candidate.
pub fn candidate(instrument: &str, confidence: f64, volatility: f64) -> CandidateAsset {
    CandidateAsset {
        instrument: instrument.to_string(),
        confidence,
        estimated_volatility: volatility,
    }
}
