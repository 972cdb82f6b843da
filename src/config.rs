use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::ComponentKind;

pub type SharedConfig = Arc<RwLock<Config>>;

/// Relative weight of each analysis slot. Must sum to 1.0 when every slot
/// is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentWeights {
    pub pattern: f64,
    pub trend: f64,
    pub statistical: f64,
    pub volume: f64,
    pub indicator: f64,
    pub model: f64,
    pub exploratory: f64,
    pub sentiment: f64,
}

impl ComponentWeights {
    pub fn get(&self, kind: ComponentKind) -> f64 {
        match kind {
            ComponentKind::Pattern => self.pattern,
            ComponentKind::Trend => self.trend,
            ComponentKind::Statistical => self.statistical,
            ComponentKind::Volume => self.volume,
            ComponentKind::Indicator => self.indicator,
            ComponentKind::Model => self.model,
            ComponentKind::Exploratory => self.exploratory,
            ComponentKind::Sentiment => self.sentiment,
        }
    }

    pub fn sum(&self) -> f64 {
        ComponentKind::ALL.iter().map(|&k| self.get(k)).sum()
    }
}

impl Default for ComponentWeights {
    fn default() -> Self {
        Self {
            pattern: 0.15,
            trend: 0.15,
            statistical: 0.10,
            volume: 0.15,
            indicator: 0.20,
            model: 0.15,
            exploratory: 0.05,
            sentiment: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeverageRange {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("capital split violated: active {active} + buffer {buffer} != total {total}")]
    CapitalSplit {
        active: f64,
        buffer: f64,
        total: f64,
    },
    #[error("position budget violated: {max_positions} positions x {min_trade_size} min trade > active capital {active}")]
    PositionBudget {
        max_positions: usize,
        min_trade_size: f64,
        active: f64,
    },
    #[error("component weights sum to {sum}, expected 1.0")]
    WeightSum { sum: f64 },
    #[error("no instruments configured")]
    NoInstruments,
    #[error("invalid position count bounds: min {min} > max {max}")]
    PositionBounds { min: usize, max: usize },
    #[error("invalid leverage range: min {min}, default {default}, max {max}")]
    LeverageBounds { min: f64, default: f64, max: f64 },
    #[error("invalid per-asset fraction bounds: min {min}, max {max}")]
    FractionBounds { min: f64, max: f64 },
    #[error("{field} must be positive (got {value})")]
    NonPositive { field: &'static str, value: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Exchange
    pub exchange: String,
    pub instruments: Vec<String>,
    pub coinbase_api_key: String,
    pub coinbase_api_secret: String,

    // Capital pool
    pub total_capital: f64,
    pub active_capital: f64,
    pub safety_buffer: f64,
    pub minimum_trade_size: f64,

    // Allocation
    pub min_positions: usize,
    pub max_positions: usize,
    pub confidence_threshold: f64,
    pub min_fraction_per_asset: f64,
    pub max_fraction_per_asset: f64,
    pub diversification_threshold: f64,
    pub leverage: LeverageRange,
    pub reference_volatility: f64,
    pub efficiency_floor: f64,

    // Signal pricing
    pub order_value: f64,
    pub target_profit: f64,
    pub stop_fraction: f64,

    // Aggregation
    pub component_weights: ComponentWeights,
    pub allow_simulated_signals: bool,

    // Fees & Slippage (as fraction, e.g., 0.001 = 0.1%)
    pub fee_rate: f64,
    pub slippage_rate: f64,

    // Task intervals (seconds)
    pub analysis_interval: u64,
    pub trade_interval: u64,
    pub rebalance_interval: u64,
    pub status_interval: u64,
    pub request_timeout_secs: u64,

    // Logging
    pub paper_trade: bool,
    pub log_dir: String,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };

        let instruments: Vec<String> = env(
            "INSTRUMENTS",
            "BTC-USD,ETH-USD,SOL-USD,XRP-USD,ADA-USD",
        )
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

        Config {
            exchange: "coinbase".to_string(),
            instruments,
            coinbase_api_key: env("COINBASE_API_KEY", ""),
            coinbase_api_secret: env("COINBASE_API_SECRET", "").replace("\\n", "\n"),
            total_capital: env("TOTAL_CAPITAL", "12").parse().unwrap_or(12.0),
            active_capital: env("ACTIVE_CAPITAL", "10").parse().unwrap_or(10.0),
            safety_buffer: env("SAFETY_BUFFER", "2").parse().unwrap_or(2.0),
            minimum_trade_size: env("MIN_TRADE_SIZE", "1").parse().unwrap_or(1.0),
            min_positions: env("MIN_POSITIONS", "3").parse().unwrap_or(3),
            max_positions: env("MAX_POSITIONS", "5").parse().unwrap_or(5),
            confidence_threshold: env("CONFIDENCE_THRESHOLD", "0.75")
                .parse()
                .unwrap_or(0.75),
            min_fraction_per_asset: 0.10,
            max_fraction_per_asset: 0.60,
            diversification_threshold: env("DIVERSIFICATION_THRESHOLD", "0.005")
                .parse()
                .unwrap_or(0.005),
            leverage: LeverageRange {
                min: env("LEVERAGE_MIN", "5").parse().unwrap_or(5.0),
                max: env("LEVERAGE_MAX", "20").parse().unwrap_or(20.0),
                default: env("LEVERAGE_DEFAULT", "10").parse().unwrap_or(10.0),
            },
            reference_volatility: env("REFERENCE_VOLATILITY", "0.02")
                .parse()
                .unwrap_or(0.02),
            efficiency_floor: env("EFFICIENCY_FLOOR", "0.8").parse().unwrap_or(0.8),
            order_value: env("ORDER_VALUE", "5").parse().unwrap_or(5.0),
            target_profit: env("TARGET_PROFIT", "0.6").parse().unwrap_or(0.6),
            stop_fraction: env("STOP_FRACTION", "0.0025").parse().unwrap_or(0.0025),
            component_weights: ComponentWeights::default(),
            allow_simulated_signals: env("ALLOW_SIMULATED_SIGNALS", "false")
                .to_lowercase()
                == "true",
            fee_rate: env("FEE_RATE", "0.001").parse().unwrap_or(0.001),
            slippage_rate: env("SLIPPAGE_RATE", "0.0005").parse().unwrap_or(0.0005),
            analysis_interval: env("ANALYSIS_INTERVAL", "30").parse().unwrap_or(30),
            trade_interval: env("TRADE_INTERVAL", "60").parse().unwrap_or(60),
            rebalance_interval: env("REBALANCE_INTERVAL", "900").parse().unwrap_or(900),
            status_interval: env("STATUS_INTERVAL", "300").parse().unwrap_or(300),
            request_timeout_secs: env("REQUEST_TIMEOUT", "10").parse().unwrap_or(10),
            paper_trade: env("PAPER_TRADE", "true").to_lowercase() == "true",
            log_dir: env("LOG_DIR", "logs"),
            log_level: env("LOG_LEVEL", "INFO"),
        }
    }

    /// Startup validation. The process must fail fast on any violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instruments.is_empty() {
            return Err(ConfigError::NoInstruments);
        }
        for (field, value) in [
            ("total_capital", self.total_capital),
            ("active_capital", self.active_capital),
            ("minimum_trade_size", self.minimum_trade_size),
            ("order_value", self.order_value),
            ("target_profit", self.target_profit),
            ("stop_fraction", self.stop_fraction),
            ("reference_volatility", self.reference_volatility),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        if self.safety_buffer < 0.0 {
            return Err(ConfigError::NonPositive {
                field: "safety_buffer",
                value: self.safety_buffer,
            });
        }
        // Exact by specification, not tolerance-based.
        if self.active_capital + self.safety_buffer != self.total_capital {
            return Err(ConfigError::CapitalSplit {
                active: self.active_capital,
                buffer: self.safety_buffer,
                total: self.total_capital,
            });
        }
        if self.max_positions as f64 * self.minimum_trade_size > self.active_capital {
            return Err(ConfigError::PositionBudget {
                max_positions: self.max_positions,
                min_trade_size: self.minimum_trade_size,
                active: self.active_capital,
            });
        }
        if self.min_positions == 0 || self.min_positions > self.max_positions {
            return Err(ConfigError::PositionBounds {
                min: self.min_positions,
                max: self.max_positions,
            });
        }
        let weight_sum = self.component_weights.sum();
        if (weight_sum - 1.0).abs() > 1e-9 {
            return Err(ConfigError::WeightSum { sum: weight_sum });
        }
        if self.leverage.min <= 0.0
            || self.leverage.min > self.leverage.max
            || self.leverage.default < self.leverage.min
            || self.leverage.default > self.leverage.max
        {
            return Err(ConfigError::LeverageBounds {
                min: self.leverage.min,
                default: self.leverage.default,
                max: self.leverage.max,
            });
        }
        if self.min_fraction_per_asset <= 0.0
            || self.min_fraction_per_asset > self.max_fraction_per_asset
            || self.max_fraction_per_asset > 1.0
        {
            return Err(ConfigError::FractionBounds {
                min: self.min_fraction_per_asset,
                max: self.max_fraction_per_asset,
            });
        }
        Ok(())
    }

    pub fn shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }
}
