use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::core::AllocationEntry;
use crate::models::{AggregatedSignal, SignalDirection};
use crate::trading::ExecutionClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    ClosedTp,
    ClosedSl,
}

/// One simulated position, sized from an allocation entry. Notional is
/// capital times leverage; fills are adjusted for fees and slippage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: u64,
    pub instrument: String,
    pub direction: SignalDirection,
    pub entry_price: f64,
    pub capital: f64,
    pub leverage: f64,
    pub size_usd: f64,
    pub units: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub confidence: f64,
    pub entry_time: String,
    pub status: PositionStatus,
    #[serde(default)]
    pub exit_price: Option<f64>,
    #[serde(default)]
    pub exit_time: Option<String>,
    #[serde(default)]
    pub pnl: f64,
}

pub struct PaperExecutor {
    pub balance: f64,
    pub positions: Vec<Position>,
    pub trade_history: Vec<Position>,
    pub trade_counter: u64,
    trades_file: String,
    /// When set, used instead of Utc::now() for timestamps
    pub sim_time: Option<DateTime<Utc>>,
    fee_rate: f64,
    slippage_rate: f64,
}

impl PaperExecutor {
    pub fn new(cfg: &Config) -> Self {
        let mut executor = Self {
            balance: cfg.total_capital,
            positions: Vec::new(),
            trade_history: Vec::new(),
            trade_counter: 0,
            trades_file: format!("{}/paper_trades.json", cfg.log_dir),
            sim_time: None,
            fee_rate: cfg.fee_rate,
            slippage_rate: cfg.slippage_rate,
        };
        executor.load_state(cfg);
        executor
    }

    fn now(&self) -> DateTime<Utc> {
        self.sim_time.unwrap_or_else(Utc::now)
    }

    fn close_position(&mut self, pos_idx: usize, exit_price: f64, status: PositionStatus) {
        let now_str = self.now().to_rfc3339();
        let fee_rate = self.fee_rate;
        let pos = &mut self.positions[pos_idx];

        let pnl = match pos.direction {
            SignalDirection::Buy => (exit_price - pos.entry_price) * pos.units,
            SignalDirection::Sell => (pos.entry_price - exit_price) * pos.units,
            SignalDirection::Hold => 0.0,
        };
        let exit_fee = pos.units * exit_price * fee_rate;
        let pnl = round2(pnl - exit_fee);

        pos.exit_price = Some(exit_price);
        pos.exit_time = Some(now_str);
        pos.status = status;
        pos.pnl = pnl;

        self.balance += pnl;
        self.trade_history.push(pos.clone());
    }

    fn save_state(&self) {
        if self.trades_file.is_empty() {
            return;
        }
        let _ = fs::create_dir_all(
            Path::new(&self.trades_file)
                .parent()
                .unwrap_or(Path::new("logs")),
        );

        let state = serde_json::json!({
            "balance": self.balance,
            "trade_counter": self.trade_counter,
            "positions": self.positions,
            "trade_history": self.trade_history,
        });

        if let Ok(json) = serde_json::to_string_pretty(&state) {
            let _ = fs::write(&self.trades_file, json);
        }
    }

    fn load_state(&mut self, cfg: &Config) {
        if let Ok(content) = fs::read_to_string(&self.trades_file) {
            if let Ok(state) = serde_json::from_str::<serde_json::Value>(&content) {
                self.balance = state["balance"].as_f64().unwrap_or(cfg.total_capital);
                self.trade_counter = state["trade_counter"].as_u64().unwrap_or(0);

                if let Ok(positions) =
                    serde_json::from_value::<Vec<Position>>(state["positions"].clone())
                {
                    self.positions = positions;
                }
                if let Ok(history) =
                    serde_json::from_value::<Vec<Position>>(state["trade_history"].clone())
                {
                    self.trade_history = history;
                }
            }
        }
    }
}

impl ExecutionClient for PaperExecutor {
    fn open_position(
        &mut self,
        signal: &AggregatedSignal,
        entry: &AllocationEntry,
    ) -> Option<Position> {
        let (entry_price, take_profit, stop_loss) =
            match (signal.entry_price, signal.take_profit, signal.stop_loss) {
                (Some(e), Some(tp), Some(sl)) => (e, tp, sl),
                _ => return None,
            };
        if entry_price <= 0.0 || self.has_open_position(&signal.instrument) {
            return None;
        }

        let size_usd = entry.notional();
        let units = size_usd / entry_price;

        // Entry fee + slippage come out of the balance up front.
        let entry_fee = size_usd * self.fee_rate;
        let slippage_cost = size_usd * self.slippage_rate;
        self.balance -= entry_fee + slippage_cost;

        // Fill price slips against the trade.
        let fill_price = match signal.direction {
            SignalDirection::Buy => entry_price * (1.0 + self.slippage_rate),
            SignalDirection::Sell => entry_price * (1.0 - self.slippage_rate),
            SignalDirection::Hold => return None,
        };

        self.trade_counter += 1;
        let pos = Position {
            id: self.trade_counter,
            instrument: signal.instrument.clone(),
            direction: signal.direction,
            entry_price: fill_price,
            capital: entry.capital,
            leverage: entry.leverage,
            size_usd: round2(size_usd),
            units: round8(units),
            stop_loss,
            take_profit,
            confidence: signal.confidence,
            entry_time: self.now().to_rfc3339(),
            status: PositionStatus::Open,
            exit_price: None,
            exit_time: None,
            pnl: 0.0,
        };

        self.positions.push(pos.clone());
        self.save_state();
        Some(pos)
    }

    fn check_positions(&mut self, instrument: &str, current_price: f64) -> Vec<Position> {
        let mut closed = Vec::new();

        for i in 0..self.positions.len() {
            if self.positions[i].status != PositionStatus::Open
                || self.positions[i].instrument != instrument
            {
                continue;
            }

            let hit_sl = match self.positions[i].direction {
                SignalDirection::Buy => current_price <= self.positions[i].stop_loss,
                SignalDirection::Sell => current_price >= self.positions[i].stop_loss,
                SignalDirection::Hold => false,
            };
            if hit_sl {
                // Stops fill at the stop price, targets at the target price.
                self.close_position(i, self.positions[i].stop_loss, PositionStatus::ClosedSl);
                closed.push(self.positions[i].clone());
                continue;
            }

            let hit_tp = match self.positions[i].direction {
                SignalDirection::Buy => current_price >= self.positions[i].take_profit,
                SignalDirection::Sell => current_price <= self.positions[i].take_profit,
                SignalDirection::Hold => false,
            };
            if hit_tp {
                self.close_position(i, self.positions[i].take_profit, PositionStatus::ClosedTp);
                closed.push(self.positions[i].clone());
            }
        }

        if !closed.is_empty() {
            self.save_state();
        }
        closed
    }

    fn has_open_position(&self, instrument: &str) -> bool {
        self.positions
            .iter()
            .any(|p| p.status == PositionStatus::Open && p.instrument == instrument)
    }

    fn open_count(&self) -> usize {
        self.positions
            .iter()
            .filter(|p| p.status == PositionStatus::Open)
            .count()
    }

    fn stats(&self) -> TradingStats {
        if self.trade_history.is_empty() {
            return TradingStats {
                total_trades: 0,
                balance: round2(self.balance),
                win_rate: 0.0,
                total_pnl: 0.0,
                avg_win: 0.0,
                avg_loss: 0.0,
                best_trade: 0.0,
                worst_trade: 0.0,
                open_positions: self.open_count(),
            };
        }

        let wins: Vec<&Position> = self.trade_history.iter().filter(|t| t.pnl > 0.0).collect();
        let losses: Vec<&Position> = self.trade_history.iter().filter(|t| t.pnl <= 0.0).collect();

        TradingStats {
            total_trades: self.trade_history.len(),
            balance: round2(self.balance),
            win_rate: round1(wins.len() as f64 / self.trade_history.len() as f64 * 100.0),
            total_pnl: round2(self.trade_history.iter().map(|t| t.pnl).sum()),
            avg_win: if wins.is_empty() {
                0.0
            } else {
                round2(wins.iter().map(|t| t.pnl).sum::<f64>() / wins.len() as f64)
            },
            avg_loss: if losses.is_empty() {
                0.0
            } else {
                round2(losses.iter().map(|t| t.pnl).sum::<f64>() / losses.len() as f64)
            },
            best_trade: round2(
                self.trade_history
                    .iter()
                    .map(|t| t.pnl)
                    .fold(f64::NEG_INFINITY, f64::max),
            ),
            worst_trade: round2(
                self.trade_history
                    .iter()
                    .map(|t| t.pnl)
                    .fold(f64::INFINITY, f64::min),
            ),
            open_positions: self.open_count(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TradingStats {
    pub total_trades: usize,
    pub balance: f64,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub open_positions: usize,
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
fn round8(x: f64) -> f64 {
    (x * 1e8).round() / 1e8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::default_test_config;
    use chrono::Utc;

    fn test_config() -> Config {
        let mut cfg = default_test_config();
        // Unique temp dir per process so state never leaks between tests
        cfg.log_dir = std::env::temp_dir()
            .join(format!("confluence_bot_test_{}", std::process::id()))
            .to_string_lossy()
            .to_string();
        cfg
    }

    fn make_signal(
        instrument: &str,
        direction: SignalDirection,
        entry: f64,
        tp: f64,
        sl: f64,
    ) -> AggregatedSignal {
        AggregatedSignal {
            instrument: instrument.to_string(),
            direction,
            confidence: 0.85,
            entry_price: Some(entry),
            take_profit: Some(tp),
            stop_loss: Some(sl),
            target_profit: 0.6,
            contributions: Vec::new(),
            note: None,
            created_at: Utc::now(),
        }
    }

    fn make_entry(instrument: &str, capital: f64, leverage: f64) -> AllocationEntry {
        AllocationEntry {
            instrument: instrument.to_string(),
            capital,
            confidence_weight: 0.85,
            leverage,
        }
    }

    fn fresh_executor(cfg: &Config) -> PaperExecutor {
        let mut exec = PaperExecutor::new(cfg);
        exec.trades_file = String::new();
        exec.balance = cfg.total_capital;
        exec.positions.clear();
        exec.trade_history.clear();
        exec.trade_counter = 0;
        exec
    }

    #[test]
    fn open_position_sizes_from_allocation() {
        let cfg = test_config();
        let mut exec = fresh_executor(&cfg);
        let signal = make_signal("BTC-USD", SignalDirection::Buy, 100.0, 101.2, 99.75);
        let entry = make_entry("BTC-USD", 5.0, 10.0);

        let pos = exec.open_position(&signal, &entry).unwrap();
        assert_eq!(pos.instrument, "BTC-USD");
        assert_eq!(pos.status, PositionStatus::Open);
        assert!((pos.size_usd - 50.0).abs() < 1e-9);
        assert!((pos.units - 0.5).abs() < 1e-6);
        // Fill slips against the buyer.
        assert!(pos.entry_price > 100.0);
    }

    #[test]
    fn priceless_signal_is_refused() {
        let cfg = test_config();
        let mut exec = fresh_executor(&cfg);
        let mut signal = make_signal("BTC-USD", SignalDirection::Buy, 100.0, 101.2, 99.75);
        signal.entry_price = None;
        assert!(exec
            .open_position(&signal, &make_entry("BTC-USD", 5.0, 10.0))
            .is_none());
    }

    #[test]
    fn one_open_position_per_instrument() {
        let cfg = test_config();
        let mut exec = fresh_executor(&cfg);
        let signal = make_signal("BTC-USD", SignalDirection::Buy, 100.0, 101.2, 99.75);
        let entry = make_entry("BTC-USD", 5.0, 10.0);
        assert!(exec.open_position(&signal, &entry).is_some());
        assert!(exec.open_position(&signal, &entry).is_none());
        assert_eq!(exec.open_count(), 1);
    }

    #[test]
    fn stop_fills_at_stop_price_long() {
        let cfg = test_config();
        let mut exec = fresh_executor(&cfg);
        let signal = make_signal("BTC-USD", SignalDirection::Buy, 100.0, 101.2, 99.75);
        exec.open_position(&signal, &make_entry("BTC-USD", 5.0, 10.0));

        let closed = exec.check_positions("BTC-USD", 99.5);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].status, PositionStatus::ClosedSl);
        assert_eq!(closed[0].exit_price, Some(99.75));
        assert!(closed[0].pnl < 0.0);
    }

    #[test]
    fn target_fills_at_target_price_long() {
        let cfg = test_config();
        let mut exec = fresh_executor(&cfg);
        let signal = make_signal("BTC-USD", SignalDirection::Buy, 100.0, 101.2, 99.75);
        exec.open_position(&signal, &make_entry("BTC-USD", 5.0, 10.0));

        let closed = exec.check_positions("BTC-USD", 101.5);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].status, PositionStatus::ClosedTp);
        assert_eq!(closed[0].exit_price, Some(101.2));
        assert!(closed[0].pnl > 0.0);
    }

    #[test]
    fn short_stop_triggers_above_entry() {
        let cfg = test_config();
        let mut exec = fresh_executor(&cfg);
        let signal = make_signal("ETH-USD", SignalDirection::Sell, 100.0, 98.8, 100.25);
        exec.open_position(&signal, &make_entry("ETH-USD", 5.0, 10.0));

        let closed = exec.check_positions("ETH-USD", 100.5);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].status, PositionStatus::ClosedSl);
    }

    #[test]
    fn instruments_are_marked_independently() {
        let cfg = test_config();
        let mut exec = fresh_executor(&cfg);
        let btc = make_signal("BTC-USD", SignalDirection::Buy, 100.0, 101.2, 99.75);
        let eth = make_signal("ETH-USD", SignalDirection::Buy, 50.0, 50.6, 49.875);
        exec.open_position(&btc, &make_entry("BTC-USD", 5.0, 10.0));
        exec.open_position(&eth, &make_entry("ETH-USD", 4.0, 8.0));

        // A BTC price move must not touch the ETH position.
        let closed = exec.check_positions("BTC-USD", 102.0);
        assert_eq!(closed.len(), 1);
        assert_eq!(exec.open_count(), 1);
        assert!(exec.has_open_position("ETH-USD"));
    }

    #[test]
    fn balance_updates_on_close() {
        let cfg = test_config();
        let mut exec = fresh_executor(&cfg);
        let signal = make_signal("BTC-USD", SignalDirection::Buy, 100.0, 101.2, 99.75);
        exec.open_position(&signal, &make_entry("BTC-USD", 5.0, 10.0));
        let balance_after_fees = exec.balance;

        let closed = exec.check_positions("BTC-USD", 101.5);
        assert!(!closed.is_empty());
        assert!(exec.balance > balance_after_fees);

        let stats = exec.stats();
        assert_eq!(stats.total_trades, 1);
        assert!((stats.win_rate - 100.0).abs() < 1e-9);
        assert_eq!(stats.open_positions, 0);
    }
}
