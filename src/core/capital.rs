use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::config::Config;
use crate::core::precision::round_dp;

/// Hard failures of an allocation cycle. These reject the whole cycle and
/// leave the previous capital state in place.
#[derive(Debug, Clone, Error)]
pub enum AllocationError {
    #[error(
        "capital invariant violated: allocated {allocated} + unallocated {unallocated} \
         + buffer {buffer} != total {total}"
    )]
    CapitalInvariantViolated {
        allocated: f64,
        unallocated: f64,
        buffer: f64,
        total: f64,
    },
    #[error("allocation over-commits active capital: {allocated} > {active}")]
    OverCommitted { allocated: f64, active: f64 },
}

/// One finalized per-instrument allocation decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub instrument: String,
    pub capital: f64,
    pub confidence_weight: f64,
    pub leverage: f64,
}

impl AllocationEntry {
    pub fn notional(&self) -> f64 {
        self.capital * self.leverage
    }
}

/// Read-only snapshot for monitoring collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalStatus {
    pub total_capital: f64,
    pub active_capital: f64,
    pub safety_buffer: f64,
    pub total_allocated: f64,
    pub allocation_count: usize,
    pub allocation_efficiency: f64,
    pub risk_utilization: f64,
    pub average_confidence: f64,
    pub last_rebalance: Option<DateTime<Utc>>,
    pub cycles_completed: u64,
    pub cycles_rejected: u64,
}

/// The one owned capital value. Constants are fixed at startup from
/// validated config; the allocation map is mutated only through the
/// allocator's commit path.
#[derive(Debug, Clone)]
pub struct CapitalState {
    total_capital: f64,
    active_capital: f64,
    safety_buffer: f64,
    max_leverage: f64,
    allocations: HashMap<String, AllocationEntry>,
    last_rebalance: Option<DateTime<Utc>>,
    cycles_completed: u64,
    cycles_rejected: u64,
}

impl CapitalState {
    pub fn new(cfg: &Config) -> Self {
        Self {
            total_capital: cfg.total_capital,
            active_capital: cfg.active_capital,
            safety_buffer: cfg.safety_buffer,
            max_leverage: cfg.leverage.max,
            allocations: HashMap::new(),
            last_rebalance: None,
            cycles_completed: 0,
            cycles_rejected: 0,
        }
    }

    pub fn total_capital(&self) -> f64 {
        self.total_capital
    }

    pub fn active_capital(&self) -> f64 {
        self.active_capital
    }

    pub fn safety_buffer(&self) -> f64 {
        self.safety_buffer
    }

    pub fn allocations(&self) -> &HashMap<String, AllocationEntry> {
        &self.allocations
    }

    pub fn last_rebalance(&self) -> Option<DateTime<Utc>> {
        self.last_rebalance
    }

    pub fn total_allocated(&self) -> f64 {
        self.allocations.values().map(|e| e.capital).sum()
    }

    /// Fraction of active capital currently deployed.
    pub fn allocation_efficiency(&self) -> f64 {
        if self.active_capital <= 0.0 {
            return 0.0;
        }
        self.total_allocated() / self.active_capital
    }

    /// Deployed notional relative to the worst case the config allows.
    pub fn risk_utilization(&self) -> f64 {
        let ceiling = self.active_capital * self.max_leverage;
        if ceiling <= 0.0 {
            return 0.0;
        }
        self.allocations.values().map(|e| e.notional()).sum::<f64>() / ceiling
    }

    pub fn average_confidence(&self) -> f64 {
        if self.allocations.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .allocations
            .values()
            .map(|e| e.confidence_weight)
            .sum();
        sum / self.allocations.len() as f64
    }

    pub fn status(&self) -> CapitalStatus {
        CapitalStatus {
            total_capital: self.total_capital,
            active_capital: self.active_capital,
            safety_buffer: self.safety_buffer,
            total_allocated: self.total_allocated(),
            allocation_count: self.allocations.len(),
            allocation_efficiency: round_dp(self.allocation_efficiency(), 4),
            risk_utilization: round_dp(self.risk_utilization(), 4),
            average_confidence: round_dp(self.average_confidence(), 4),
            last_rebalance: self.last_rebalance,
            cycles_completed: self.cycles_completed,
            cycles_rejected: self.cycles_rejected,
        }
    }

    /// Replace the allocation map wholesale. Only the allocator calls this,
    /// after its invariant check has passed.
    pub(crate) fn commit(&mut self, entries: Vec<AllocationEntry>, now: DateTime<Utc>) {
        self.allocations = entries
            .into_iter()
            .map(|e| (e.instrument.clone(), e))
            .collect();
        self.last_rebalance = Some(now);
        self.cycles_completed += 1;
    }

    pub(crate) fn record_rejection(&mut self) {
        self.cycles_rejected += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::default_test_config;

    fn entry(instrument: &str, capital: f64, confidence: f64, leverage: f64) -> AllocationEntry {
        AllocationEntry {
            instrument: instrument.to_string(),
            capital,
            confidence_weight: confidence,
            leverage,
        }
    }

    #[test]
    fn fresh_state_has_no_allocations() {
        let state = CapitalState::new(&default_test_config());
        assert_eq!(state.allocations().len(), 0);
        assert!(state.last_rebalance().is_none());
        assert!(state.total_allocated().abs() < 1e-12);
        assert!(state.allocation_efficiency().abs() < 1e-12);
        assert!(state.average_confidence().abs() < 1e-12);
    }

    #[test]
    fn metrics_follow_committed_entries() {
        let mut state = CapitalState::new(&default_test_config());
        state.commit(
            vec![
                entry("BTC-USD", 6.0, 0.9, 10.0),
                entry("ETH-USD", 4.0, 0.8, 5.0),
            ],
            Utc::now(),
        );

        assert_eq!(state.allocations().len(), 2);
        assert!((state.total_allocated() - 10.0).abs() < 1e-9);
        assert!((state.allocation_efficiency() - 1.0).abs() < 1e-9);
        assert!((state.average_confidence() - 0.85).abs() < 1e-9);
        // notional 60 + 20 = 80, ceiling = 10 * 20
        assert!((state.risk_utilization() - 0.4).abs() < 1e-9);
        assert_eq!(state.status().cycles_completed, 1);
    }

    #[test]
    fn commit_replaces_previous_allocations() {
        let mut state = CapitalState::new(&default_test_config());
        state.commit(vec![entry("BTC-USD", 6.0, 0.9, 10.0)], Utc::now());
        state.commit(vec![entry("ETH-USD", 3.0, 0.8, 8.0)], Utc::now());

        assert_eq!(state.allocations().len(), 1);
        assert!(state.allocations().contains_key("ETH-USD"));
        assert_eq!(state.status().cycles_completed, 2);
    }
}
