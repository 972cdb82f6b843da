use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info, warn};

use crate::config::{Config, LeverageRange};
use crate::core::capital::{AllocationEntry, AllocationError, CapitalState};
use crate::core::precision::{round_capital, within_epsilon, CAPITAL_EPSILON};
use crate::models::CandidateAsset;

/// Result of one successful allocation cycle. Empty when no candidate
/// qualified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationOutcome {
    pub entries: Vec<AllocationEntry>,
    pub total_allocated: f64,
    /// Active capital left undeployed this cycle (clamp losses and dropped
    /// sub-minimum entries, never redistributed).
    pub unallocated: f64,
    pub average_confidence: f64,
    pub selected: Vec<String>,
}

impl AllocationOutcome {
    fn empty(active_capital: f64) -> Self {
        Self {
            entries: Vec::new(),
            total_allocated: 0.0,
            unallocated: active_capital,
            average_confidence: 0.0,
            selected: Vec::new(),
        }
    }
}

/// Splits the active capital pool across qualifying candidates,
/// proportional to confidence, under the exact-capital invariant.
pub struct CapitalAllocator {
    confidence_threshold: f64,
    min_positions: usize,
    max_positions: usize,
    min_fraction: f64,
    max_fraction: f64,
    diversification_threshold: f64,
    leverage: LeverageRange,
    reference_volatility: f64,
    minimum_trade_size: f64,
    rebalance_interval: Duration,
    efficiency_floor: f64,
}

impl CapitalAllocator {
    pub fn new(cfg: &Config) -> Self {
        Self {
            confidence_threshold: cfg.confidence_threshold,
            min_positions: cfg.min_positions,
            max_positions: cfg.max_positions,
            min_fraction: cfg.min_fraction_per_asset,
            max_fraction: cfg.max_fraction_per_asset,
            diversification_threshold: cfg.diversification_threshold,
            leverage: cfg.leverage.clone(),
            reference_volatility: cfg.reference_volatility,
            minimum_trade_size: cfg.minimum_trade_size,
            rebalance_interval: Duration::seconds(cfg.rebalance_interval as i64),
            efficiency_floor: cfg.efficiency_floor,
        }
    }

    /// Run one allocation cycle against `state`. On success the new
    /// allocation map is committed atomically; a hard invariant failure
    /// rejects the whole cycle and leaves `state` unchanged.
    pub fn allocate(
        &self,
        candidates: &[CandidateAsset],
        state: &mut CapitalState,
    ) -> Result<AllocationOutcome, AllocationError> {
        let active = state.active_capital();
        let selected = self.select(candidates);

        if selected.is_empty() {
            debug!("no candidate cleared the confidence threshold");
            state.commit(Vec::new(), Utc::now());
            return Ok(AllocationOutcome::empty(active));
        }

        // Confidence-proportional weights over the selected set, clamped to
        // the per-asset fraction bounds.
        let confidence_sum: f64 = selected.iter().map(|c| c.confidence).sum();
        let floor = active * self.min_fraction;
        let ceiling = active * self.max_fraction;

        let mut entries: Vec<AllocationEntry> = selected
            .iter()
            .map(|c| {
                let raw = active * c.confidence / confidence_sum;
                AllocationEntry {
                    instrument: c.instrument.clone(),
                    capital: raw.clamp(floor, ceiling),
                    confidence_weight: c.confidence,
                    leverage: self.leverage_for(c),
                }
            })
            .collect();

        // Capital must never be over-committed: scale everything down by
        // the same factor before any entry is finalized.
        let committed: f64 = entries.iter().map(|e| e.capital).sum();
        if committed > active {
            let factor = active / committed;
            debug!(
                factor = format!("{:.6}", factor),
                "scaling allocations down to fit active capital"
            );
            for e in &mut entries {
                e.capital *= factor;
            }
        }

        // Sub-minimum entries are dropped outright; their share stays
        // unallocated for this cycle.
        entries.retain(|e| {
            if e.capital < self.minimum_trade_size {
                info!(
                    instrument = %e.instrument,
                    capital = format!("{:.6}", e.capital),
                    minimum = self.minimum_trade_size,
                    "dropping allocation below minimum trade size"
                );
                false
            } else {
                true
            }
        });

        self.round_entries(&mut entries);

        let total_allocated: f64 = entries.iter().map(|e| e.capital).sum();
        if total_allocated > active + CAPITAL_EPSILON {
            warn!(
                allocated = format!("{:.6}", total_allocated),
                active, "allocation cycle rejected: over-committed"
            );
            state.record_rejection();
            return Err(AllocationError::OverCommitted {
                allocated: total_allocated,
                active,
            });
        }

        let unallocated = (active - total_allocated).max(0.0);

        // Fail-closed exact-capital check: deployed + undeployed + buffer
        // must reproduce the total pool.
        let accounted = total_allocated + unallocated + state.safety_buffer();
        if !within_epsilon(accounted, state.total_capital()) {
            warn!(
                accounted = format!("{:.6}", accounted),
                total = state.total_capital(),
                "allocation cycle rejected: exact-capital invariant violated"
            );
            state.record_rejection();
            return Err(AllocationError::CapitalInvariantViolated {
                allocated: total_allocated,
                unallocated,
                buffer: state.safety_buffer(),
                total: state.total_capital(),
            });
        }

        let average_confidence = if entries.is_empty() {
            0.0
        } else {
            entries.iter().map(|e| e.confidence_weight).sum::<f64>() / entries.len() as f64
        };

        let outcome = AllocationOutcome {
            selected: entries.iter().map(|e| e.instrument.clone()).collect(),
            total_allocated,
            unallocated,
            average_confidence,
            entries: entries.clone(),
        };

        state.commit(entries, Utc::now());

        info!(
            allocated = format!("{:.6}", outcome.total_allocated),
            positions = outcome.entries.len(),
            avg_confidence = format!("{:.4}", outcome.average_confidence),
            "allocation cycle committed"
        );

        Ok(outcome)
    }

    /// Rebalance when the configured interval elapsed or deployment
    /// efficiency fell below the floor.
    pub fn should_rebalance(&self, state: &CapitalState, now: DateTime<Utc>) -> bool {
        match state.last_rebalance() {
            None => true,
            Some(last) => {
                now - last > self.rebalance_interval
                    || state.allocation_efficiency() < self.efficiency_floor
            }
        }
    }

    /// Filter by confidence, then pick up to `max_positions` by confidence
    /// descending. Beyond the minimum count a candidate is only added when
    /// its volatility is distinct from every already-selected one.
    fn select<'a>(&self, candidates: &'a [CandidateAsset]) -> Vec<&'a CandidateAsset> {
        let mut qualified: Vec<&CandidateAsset> = candidates
            .iter()
            .filter(|c| c.confidence >= self.confidence_threshold)
            .collect();
        qualified.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });

        let mut selected: Vec<&CandidateAsset> = Vec::new();
        for candidate in qualified {
            if selected.len() >= self.max_positions {
                break;
            }
            if selected.len() >= self.min_positions {
                let diversified = selected.iter().all(|s| {
                    (s.estimated_volatility - candidate.estimated_volatility).abs()
                        >= self.diversification_threshold
                });
                if !diversified {
                    debug!(
                        instrument = %candidate.instrument,
                        "skipping candidate: volatility profile too close to selection"
                    );
                    continue;
                }
            }
            selected.push(candidate);
        }
        selected
    }

    /// Round every entry to the fixed capital precision. Nearest-rounding
    /// can drift the sum by a few micro-units, so the residual against the
    /// pre-rounding sum goes to the largest entry.
    fn round_entries(&self, entries: &mut [AllocationEntry]) {
        let target: f64 = entries.iter().map(|e| e.capital).sum();
        for e in entries.iter_mut() {
            e.capital = round_capital(e.capital);
        }
        let rounded: f64 = entries.iter().map(|e| e.capital).sum();
        let residual = round_capital(target - rounded);
        if residual == 0.0 {
            return;
        }
        if let Some(largest) = entries.iter_mut().max_by(|a, b| {
            a.capital
                .partial_cmp(&b.capital)
                .unwrap_or(Ordering::Equal)
        }) {
            let adjusted = round_capital(largest.capital + residual);
            if adjusted >= self.minimum_trade_size {
                largest.capital = adjusted;
            }
        }
    }

    fn leverage_for(&self, candidate: &CandidateAsset) -> f64 {
        let vol = candidate.estimated_volatility;
        if !(vol.is_finite() && vol > 0.0) {
            debug!(
                instrument = %candidate.instrument,
                "unusable volatility estimate, using minimum leverage"
            );
            return self.leverage.min;
        }
        let raw = self.leverage.default * (self.reference_volatility / vol) * candidate.confidence;
        raw.clamp(self.leverage.min, self.leverage.max)
    }
}
