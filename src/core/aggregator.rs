use chrono::Utc;
use tracing::debug;

use crate::config::{ComponentWeights, Config};
use crate::core::precision::{round_dp, CAPITAL_DECIMALS};
use crate::models::{
    AggregatedSignal, ComponentContribution, ComponentDirection, ComponentKind, ComponentSet,
    PriceView, SignalDirection,
};

/// Combines the weighted per-instrument component results into one decision.
/// Never fails: unreadable or missing inputs degrade the output to HOLD.
pub struct SignalAggregator {
    weights: ComponentWeights,
    threshold: f64,
    order_value: f64,
    leverage: f64,
    target_profit: f64,
    stop_fraction: f64,
}

impl SignalAggregator {
    pub fn new(cfg: &Config) -> Self {
        Self {
            weights: cfg.component_weights.clone(),
            threshold: cfg.confidence_threshold,
            order_value: cfg.order_value,
            leverage: cfg.leverage.default,
            target_profit: cfg.target_profit,
            stop_fraction: cfg.stop_fraction,
        }
    }

    pub fn aggregate(
        &self,
        instrument: &str,
        components: &ComponentSet,
        prices: &PriceView,
    ) -> AggregatedSignal {
        let mut buy_acc = 0.0;
        let mut sell_acc = 0.0;
        let mut total_active_weight = 0.0;
        let mut contributions = Vec::with_capacity(ComponentKind::ALL.len());

        for &kind in &ComponentKind::ALL {
            let weight = self.weights.get(kind);
            match components.get(kind) {
                Some(result) => {
                    let confidence = if result.confidence.is_finite() {
                        result.confidence.clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                    match result.direction {
                        ComponentDirection::Buy => buy_acc += confidence * weight,
                        ComponentDirection::Sell => sell_acc += confidence * weight,
                        ComponentDirection::Neutral => {}
                    }
                    // The weight counts whenever the slot is present, so
                    // absent slots cannot bias the normalized scores.
                    total_active_weight += weight;
                    contributions.push(ComponentContribution {
                        kind,
                        active: true,
                        weight,
                        direction: result.direction,
                        confidence,
                        quality: result.quality,
                    });
                }
                None => contributions.push(ComponentContribution::absent(kind, weight)),
            }
        }

        // Scores are compared against the threshold at the fixed 6-decimal
        // precision used everywhere else in the core.
        let (buy_score, sell_score) = if total_active_weight > 0.0 {
            (
                round_dp(buy_acc / total_active_weight, CAPITAL_DECIMALS),
                round_dp(sell_acc / total_active_weight, CAPITAL_DECIMALS),
            )
        } else {
            (0.0, 0.0)
        };

        let (direction, confidence) = if buy_score > sell_score && buy_score > self.threshold {
            (SignalDirection::Buy, buy_score)
        } else if sell_score > buy_score && sell_score > self.threshold {
            (SignalDirection::Sell, sell_score)
        } else {
            (SignalDirection::Hold, buy_score.max(sell_score))
        };

        debug!(
            instrument,
            buy = format!("{:.4}", buy_score),
            sell = format!("{:.4}", sell_score),
            active = components.present_count(),
            %direction,
            "aggregated component scores"
        );

        if direction == SignalDirection::Hold {
            let mut signal = AggregatedSignal::hold(instrument, self.target_profit, None);
            signal.confidence = confidence;
            signal.contributions = contributions;
            return signal;
        }

        let entry_price = match prices.most_granular() {
            Some(p) => p,
            None => {
                debug!(instrument, "entry price unavailable, downgrading to hold");
                let mut signal = AggregatedSignal::hold(
                    instrument,
                    self.target_profit,
                    Some("entry price unavailable".to_string()),
                );
                signal.contributions = contributions;
                return signal;
            }
        };

        let required_move = self.target_profit / (self.order_value * self.leverage);
        let (take_profit, stop_loss) = match direction {
            SignalDirection::Buy => (
                entry_price * (1.0 + required_move),
                entry_price * (1.0 - self.stop_fraction),
            ),
            SignalDirection::Sell => (
                entry_price * (1.0 - required_move),
                entry_price * (1.0 + self.stop_fraction),
            ),
            SignalDirection::Hold => unreachable!(),
        };

        AggregatedSignal {
            instrument: instrument.to_string(),
            direction,
            confidence,
            entry_price: Some(entry_price),
            take_profit: Some(take_profit),
            stop_loss: Some(stop_loss),
            target_profit: self.target_profit,
            contributions,
            note: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisComponentResult, DataQuality, Timeframe};
    use crate::test_helpers::{component, default_test_config};

    fn aggregator() -> SignalAggregator {
        SignalAggregator::new(&default_test_config())
    }

    fn m1_price(price: f64) -> PriceView {
        let mut view = PriceView::new();
        view.set(Timeframe::M1, price);
        view
    }

    fn uniform_set(direction: ComponentDirection, confidence: f64) -> ComponentSet {
        let mut set = ComponentSet::default();
        for &kind in &ComponentKind::ALL {
            set.insert(component(kind, direction, confidence));
        }
        set
    }

    #[test]
    fn empty_set_holds_with_zero_confidence() {
        let signal = aggregator().aggregate("BTC-USD", &ComponentSet::default(), &m1_price(100.0));
        assert_eq!(signal.direction, SignalDirection::Hold);
        assert!(signal.confidence.abs() < 1e-12);
        assert!(signal.contributions.iter().all(|c| !c.active));
    }

    #[test]
    fn unanimous_buy_above_threshold_signals_buy() {
        let set = uniform_set(ComponentDirection::Buy, 0.9);
        let signal = aggregator().aggregate("BTC-USD", &set, &m1_price(100.0));
        assert_eq!(signal.direction, SignalDirection::Buy);
        // All components at 0.9 normalize back to exactly 0.9.
        assert!((signal.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn threshold_is_strict() {
        // Exactly at the threshold must hold; just above must trade.
        let at = uniform_set(ComponentDirection::Buy, 0.75);
        let signal = aggregator().aggregate("BTC-USD", &at, &m1_price(100.0));
        assert_eq!(signal.direction, SignalDirection::Hold);

        let above = uniform_set(ComponentDirection::Buy, 0.751);
        let signal = aggregator().aggregate("BTC-USD", &above, &m1_price(100.0));
        assert_eq!(signal.direction, SignalDirection::Buy);
    }

    #[test]
    fn omission_neutrality() {
        // A single strong buy component scores the same regardless of which
        // other slots are absent.
        let mut only_indicator = ComponentSet::default();
        only_indicator.insert(component(
            ComponentKind::Indicator,
            ComponentDirection::Buy,
            0.9,
        ));
        let sparse = aggregator().aggregate("BTC-USD", &only_indicator, &m1_price(100.0));

        // Normalized by the indicator weight alone: 0.9 * w / w = 0.9.
        assert_eq!(sparse.direction, SignalDirection::Buy);
        assert!((sparse.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        for confidence in [0.0, 0.3, 0.75, 1.0] {
            let set = uniform_set(ComponentDirection::Buy, confidence);
            let signal = aggregator().aggregate("BTC-USD", &set, &m1_price(100.0));
            assert!(signal.confidence >= 0.0 && signal.confidence <= 1.0);
        }
    }

    #[test]
    fn neutral_components_add_weight_but_no_score() {
        // One buy at 0.9 plus one neutral: the neutral's weight dilutes the
        // buy score below the threshold.
        let mut set = ComponentSet::default();
        set.insert(component(
            ComponentKind::Indicator, // weight 0.20
            ComponentDirection::Buy,
            0.9,
        ));
        set.insert(component(
            ComponentKind::Trend, // weight 0.15
            ComponentDirection::Neutral,
            1.0,
        ));
        let signal = aggregator().aggregate("BTC-USD", &set, &m1_price(100.0));
        let expected = (0.9 * 0.20) / 0.35;
        assert!((signal.confidence - expected).abs() < 1e-6);
        assert_eq!(signal.direction, SignalDirection::Hold);
    }

    #[test]
    fn buy_price_arithmetic_reference_case() {
        // entry 100, order value 5, leverage 10, target 0.6:
        // move = 0.6 / 50 = 0.012 -> tp 101.2; stop fraction 0.0025 -> sl 99.75
        let set = uniform_set(ComponentDirection::Buy, 0.9);
        let signal = aggregator().aggregate("BTC-USD", &set, &m1_price(100.0));
        assert!((signal.entry_price.unwrap() - 100.0).abs() < 1e-9);
        assert!((signal.take_profit.unwrap() - 101.2).abs() < 1e-9);
        assert!((signal.stop_loss.unwrap() - 99.75).abs() < 1e-9);
    }

    #[test]
    fn sell_prices_invert() {
        let set = uniform_set(ComponentDirection::Sell, 0.9);
        let signal = aggregator().aggregate("BTC-USD", &set, &m1_price(100.0));
        assert_eq!(signal.direction, SignalDirection::Sell);
        assert!((signal.take_profit.unwrap() - 98.8).abs() < 1e-9);
        assert!((signal.stop_loss.unwrap() - 100.25).abs() < 1e-9);
    }

    #[test]
    fn entry_price_from_most_granular_timeframe() {
        let set = uniform_set(ComponentDirection::Buy, 0.9);
        let mut view = PriceView::new();
        view.set(Timeframe::H1, 105.0);
        view.set(Timeframe::M5, 101.0);
        let signal = aggregator().aggregate("BTC-USD", &set, &view);
        assert!((signal.entry_price.unwrap() - 101.0).abs() < 1e-9);
    }

    #[test]
    fn missing_price_downgrades_to_hold() {
        let set = uniform_set(ComponentDirection::Buy, 0.9);
        let signal = aggregator().aggregate("BTC-USD", &set, &PriceView::new());
        assert_eq!(signal.direction, SignalDirection::Hold);
        assert!(signal.confidence.abs() < 1e-12);
        assert!(signal.note.as_deref() == Some("entry price unavailable"));
    }

    #[test]
    fn non_finite_confidence_contributes_nothing() {
        let mut set = ComponentSet::default();
        let mut bad = AnalysisComponentResult::new(
            ComponentKind::Model,
            ComponentDirection::Buy,
            0.5,
            DataQuality::Real,
        );
        bad.confidence = f64::NAN;
        set.insert(bad);
        let signal = aggregator().aggregate("BTC-USD", &set, &m1_price(100.0));
        assert_eq!(signal.direction, SignalDirection::Hold);
        assert!(signal.confidence.abs() < 1e-12);
    }

    #[test]
    fn tie_between_buy_and_sell_holds() {
        let mut set = ComponentSet::default();
        set.insert(component(
            ComponentKind::Pattern, // 0.15
            ComponentDirection::Buy,
            0.9,
        ));
        set.insert(component(
            ComponentKind::Trend, // 0.15
            ComponentDirection::Sell,
            0.9,
        ));
        let signal = aggregator().aggregate("BTC-USD", &set, &m1_price(100.0));
        assert_eq!(signal.direction, SignalDirection::Hold);
    }
}
