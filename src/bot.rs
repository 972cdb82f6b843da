use anyhow::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use confluence_trading_bot::analysis::AnalysisSource;
use confluence_trading_bot::config::{Config, SharedConfig};
use confluence_trading_bot::core::{CapitalAllocator, CapitalState, SignalAggregator};
use confluence_trading_bot::exchange::Exchange;
use confluence_trading_bot::models::{
    AggregatedSignal, CandidateAsset, CandleSeries, DataQuality, PriceView, SignalDirection,
    Timeframe,
};
use confluence_trading_bot::trading::{ExecutionClient, PaperExecutor};

const DATA_LOOKBACK: usize = 175;
const DATA_TIMEFRAMES: [Timeframe; 4] = [
    Timeframe::M1,
    Timeframe::M5,
    Timeframe::M15,
    Timeframe::H1,
];

const TASK_ANALYSIS_REFRESH: &str = "analysis-refresh";
const TASK_TRADE_TICK: &str = "trade-tick";
const TASK_REBALANCE_CHECK: &str = "rebalance-check";
const TASK_STATUS_REPORT: &str = "status-report";

struct PeriodicTask {
    name: &'static str,
    interval: Duration,
    last_run: Instant,
}

/// Named periodic tasks driven from the single cooperative tick loop. Each
/// task runs to completion before the next is considered; shutdown cancels
/// the whole loop between tasks, never inside one.
struct Scheduler {
    tasks: Vec<PeriodicTask>,
}

impl Scheduler {
    fn new(cfg: &Config) -> Self {
        let now = Instant::now();
        let task = |name, secs| PeriodicTask {
            name,
            interval: Duration::from_secs(secs),
            last_run: now,
        };
        Self {
            tasks: vec![
                task(TASK_ANALYSIS_REFRESH, cfg.analysis_interval),
                task(TASK_TRADE_TICK, cfg.trade_interval),
                task(TASK_REBALANCE_CHECK, cfg.trade_interval),
                task(TASK_STATUS_REPORT, cfg.status_interval),
            ],
        }
    }

    /// True when the named task is due; marks it as run.
    fn due(&mut self, name: &str) -> bool {
        match self.tasks.iter_mut().find(|t| t.name == name) {
            Some(task) if task.last_run.elapsed() >= task.interval => {
                task.last_run = Instant::now();
                true
            }
            _ => false,
        }
    }
}

pub struct ConfluenceBot {
    config: SharedConfig,
    market: Box<dyn Exchange>,
    analysis: Box<dyn AnalysisSource>,
    executor: Box<dyn ExecutionClient>,
    capital: CapitalState,
    scheduler: Scheduler,

    latest_signals: HashMap<String, AggregatedSignal>,
    data_cache: HashMap<String, HashMap<Timeframe, CandleSeries>>,
}

impl ConfluenceBot {
    pub async fn new(
        config: SharedConfig,
        market: Box<dyn Exchange>,
        analysis: Box<dyn AnalysisSource>,
    ) -> Self {
        let cfg = config.read().await;

        info!("{}", "=".repeat(60));
        info!("Confluence Trading Bot starting up");
        info!(
            "Mode: {}",
            if cfg.paper_trade {
                "PAPER TRADING"
            } else {
                "LIVE TRADING"
            }
        );
        info!("Instruments: {}", cfg.instruments.join(", "));
        info!(
            "Capital: total {} = active {} + buffer {}",
            cfg.total_capital, cfg.active_capital, cfg.safety_buffer
        );
        info!(
            "Positions: {}..{} | confidence threshold {}",
            cfg.min_positions, cfg.max_positions, cfg.confidence_threshold
        );
        if cfg.allow_simulated_signals {
            warn!("Simulated signals are tradeable (ALLOW_SIMULATED_SIGNALS=true)");
        }
        info!("{}", "=".repeat(60));

        let capital = CapitalState::new(&cfg);
        let executor: Box<dyn ExecutionClient> = Box::new(PaperExecutor::new(&cfg));
        let scheduler = Scheduler::new(&cfg);
        drop(cfg);

        Self {
            config,
            market,
            analysis,
            executor,
            capital,
            scheduler,
            latest_signals: HashMap::new(),
            data_cache: HashMap::new(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        info!("Bot is now running. Press Ctrl+C to stop.");
        self.print_status().await;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    self.shutdown().await;
                    return Ok(());
                }
                _ = self.tick() => {}
            }
        }
    }

    async fn tick(&mut self) {
        let cfg = self.config.read().await.clone();

        if self.scheduler.due(TASK_ANALYSIS_REFRESH) {
            self.refresh_data(&cfg).await;
            self.build_signals(&cfg).await;
        }

        if self.scheduler.due(TASK_TRADE_TICK) {
            self.check_positions(&cfg).await;
        }

        if self.scheduler.due(TASK_REBALANCE_CHECK) {
            let allocator = CapitalAllocator::new(&cfg);
            if allocator.should_rebalance(&self.capital, Utc::now()) {
                self.run_allocation(&cfg, &allocator);
            }
        }

        if self.scheduler.due(TASK_STATUS_REPORT) {
            self.print_status().await;
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    /// Pull fresh candles for every instrument and timeframe. A read that
    /// errors or times out leaves that slot stale or missing; downstream
    /// stages treat missing data as a hold, never as a default value.
    async fn refresh_data(&mut self, cfg: &Config) {
        let deadline = Duration::from_secs(cfg.request_timeout_secs);

        for instrument in &cfg.instruments {
            let per_instrument = self.data_cache.entry(instrument.clone()).or_default();
            for tf in DATA_TIMEFRAMES {
                match tokio::time::timeout(
                    deadline,
                    self.market.fetch_ohlcv(instrument, tf, DATA_LOOKBACK),
                )
                .await
                {
                    Ok(Ok(series)) => {
                        per_instrument.insert(tf, series);
                    }
                    Ok(Err(e)) => {
                        debug!("Data refresh {} {}: {}", instrument, tf, e);
                    }
                    Err(_) => {
                        debug!("Data refresh {} {}: timed out", instrument, tf);
                    }
                }
            }
        }
    }

    async fn build_signals(&mut self, cfg: &Config) {
        let aggregator = SignalAggregator::new(cfg);
        let deadline = Duration::from_secs(cfg.request_timeout_secs);
        let empty: HashMap<Timeframe, CandleSeries> = HashMap::new();

        for instrument in &cfg.instruments {
            let data = self.data_cache.get(instrument).unwrap_or(&empty);

            let mut prices = PriceView::new();
            for (&tf, series) in data {
                if let Some(last) = series.last() {
                    prices.set(tf, last.close);
                }
            }
            // A live ticker read beats the cached close when it arrives in
            // time.
            match tokio::time::timeout(deadline, self.market.get_current_price(instrument)).await
            {
                Ok(Ok(price)) => prices.set(Timeframe::M1, price),
                Ok(Err(e)) => debug!("Ticker {}: {}", instrument, e),
                Err(_) => debug!("Ticker {}: timed out", instrument),
            }

            let signal = match tokio::time::timeout(
                deadline,
                self.analysis.components(instrument, data),
            )
            .await
            {
                Ok(Ok(components)) => aggregator.aggregate(instrument, &components, &prices),
                Ok(Err(e)) => {
                    warn!("Analysis failed for {}: {}", instrument, e);
                    AggregatedSignal::hold(
                        instrument,
                        cfg.target_profit,
                        Some(format!("analysis failed: {e}")),
                    )
                }
                Err(_) => {
                    warn!("Analysis timed out for {}", instrument);
                    AggregatedSignal::hold(
                        instrument,
                        cfg.target_profit,
                        Some("analysis timed out".to_string()),
                    )
                }
            };

            if signal.direction.is_actionable() {
                info!(
                    "SIGNAL {} {} conf={:.4} entry={:.4} tp={:.4} sl={:.4}",
                    signal.instrument,
                    signal.direction,
                    signal.confidence,
                    signal.entry_price.unwrap_or(0.0),
                    signal.take_profit.unwrap_or(0.0),
                    signal.stop_loss.unwrap_or(0.0),
                );
            } else if let Some(ref note) = signal.note {
                debug!("HOLD {} ({})", signal.instrument, note);
            }

            self.latest_signals.insert(instrument.clone(), signal);
        }
    }

    /// One allocation cycle over the current signal set. A rejected cycle
    /// keeps the previous allocation map and opens nothing.
    fn run_allocation(&mut self, cfg: &Config, allocator: &CapitalAllocator) {
        let mut candidates: Vec<CandidateAsset> = Vec::new();
        for signal in self.latest_signals.values() {
            if !signal.direction.is_actionable() {
                continue;
            }
            if signal.data_quality() == DataQuality::Simulated && !cfg.allow_simulated_signals {
                debug!(
                    "Skipping {} signal: built on simulated analysis",
                    signal.instrument
                );
                continue;
            }
            let vol = self.estimated_volatility(cfg, &signal.instrument);
            if let Some(candidate) = signal.to_candidate(vol) {
                candidates.push(candidate);
            }
        }

        let outcome = match allocator.allocate(&candidates, &mut self.capital) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Allocation cycle rejected: {}", e);
                return;
            }
        };

        for entry in &outcome.entries {
            let signal = match self.latest_signals.get(&entry.instrument) {
                Some(s) => s,
                None => continue,
            };
            if let Some(pos) = self.executor.open_position(signal, entry) {
                info!(
                    "Position #{} opened: {} {} ${:.2} x{} (capital {:.6})",
                    pos.id, pos.instrument, pos.direction, pos.size_usd, pos.leverage, pos.capital
                );
            }
        }
    }

    async fn check_positions(&mut self, cfg: &Config) {
        let open: Vec<String> = cfg
            .instruments
            .iter()
            .filter(|i| self.executor.has_open_position(i))
            .cloned()
            .collect();
        if open.is_empty() {
            return;
        }

        let deadline = Duration::from_secs(cfg.request_timeout_secs);
        for instrument in open {
            let price = match tokio::time::timeout(
                deadline,
                self.market.get_current_price(&instrument),
            )
            .await
            {
                Ok(Ok(p)) => p,
                Ok(Err(e)) => {
                    error!("Position check {}: {}", instrument, e);
                    continue;
                }
                Err(_) => {
                    error!("Position check {}: timed out", instrument);
                    continue;
                }
            };

            for pos in self.executor.check_positions(&instrument, price) {
                let result = if pos.pnl > 0.0 { "WIN" } else { "LOSS" };
                info!(
                    "Position #{} CLOSED ({}): {} PnL ${:+.2} | {:.4} -> {:.4}",
                    pos.id,
                    result,
                    pos.instrument,
                    pos.pnl,
                    pos.entry_price,
                    pos.exit_price.unwrap_or(0.0),
                );
            }
        }
    }

    fn estimated_volatility(&self, cfg: &Config, instrument: &str) -> f64 {
        self.data_cache
            .get(instrument)
            .and_then(|data| {
                DATA_TIMEFRAMES
                    .iter()
                    .filter_map(|tf| data.get(tf))
                    .find_map(|s| s.estimated_volatility())
            })
            .unwrap_or(cfg.reference_volatility)
    }

    async fn print_status(&mut self) {
        let status = self.capital.status();
        let stats = self.executor.stats();

        info!("--- Status ---");
        info!(
            "Capital: total {} | allocated {:.6} over {} position(s)",
            status.total_capital, status.total_allocated, status.allocation_count
        );
        info!(
            "Efficiency: {:.2}% | Risk utilization: {:.2}% | Avg confidence: {:.4}",
            status.allocation_efficiency * 100.0,
            status.risk_utilization * 100.0,
            status.average_confidence
        );
        info!(
            "Cycles: {} committed, {} rejected",
            status.cycles_completed, status.cycles_rejected
        );
        info!("Balance: ${:.2}", stats.balance);
        info!(
            "Trades: {} | Win Rate: {}% | PnL: ${:+.2} | Open: {}",
            stats.total_trades, stats.win_rate, stats.total_pnl, stats.open_positions
        );

        let actionable = self
            .latest_signals
            .values()
            .filter(|s| s.direction != SignalDirection::Hold)
            .count();
        info!(
            "Signals: {} tracked, {} actionable",
            self.latest_signals.len(),
            actionable
        );
    }

    async fn shutdown(&mut self) {
        info!("Shutting down...");
        self.print_status().await;
        info!("Bot stopped.");
    }
}
