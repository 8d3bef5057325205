use crate::cache::{ApiCache, CacheStats};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{BankrollError, CacheError};
use crate::exchange::ExchangeClient;
use crate::models::decision::{Admission, RejectReason};
use crate::models::market::MarketSnapshot;
use crate::models::opportunity::Opportunity;
use crate::models::position::{BetResult, Position};
use crate::models::{to_f64, to_money};
use crate::risk::bankroll::{BankrollState, BankrollTracker, DrawdownSeverity};
use crate::risk::correlation::CorrelationTracker;
use crate::risk::dedup::{DedupGuard, EfficiencyMetrics};
use crate::risk::position_manager::PositionManager;
use crate::risk::risk_manager::RiskManager;
use crate::risk::sizing::{EvCalculator, EvResult};
use crate::risk::spend_limiter::SpendLimiter;
use crate::risk::trading_lock::{TradingGuard, TradingLock};
use crate::scoring::{ScoredOpportunity, TierScorer, TieredOpportunity};
use crate::telemetry::alerts::AlertManager;
use crate::telemetry::latency::{LatencySummary, LatencyTracker, ADMISSION, LOCK_WAIT, MARKET_FETCH};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheReport {
    pub markets: CacheStats,
    pub snapshots: CacheStats,
}

/// Admission gate between opportunity scanners and order placement.
///
/// Built once per process and shared by reference (`Arc<TradeGate>`) with
/// every scan loop. Every table it owns is mutated either through the
/// analysis-phase methods or through an [`AdmissionSession`], which holds the
/// trading lock.
pub struct TradeGate {
    config: Config,
    lock: TradingLock,
    dedup: DedupGuard,
    correlation: CorrelationTracker,
    positions: Arc<PositionManager>,
    risk: RiskManager,
    spend: SpendLimiter,
    ev: EvCalculator,
    tiers: TierScorer,
    bankroll: BankrollTracker,
    market_lists: ApiCache<Vec<MarketSnapshot>>,
    snapshots: ApiCache<MarketSnapshot>,
    latency: LatencyTracker,
    alerts: AlertManager,
}

impl TradeGate {
    pub fn new(config: Config, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let positions = Arc::new(PositionManager::new(config.ledger.clone(), clock.clone()));
        Self::from_parts(config, clock, positions, None)
    }

    /// Build around an existing ledger and, optionally, a checkpointed
    /// bankroll.
    pub fn from_parts(
        config: Config,
        clock: Arc<dyn Clock>,
        positions: Arc<PositionManager>,
        bankroll: Option<BankrollState>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let tracker = BankrollTracker::new(config.bankroll.clone(), clock.clone());
        if let Some(state) = bankroll {
            tracker.restore(state);
        }

        let max_stale = config.cache.max_stale_serves;
        Ok(Self {
            lock: TradingLock::new(),
            dedup: DedupGuard::new(config.dedup.clone(), clock.clone()),
            correlation: CorrelationTracker::new(),
            risk: RiskManager::new(config.concentration.clone(), positions.clone()),
            spend: SpendLimiter::new(config.spend.clone(), clock.clone()),
            ev: EvCalculator::new(config.sizing.clone()),
            tiers: TierScorer::new(config.tiers.clone(), clock.clone()),
            bankroll: tracker,
            market_lists: ApiCache::new(clock.clone(), max_stale),
            snapshots: ApiCache::new(clock.clone(), max_stale),
            latency: LatencyTracker::new(config.telemetry.latency_samples),
            alerts: AlertManager::new(config.telemetry.clone()),
            positions,
            config,
        })
    }

    // === Analysis phase ===

    /// Start of a scan. Clears the per-cycle analysis set.
    pub fn reset_cycle_tracking(&self) {
        self.dedup.reset_cycle_tracking();
    }

    pub fn should_analyze(&self, id: &str) -> Admission {
        let result = self.dedup.should_analyze(id);
        if let Err(reason) = &result {
            debug!("Skip analysis of {id}: {reason}");
        }
        result.into()
    }

    pub fn mark_analyzed(&self, id: &str, success: bool) {
        self.dedup.mark_analyzed(id, success);
    }

    pub fn size_stake(&self, opp: &Opportunity, bankroll: Decimal) -> EvResult {
        self.ev
            .evaluate(opp.model_probability, opp.odds, to_f64(bankroll))
    }

    /// Size every opportunity against the current bankroll and drop the ones
    /// that fail the edge filter or size to nothing.
    pub fn score(&self, opportunities: Vec<Opportunity>) -> Vec<ScoredOpportunity> {
        let bankroll = self.bankroll.current();
        opportunities
            .into_iter()
            .filter_map(|opp| {
                let ev = self.size_stake(&opp, bankroll);
                if !ev.pass_filter {
                    let reason = RejectReason::EdgeBelowMinimum {
                        edge: ev.edge,
                        min_edge: self.ev.min_edge_pct(),
                    };
                    debug!("Drop {}: {reason}", opp.id);
                    return None;
                }
                if to_money(ev.recommended_stake) <= Decimal::ZERO {
                    debug!("Drop {}: stake rounds to zero", opp.id);
                    return None;
                }
                Some(ScoredOpportunity::new(opp, ev))
            })
            .collect()
    }

    pub fn assign_tiers(&self, scored: Vec<ScoredOpportunity>) -> Vec<TieredOpportunity> {
        self.tiers.assign(scored)
    }

    // === Admission phase ===

    /// Wait for the trading lock. Everything that mutates the ledger, spend
    /// window or correlation table goes through the returned session.
    pub async fn begin_admission(&self) -> AdmissionSession<'_> {
        let started = Instant::now();
        let guard = self.lock.acquire().await;
        self.latency.record(LOCK_WAIT, started.elapsed());
        AdmissionSession { gate: self, _guard: guard }
    }

    /// Grade a settled bet, close its position and free its event.
    pub async fn record_outcome(
        &self,
        id: &str,
        result: BetResult,
        profit: Decimal,
    ) -> Result<Decimal, BankrollError> {
        let pnl = {
            let session = self.begin_admission().await;
            let pnl = self.bankroll.grade_bet(id, result, profit)?;
            session.close_position(id);
            pnl
        };

        let severity = self.bankroll.drawdown_alert();
        let pct = self.bankroll.snapshot().drawdown_pct;
        self.alerts.on_drawdown(severity, pct).await;
        Ok(pnl)
    }

    // === Cached market reads ===

    /// Live quote for one market, bounded by the live fetch timeout.
    pub async fn market_snapshot(
        &self,
        exchange: &dyn ExchangeClient,
        id: &str,
    ) -> Result<MarketSnapshot, CacheError> {
        let _timer = self.latency.start_timer(MARKET_FETCH);
        let key = format!("{}:market:{id}", exchange.platform());
        self.snapshots
            .get_with_timeout(
                &key,
                self.config.cache.default_ttl(),
                self.config.cache.live_timeout(),
                || async move { exchange.get_market(id).await.map_err(anyhow::Error::from) },
            )
            .await
    }

    pub async fn markets(&self, exchange: &dyn ExchangeClient) -> Result<Vec<MarketSnapshot>, CacheError> {
        let _timer = self.latency.start_timer(MARKET_FETCH);
        let key = format!("{}:markets", exchange.platform());
        self.market_lists
            .get(&key, self.config.cache.default_ttl(), || async move {
                exchange.get_markets().await.map_err(anyhow::Error::from)
            })
            .await
    }

    // === Observability (snapshots, lock not required) ===

    pub fn efficiency_metrics(&self) -> EfficiencyMetrics {
        self.dedup.efficiency_metrics()
    }

    pub fn bankroll_state(&self) -> BankrollState {
        self.bankroll.snapshot()
    }

    pub fn bankroll(&self) -> Decimal {
        self.bankroll.current()
    }

    pub fn cache_stats(&self) -> CacheReport {
        CacheReport {
            markets: self.market_lists.stats(),
            snapshots: self.snapshots.stats(),
        }
    }

    pub fn drawdown_alert(&self) -> Option<DrawdownSeverity> {
        self.bankroll.drawdown_alert()
    }

    pub fn latency_summary(&self) -> BTreeMap<String, LatencySummary> {
        self.latency.summary()
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.positions.all_positions()
    }

    pub fn correlated_markets(&self) -> BTreeMap<String, Vec<String>> {
        self.correlation.correlated_markets()
    }

    pub fn spend_window_total(&self) -> Decimal {
        self.spend.window_total()
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_held()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn log_summary(&self) {
        let m = self.efficiency_metrics();
        let b = self.bankroll_state();
        info!(
            "Gate: analyses={} bets={} efficiency={:.1}% open={} events={} spend_window=${}",
            m.total_analyses,
            m.total_bets,
            m.efficiency_pct,
            self.positions.open_count(),
            self.correlation.event_count(),
            self.spend.window_total()
        );
        info!(
            "Bankroll: ${} peak=${} drawdown={:.1}% roi={:.1}% W/L/P={}/{}/{}",
            b.current, b.peak, b.drawdown_pct, b.roi, b.win_count, b.loss_count, b.push_count
        );
        self.latency.log_summary();
    }
}

/// Holder of the trading lock for one admit-and-record sequence.
///
/// Dropping the session releases the lock.
pub struct AdmissionSession<'a> {
    gate: &'a TradeGate,
    _guard: TradingGuard,
}

impl AdmissionSession<'_> {
    /// Composite admission check. First failure wins, in this order:
    /// non-positive amount, bet today, open position, recent position, symbol cooldown,
    /// correlated event, concentration, spend rate.
    ///
    /// An approval records `amount` in the spend window; follow it with
    /// [`record_admission`](Self::record_admission) once the order is placed,
    /// or [`abort_admission`](Self::abort_admission) if placement fails.
    pub fn should_admit(&self, opp: &Opportunity, amount: Decimal, bankroll: Decimal) -> Admission {
        let _timer = self.gate.latency.start_timer(ADMISSION);
        let result = self.evaluate(opp, amount, bankroll);
        match &result {
            Ok(()) => debug!("Admitted {} ({}) ${amount}", opp.id, opp.platform),
            Err(reason) => info!("Rejected {} ({}): {reason}", opp.id, opp.platform),
        }
        result.into()
    }

    fn evaluate(&self, opp: &Opportunity, amount: Decimal, bankroll: Decimal) -> Result<(), RejectReason> {
        let gate = self.gate;
        let symbol = opp.symbol.as_str();

        if amount <= Decimal::ZERO {
            return Err(RejectReason::InvalidAmount { amount });
        }

        if gate.dedup.is_betted_today(&opp.id) {
            return Err(RejectReason::BettedToday);
        }

        if gate.positions.has_open_position(symbol, opp.platform) {
            return Err(RejectReason::DuplicatePosition {
                symbol: symbol.to_string(),
                platform: opp.platform,
            });
        }

        let recent = gate.positions.has_recent_position_default(symbol, opp.platform);
        if recent.recent {
            return Err(RejectReason::RecentPosition {
                symbol: symbol.to_string(),
                minutes_ago: recent.elapsed.map_or(0, |e| (e.as_secs() / 60) as i64),
            });
        }

        let cooldown = gate.positions.is_on_cooldown(symbol);
        if cooldown.on_cooldown {
            return Err(RejectReason::SymbolCooldown {
                symbol: symbol.to_string(),
                remaining_secs: cooldown.remaining.map_or(0, |r| r.as_secs() as i64),
            });
        }

        gate.correlation.check_correlation(&opp.id)?;
        gate.risk
            .check_concentration(symbol, amount, opp.platform, bankroll)?;
        // Records spend on success, so it must stay last
        gate.spend.check(amount)?;
        Ok(())
    }

    /// Record a confirmed placement: bankroll debit, then position,
    /// correlation and bet-today. Nothing is written if the bankroll refuses
    /// the stake.
    pub fn record_admission(&self, opp: &Opportunity, amount: Decimal) -> Result<(), BankrollError> {
        let gate = self.gate;
        gate.bankroll.record_bet(&opp.id, amount)?;
        gate.positions
            .add_position(&opp.id, &opp.symbol, opp.platform, amount);
        gate.correlation.register_bet(&opp.id);
        gate.dedup.mark_betted(&opp.id);
        Ok(())
    }

    /// Placement failed after approval: give the spend back.
    pub fn abort_admission(&self, opp: &Opportunity, amount: Decimal) {
        if !self.gate.spend.refund(amount) {
            warn!("Abort for {}: no spend of ${amount} to refund", opp.id);
        }
    }

    pub fn close_position(&self, id: &str) -> Option<Position> {
        let position = self.gate.positions.remove_position(id);
        self.gate.correlation.unregister_bet(id);
        position
    }
}
