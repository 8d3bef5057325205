use crate::clock::Clock;
use crate::config::DedupConfig;
use crate::models::decision::RejectReason;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EfficiencyMetrics {
    pub total_analyses: u64,
    pub total_bets: u64,
    /// Analyses per placed bet; 0 until the first bet.
    pub calls_per_bet: f64,
    /// Bets as a percentage of analyses.
    pub efficiency_pct: f64,
    pub analyzed_today: usize,
    pub analyzed_this_cycle: usize,
    pub betted_today: usize,
}

#[derive(Debug)]
struct DedupState {
    analyzed_this_cycle: HashSet<String>,
    analyzed_today: HashSet<String>,
    betted_today: HashSet<String>,
    last_analyzed: HashMap<String, DateTime<Utc>>,
    tracking_date: NaiveDate,
    total_analyses: u64,
    total_bets: u64,
}

/// Per-identifier analysis gate: once per cycle, once per day, never after a
/// bet the same day, and not again inside the analysis cooldown.
///
/// The daily sets roll over lazily on the first call after the clock's local
/// date changes.
pub struct DedupGuard {
    state: Mutex<DedupState>,
    clock: Arc<dyn Clock>,
    config: DedupConfig,
}

impl DedupGuard {
    pub fn new(config: DedupConfig, clock: Arc<dyn Clock>) -> Self {
        let tracking_date = clock.local_date();
        Self {
            state: Mutex::new(DedupState {
                analyzed_this_cycle: HashSet::new(),
                analyzed_today: HashSet::new(),
                betted_today: HashSet::new(),
                last_analyzed: HashMap::new(),
                tracking_date,
                total_analyses: 0,
                total_bets: 0,
            }),
            clock,
            config,
        }
    }

    pub fn should_analyze(&self, id: &str) -> Result<(), RejectReason> {
        let mut state = self.state.lock();
        self.roll_over(&mut state);

        if state.analyzed_this_cycle.contains(id) {
            return Err(RejectReason::AnalyzedThisCycle);
        }
        if state.analyzed_today.contains(id) {
            return Err(RejectReason::AnalyzedToday);
        }
        if state.betted_today.contains(id) {
            return Err(RejectReason::BettedToday);
        }

        let cooldown = self.config.analysis_cooldown();
        if let Some(&at) = state.last_analyzed.get(id) {
            let elapsed = self.clock.now() - at;
            if elapsed < cooldown {
                let remaining_secs = (cooldown - elapsed).num_seconds();
                return Err(RejectReason::AnalysisCooldown {
                    remaining_minutes: (remaining_secs + 59) / 60,
                });
            }
        }
        Ok(())
    }

    /// Record an analysis attempt. A failed analysis leaves the daily and
    /// cooldown state untouched so the id can be retried next cycle.
    pub fn mark_analyzed(&self, id: &str, success: bool) {
        let mut state = self.state.lock();
        self.roll_over(&mut state);
        state.total_analyses += 1;

        if success {
            state.analyzed_this_cycle.insert(id.to_string());
            state.analyzed_today.insert(id.to_string());
            let now = self.clock.now();
            state.last_analyzed.insert(id.to_string(), now);
        } else {
            state.analyzed_this_cycle.remove(id);
            debug!("Analysis failed for {id}, eligible again next cycle");
        }
    }

    pub fn mark_betted(&self, id: &str) {
        let mut state = self.state.lock();
        self.roll_over(&mut state);
        state.betted_today.insert(id.to_string());
        state.total_bets += 1;
    }

    pub fn is_betted_today(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        self.roll_over(&mut state);
        state.betted_today.contains(id)
    }

    /// Clear the per-cycle set. Call once at the start of every scan.
    pub fn reset_cycle_tracking(&self) {
        self.state.lock().analyzed_this_cycle.clear();
    }

    pub fn efficiency_metrics(&self) -> EfficiencyMetrics {
        let mut state = self.state.lock();
        self.roll_over(&mut state);

        let analyses = state.total_analyses;
        let bets = state.total_bets;
        EfficiencyMetrics {
            total_analyses: analyses,
            total_bets: bets,
            calls_per_bet: if bets > 0 { analyses as f64 / bets as f64 } else { 0.0 },
            efficiency_pct: if analyses > 0 {
                bets as f64 / analyses as f64 * 100.0
            } else {
                0.0
            },
            analyzed_today: state.analyzed_today.len(),
            analyzed_this_cycle: state.analyzed_this_cycle.len(),
            betted_today: state.betted_today.len(),
        }
    }

    fn roll_over(&self, state: &mut DedupState) {
        let today = self.clock.local_date();
        if today == state.tracking_date {
            return;
        }

        info!(
            "New day ({today}), resetting daily tracking: analyzed={} betted={} analyses={} bets={}",
            state.analyzed_today.len(),
            state.betted_today.len(),
            state.total_analyses,
            state.total_bets
        );
        state.analyzed_today.clear();
        state.betted_today.clear();
        state.total_analyses = 0;
        state.total_bets = 0;
        state.tracking_date = today;

        let now = self.clock.now();
        let cooldown = self.config.analysis_cooldown();
        state.last_analyzed.retain(|_, at| now - *at < cooldown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn setup(hour: u32, min: u32) -> (Arc<ManualClock>, DedupGuard) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 1, hour, min, 0).unwrap(),
        ));
        let guard = DedupGuard::new(DedupConfig::default(), clock.clone());
        (clock, guard)
    }

    #[test]
    fn test_gate_order() {
        let (clock, guard) = setup(10, 0);
        let id = "KXBTCD-26JAN01-T98000";
        assert!(guard.should_analyze(id).is_ok());

        guard.mark_analyzed(id, true);
        assert_eq!(guard.should_analyze(id), Err(RejectReason::AnalyzedThisCycle));

        guard.reset_cycle_tracking();
        assert_eq!(guard.should_analyze(id), Err(RejectReason::AnalyzedToday));

        guard.mark_betted(id);
        assert_eq!(guard.should_analyze(id), Err(RejectReason::AnalyzedToday));

        // Next day the daily sets are gone and the cooldown has long expired
        clock.set(Utc.with_ymd_and_hms(2026, 1, 2, 0, 10, 0).unwrap());
        assert!(guard.should_analyze(id).is_ok());
    }

    #[test]
    fn test_betted_blocks_until_rollover() {
        let (clock, guard) = setup(23, 0);
        let id = "KXLOWTLAX-26JAN01-B53.5";
        guard.mark_betted(id);

        for _ in 0..5 {
            assert_eq!(guard.should_analyze(id), Err(RejectReason::BettedToday));
            clock.advance_secs(10 * 60);
        }
        assert!(guard.is_betted_today(id));

        // 23:59:59 still the same day
        clock.set(Utc.with_ymd_and_hms(2026, 1, 1, 23, 59, 59).unwrap());
        assert_eq!(guard.should_analyze(id), Err(RejectReason::BettedToday));

        clock.advance_secs(1);
        assert!(guard.should_analyze(id).is_ok());
        assert!(!guard.is_betted_today(id));
    }

    #[test]
    fn test_cooldown_across_midnight() {
        let (clock, guard) = setup(23, 40);
        guard.mark_analyzed("KXHIGHNY-26JAN02-B40", true);
        guard.reset_cycle_tracking();

        clock.advance_secs(30 * 60);
        match guard.should_analyze("KXHIGHNY-26JAN02-B40") {
            Err(RejectReason::AnalysisCooldown { remaining_minutes }) => {
                assert_eq!(remaining_minutes, 30)
            }
            other => panic!("expected cooldown, got {other:?}"),
        }

        clock.advance_secs(30 * 60);
        assert!(guard.should_analyze("KXHIGHNY-26JAN02-B40").is_ok());
    }

    #[test]
    fn test_failed_analysis_allows_retry() {
        let (_clock, guard) = setup(12, 0);
        guard.mark_analyzed("X", false);
        assert!(guard.should_analyze("X").is_ok());

        let m = guard.efficiency_metrics();
        assert_eq!(m.total_analyses, 1);
        assert_eq!(m.analyzed_today, 0);
    }

    #[test]
    fn test_efficiency_metrics_reset_on_rollover() {
        let (clock, guard) = setup(9, 0);
        for id in ["A", "B", "C", "D"] {
            guard.mark_analyzed(id, true);
        }
        guard.mark_betted("B");

        let m = guard.efficiency_metrics();
        assert_eq!(m.total_analyses, 4);
        assert_eq!(m.total_bets, 1);
        assert_eq!(m.calls_per_bet, 4.0);
        assert_eq!(m.efficiency_pct, 25.0);
        assert_eq!(m.analyzed_this_cycle, 4);

        clock.set(Utc.with_ymd_and_hms(2026, 1, 2, 9, 0, 0).unwrap());
        let m = guard.efficiency_metrics();
        assert_eq!(m.total_analyses, 0);
        assert_eq!(m.calls_per_bet, 0.0);
        assert_eq!(m.betted_today, 0);
    }
}
