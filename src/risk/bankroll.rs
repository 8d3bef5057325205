use crate::clock::Clock;
use crate::config::BankrollConfig;
use crate::error::BankrollError;
use crate::models::position::BetResult;
use crate::models::to_f64;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawdownSeverity {
    Low,
    Medium,
    High,
}

impl fmt::Display for DrawdownSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DrawdownSeverity::Low => "low",
            DrawdownSeverity::Medium => "medium",
            DrawdownSeverity::High => "high",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingBet {
    pub stake: Decimal,
    pub placed_at: DateTime<Utc>,
}

/// Running bankroll ledger. Serializable so a host can checkpoint it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankrollState {
    pub initial: Decimal,
    pub current: Decimal,
    pub peak: Decimal,
    pub trough: Decimal,
    pub total_staked: Decimal,
    pub total_profit: Decimal,
    /// Percent of total staked.
    pub roi: f64,
    /// Percent below peak.
    pub drawdown_pct: f64,
    /// Population std-dev of per-bet profit over graded bets.
    pub variance: f64,
    pub win_count: u32,
    pub loss_count: u32,
    pub push_count: u32,
    pub pending: BTreeMap<String, PendingBet>,
    pub outcomes: Vec<Decimal>,
}

impl BankrollState {
    pub fn new(initial: Decimal) -> Self {
        Self {
            initial,
            current: initial,
            peak: initial,
            trough: initial,
            total_staked: Decimal::ZERO,
            total_profit: Decimal::ZERO,
            roi: 0.0,
            drawdown_pct: 0.0,
            variance: 0.0,
            win_count: 0,
            loss_count: 0,
            push_count: 0,
            pending: BTreeMap::new(),
            outcomes: Vec::new(),
        }
    }

    /// Wins over decided bets (pushes excluded), in percent.
    pub fn win_rate(&self) -> f64 {
        let decided = self.win_count + self.loss_count;
        if decided == 0 {
            return 0.0;
        }
        self.win_count as f64 / decided as f64 * 100.0
    }

    fn recompute(&mut self) {
        self.peak = self.peak.max(self.current);
        self.trough = self.trough.min(self.current);
        self.drawdown_pct = if self.peak > Decimal::ZERO {
            to_f64((self.peak - self.current) * Decimal::ONE_HUNDRED / self.peak)
        } else {
            0.0
        };
        self.roi = if self.total_staked > Decimal::ZERO {
            to_f64(self.total_profit * Decimal::ONE_HUNDRED / self.total_staked)
        } else {
            0.0
        };
        self.variance = if self.outcomes.is_empty() {
            0.0
        } else {
            self.outcomes.iter().map(|p| to_f64(*p)).population_std_dev()
        };
    }
}

/// Stake and outcome ledger feeding Kelly sizing and drawdown alerts.
pub struct BankrollTracker {
    state: RwLock<BankrollState>,
    config: BankrollConfig,
    clock: Arc<dyn Clock>,
}

impl BankrollTracker {
    pub fn new(config: BankrollConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(BankrollState::new(config.starting_bankroll)),
            config,
            clock,
        }
    }

    /// Debit `stake` for a newly placed bet.
    pub fn record_bet(&self, id: &str, stake: Decimal) -> Result<(), BankrollError> {
        if stake <= Decimal::ZERO {
            return Err(BankrollError::InvalidStake {
                id: id.to_string(),
                stake,
            });
        }
        let mut state = self.state.write();
        if state.pending.contains_key(id) {
            return Err(BankrollError::DuplicateBet(id.to_string()));
        }

        state.pending.insert(
            id.to_string(),
            PendingBet {
                stake,
                placed_at: self.clock.now(),
            },
        );
        state.current -= stake;
        state.total_staked += stake;
        state.recompute();

        info!(
            "Bet recorded: {id} stake=${stake} bankroll=${} pending={}",
            state.current,
            state.pending.len()
        );
        Ok(())
    }

    /// Settle a pending bet. Win credits stake plus `profit`, push returns the
    /// stake, loss credits nothing (`profit` is ignored). Returns realized P&L.
    pub fn grade_bet(&self, id: &str, result: BetResult, profit: Decimal) -> Result<Decimal, BankrollError> {
        let mut state = self.state.write();
        let bet = state
            .pending
            .remove(id)
            .ok_or_else(|| BankrollError::UnknownBet(id.to_string()))?;

        let pnl = match result {
            BetResult::Win => {
                state.current += bet.stake + profit;
                state.win_count += 1;
                profit
            }
            BetResult::Push => {
                state.current += bet.stake;
                state.push_count += 1;
                Decimal::ZERO
            }
            BetResult::Loss => {
                state.loss_count += 1;
                -bet.stake
            }
        };
        state.total_profit += pnl;
        state.outcomes.push(pnl);
        state.recompute();

        info!(
            "Bet graded: {id} {result:?} pnl=${pnl} bankroll=${} drawdown={:.1}% roi={:.1}%",
            state.current, state.drawdown_pct, state.roi
        );
        Ok(pnl)
    }

    /// Severity once drawdown strictly exceeds the low/medium/high thresholds.
    pub fn drawdown_alert(&self) -> Option<DrawdownSeverity> {
        let dd = self.state.read().drawdown_pct;
        let severity = if dd > self.config.drawdown_high_pct {
            DrawdownSeverity::High
        } else if dd > self.config.drawdown_medium_pct {
            DrawdownSeverity::Medium
        } else if dd > self.config.drawdown_low_pct {
            DrawdownSeverity::Low
        } else {
            return None;
        };
        if severity >= DrawdownSeverity::Medium {
            warn!("Drawdown {dd:.1}% ({severity})");
        }
        Some(severity)
    }

    pub fn snapshot(&self) -> BankrollState {
        self.state.read().clone()
    }

    /// Replace state from a checkpoint. Derived fields are recomputed.
    pub fn restore(&self, mut state: BankrollState) {
        state.recompute();
        info!(
            "Bankroll restored: ${} ({} pending, {} graded)",
            state.current,
            state.pending.len(),
            state.outcomes.len()
        );
        *self.state.write() = state;
    }

    pub fn current(&self) -> Decimal {
        self.state.read().current
    }

    pub fn pending_stake(&self, id: &str) -> Option<Decimal> {
        self.state.read().pending.get(id).map(|b| b.stake)
    }
}
