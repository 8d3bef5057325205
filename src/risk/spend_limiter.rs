use crate::clock::{elapsed_between, Clock};
use crate::config::SpendConfig;
use crate::models::decision::RejectReason;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
struct SpendEntry {
    amount: Decimal,
    at: DateTime<Utc>,
}

/// Sliding-window cap on dollars committed.
///
/// `check` is side-effecting: on success the amount is recorded. Call it exactly
/// once per admitted trade, inside the trading lock.
pub struct SpendLimiter {
    window: Mutex<VecDeque<SpendEntry>>,
    clock: Arc<dyn Clock>,
    config: SpendConfig,
}

impl SpendLimiter {
    pub fn new(config: SpendConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            window: Mutex::new(VecDeque::new()),
            clock,
            config,
        }
    }

    /// Admit and record `amount`, or reject with the headroom left and how long
    /// until the oldest entry leaves the window. Returns the new window total.
    pub fn check(&self, amount: Decimal) -> Result<Decimal, RejectReason> {
        if amount <= Decimal::ZERO {
            return Err(RejectReason::InvalidAmount { amount });
        }
        let now = self.clock.now();
        let window_len = self.config.window();
        let cap = self.config.max_spend;

        let mut window = self.window.lock();
        while window.front().is_some_and(|e| now - e.at >= window_len) {
            window.pop_front();
        }

        let recent: Decimal = window.iter().map(|e| e.amount).sum();
        if recent + amount > cap {
            let wait = window
                .front()
                .map(|oldest| elapsed_between(now, oldest.at + window_len))
                .unwrap_or_default();
            let headroom = (cap - recent).max(Decimal::ZERO);
            debug!("Spend rejected: recent={recent} amount={amount} cap={cap} wait={}s", wait.as_secs());
            return Err(RejectReason::SpendRate {
                recent_spend: recent,
                cap,
                headroom,
                wait,
            });
        }

        window.push_back(SpendEntry { amount, at: now });
        Ok(recent + amount)
    }

    /// Undo the most recent recorded spend of exactly `amount` (order placement
    /// failed after a successful check). Returns whether an entry was removed.
    pub fn refund(&self, amount: Decimal) -> bool {
        let mut window = self.window.lock();
        match window.iter().rposition(|e| e.amount == amount) {
            Some(idx) => {
                window.remove(idx);
                info!("Spend refunded: {amount}");
                true
            }
            None => false,
        }
    }

    /// Dollars inside the trailing window right now. Read-only.
    pub fn window_total(&self) -> Decimal {
        let now = self.clock.now();
        let window_len = self.config.window();
        self.window
            .lock()
            .iter()
            .filter(|e| now - e.at < window_len)
            .map(|e| e.amount)
            .sum()
    }

    pub fn cap(&self) -> Decimal {
        self.config.max_spend
    }
}
