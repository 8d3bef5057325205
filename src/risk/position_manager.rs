use crate::clock::{elapsed_between, Clock};
use crate::config::LedgerConfig;
use crate::models::market::Platform;
use crate::models::position::Position;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentPosition {
    pub recent: bool,
    pub elapsed: Option<std::time::Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownStatus {
    pub on_cooldown: bool,
    pub remaining: Option<std::time::Duration>,
}

#[derive(Debug, Default)]
struct Ledger {
    /// Open positions by id.
    open: HashMap<String, Position>,
    /// Last entry per (symbol, platform). Survives `remove_position`.
    entries: HashMap<(String, Platform), DateTime<Utc>>,
    /// Last trade per symbol, any platform.
    last_trade: HashMap<String, DateTime<Utc>>,
}

/// Authoritative record of open and recently opened exposure.
///
/// All operations are synchronous and in-memory. Mutations must happen while
/// the caller holds the trading lock so that check-then-add is atomic across
/// concurrent scan loops; reads may run without it.
pub struct PositionManager {
    ledger: RwLock<Ledger>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl PositionManager {
    pub fn new(config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger: RwLock::new(Ledger::default()),
            clock,
            config,
        }
    }

    pub fn has_open_position(&self, symbol: &str, platform: Platform) -> bool {
        self.ledger
            .read()
            .open
            .values()
            .any(|p| p.symbol == symbol && p.platform == platform)
    }

    /// Whether a position on `symbol`/`platform` was opened within `window`,
    /// even if it has since been closed.
    pub fn has_recent_position(&self, symbol: &str, platform: Platform, window: Duration) -> RecentPosition {
        let now = self.clock.now();
        let ledger = self.ledger.read();
        match ledger.entries.get(&(symbol.to_string(), platform)) {
            Some(&at) if now - at < window => RecentPosition {
                recent: true,
                elapsed: Some(elapsed_between(at, now)),
            },
            _ => RecentPosition {
                recent: false,
                elapsed: None,
            },
        }
    }

    /// Recent-position check with the configured window.
    pub fn has_recent_position_default(&self, symbol: &str, platform: Platform) -> RecentPosition {
        self.has_recent_position(symbol, platform, self.config.recent_window())
    }

    /// Short per-symbol re-entry cooldown, independent of platform and outcome.
    pub fn is_on_cooldown(&self, symbol: &str) -> CooldownStatus {
        let now = self.clock.now();
        let cooldown = self.config.symbol_cooldown();
        let ledger = self.ledger.read();
        match ledger.last_trade.get(symbol) {
            Some(&at) if now - at < cooldown => CooldownStatus {
                on_cooldown: true,
                remaining: Some(elapsed_between(now, at + cooldown)),
            },
            _ => CooldownStatus {
                on_cooldown: false,
                remaining: None,
            },
        }
    }

    /// Record a newly placed position and stamp the symbol's last trade time.
    pub fn add_position(&self, id: &str, symbol: &str, platform: Platform, amount: Decimal) {
        let now = self.clock.now();
        let mut ledger = self.ledger.write();

        ledger.open.insert(
            id.to_string(),
            Position {
                id: id.to_string(),
                symbol: symbol.to_string(),
                platform,
                opened_at: now,
                amount,
            },
        );
        ledger.entries.insert((symbol.to_string(), platform), now);
        ledger.last_trade.insert(symbol.to_string(), now);

        // Entry history only matters inside the recent window
        let horizon = self.config.recent_window().max(self.config.symbol_cooldown());
        ledger.entries.retain(|_, at| now - *at < horizon);
        ledger.last_trade.retain(|_, at| now - *at < horizon);

        info!(
            "Position opened: id={id} symbol={symbol} platform={platform} amount={amount} open={}",
            ledger.open.len()
        );
    }

    pub fn remove_position(&self, id: &str) -> Option<Position> {
        let removed = self.ledger.write().open.remove(id);
        match &removed {
            Some(p) => info!(
                "Position closed: id={id} symbol={} held={}s",
                p.symbol,
                p.age(self.clock.now()).as_secs()
            ),
            None => debug!("remove_position: unknown id {id}"),
        }
        removed
    }

    /// Forget entry history and symbol cooldowns (open positions are kept).
    pub fn clear_history(&self) {
        let mut ledger = self.ledger.write();
        ledger.entries.clear();
        ledger.last_trade.clear();
    }

    pub fn get(&self, id: &str) -> Option<Position> {
        self.ledger.read().open.get(id).cloned()
    }

    /// Snapshot of open positions on `platform`, oldest first.
    pub fn positions(&self, platform: Platform) -> Vec<Position> {
        let mut out: Vec<Position> = self
            .ledger
            .read()
            .open
            .values()
            .filter(|p| p.platform == platform)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub fn all_positions(&self) -> Vec<Position> {
        let mut out: Vec<Position> = self.ledger.read().open.values().cloned().collect();
        out.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub fn open_count(&self) -> usize {
        self.ledger.read().open.len()
    }

    pub fn total_capital_deployed(&self) -> Decimal {
        self.ledger.read().open.values().map(|p| p.amount).sum()
    }

    pub fn capital_per_symbol(&self) -> BTreeMap<String, Decimal> {
        let mut out = BTreeMap::new();
        for p in self.ledger.read().open.values() {
            *out.entry(p.symbol.clone()).or_insert(Decimal::ZERO) += p.amount;
        }
        out
    }
}
