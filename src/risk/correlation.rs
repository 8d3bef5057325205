use crate::models::decision::RejectReason;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Series prefix carried by exchange-issued event tickers.
const SERIES_PREFIX: &str = "KX";

/// Derive the event a market identifier resolves on.
///
/// Grammar: `[KX]BASE-DATE[-STRIKE...]`. The identifier is split on `-`; the
/// leading `KX` is stripped from the first token, the date token is kept and
/// everything after it (strike, threshold, bracket) is dropped. Identifiers
/// with fewer than two tokens are their own event.
///
/// `KXLOWTLAX-26JAN01-B53.5` → `LOWTLAX-26JAN01`
pub fn event_key(id: &str) -> String {
    let mut parts = id.split('-');
    match (parts.next(), parts.next()) {
        (Some(base), Some(date)) => {
            let base = base.strip_prefix(SERIES_PREFIX).unwrap_or(base);
            format!("{base}-{date}")
        }
        _ => id.to_string(),
    }
}

/// Groups markets with exposure by the event they resolve on, so only one
/// position per event is admitted.
#[derive(Debug, Default)]
pub struct CorrelationTracker {
    events: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl CorrelationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ok with the event key when no market on the same event holds exposure.
    pub fn check_correlation(&self, id: &str) -> Result<String, RejectReason> {
        let key = event_key(id);
        match self.events.read().get(&key) {
            Some(markets) if !markets.is_empty() => Err(RejectReason::Correlated {
                event_key: key,
                markets: markets.iter().cloned().collect(),
            }),
            _ => Ok(key),
        }
    }

    /// Register only after the order is confirmed placed.
    pub fn register_bet(&self, id: &str) {
        let key = event_key(id);
        let mut events = self.events.write();
        let markets = events.entry(key.clone()).or_default();
        markets.insert(id.to_string());
        info!("Registered {id} under event {key} ({} market(s))", markets.len());
    }

    /// Returns whether `id` was registered. Drops the event once empty.
    pub fn unregister_bet(&self, id: &str) -> bool {
        let key = event_key(id);
        let mut events = self.events.write();
        let Some(markets) = events.get_mut(&key) else {
            return false;
        };
        let removed = markets.remove(id);
        if markets.is_empty() {
            events.remove(&key);
            debug!("Event {key} has no remaining exposure");
        }
        removed
    }

    /// Snapshot: event key → markets holding exposure.
    pub fn correlated_markets(&self) -> BTreeMap<String, Vec<String>> {
        self.events
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
            .collect()
    }

    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }
}
