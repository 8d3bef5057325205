use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::market::{Platform, Side};
use super::odds::Odds;

/// A candidate trade produced by a scanner for one cycle.
///
/// Read-only to the gate. `id` is unique per market/contract (e.g. a Kalshi
/// ticker); `symbol` groups opportunities on the same underlying for the
/// ledger and concentration checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub symbol: String,
    pub platform: Platform,
    pub side: Side,
    /// Model win probability in [0, 1].
    pub model_probability: f64,
    pub odds: Odds,
    /// Analyst confidence in [0, 1]; falls back to `model_probability`.
    pub confidence: Option<f64>,
    /// Locked-in profit fraction when this is a hedged/arbitrage opportunity.
    pub arbitrage_profit: Option<f64>,
    /// Line movement in our favour since open, in points.
    pub line_movement: Option<f64>,
    pub early_line: bool,
    pub event_time: Option<DateTime<Utc>>,
}

impl Opportunity {
    pub fn new(
        id: impl Into<String>,
        symbol: impl Into<String>,
        platform: Platform,
        side: Side,
        model_probability: f64,
        odds: Odds,
    ) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            platform,
            side,
            model_probability,
            odds,
            confidence: None,
            arbitrage_profit: None,
            line_movement: None,
            early_line: false,
            event_time: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_arbitrage_profit(mut self, profit: f64) -> Self {
        self.arbitrage_profit = Some(profit);
        self
    }

    pub fn with_early_line(mut self, movement: f64) -> Self {
        self.early_line = true;
        self.line_movement = Some(movement);
        self
    }

    pub fn with_event_time(mut self, at: DateTime<Utc>) -> Self {
        self.event_time = Some(at);
        self
    }

    pub fn confidence(&self) -> f64 {
        let c = self.confidence.unwrap_or(self.model_probability);
        if c.is_finite() {
            c.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn is_guaranteed_profit(&self) -> bool {
        self.arbitrage_profit.is_some_and(|p| p > 0.0)
    }

    pub fn has_favorable_line(&self) -> bool {
        self.early_line && self.line_movement.is_some_and(|m| m > 0.0)
    }
}
