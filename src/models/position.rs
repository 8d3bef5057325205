use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::market::Platform;

/// An open exposure owned by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub platform: Platform,
    pub opened_at: DateTime<Utc>,
    pub amount: Decimal,
}

impl Position {
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        crate::clock::elapsed_between(self.opened_at, now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetResult {
    Win,
    Loss,
    Push,
}
