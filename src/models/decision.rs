use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use super::market::Platform;

/// Why a candidate was turned away. Rejections are expected outcomes and are
/// returned as values, never propagated as failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum RejectReason {
    #[error("invalid stake amount ${amount}")]
    InvalidAmount { amount: Decimal },

    #[error("already analyzed this cycle")]
    AnalyzedThisCycle,

    #[error("already analyzed today")]
    AnalyzedToday,

    #[error("already bet on this market today")]
    BettedToday,

    #[error("on cooldown ({remaining_minutes}min remaining)")]
    AnalysisCooldown { remaining_minutes: i64 },

    #[error("duplicate position detected: {symbol} on {platform}")]
    DuplicatePosition { symbol: String, platform: Platform },

    #[error("recent position exists: {symbol} traded {minutes_ago} minutes ago")]
    RecentPosition { symbol: String, minutes_ago: i64 },

    #[error("{symbol} on cooldown ({remaining_secs}s remaining)")]
    SymbolCooldown { symbol: String, remaining_secs: i64 },

    #[error("already have bet on event {event_key} ({} market(s))", .markets.len())]
    Correlated {
        event_key: String,
        markets: Vec<String>,
    },

    #[error("{symbol} would be {:.1}% of portfolio (max {:.0}%)", .concentration * 100.0, .max * 100.0)]
    Concentration {
        symbol: String,
        concentration: f64,
        max: f64,
    },

    #[error("spending too fast: ${recent_spend} in window (max ${cap}), can spend ${headroom} now")]
    SpendRate {
        recent_spend: Decimal,
        cap: Decimal,
        headroom: Decimal,
        #[serde(skip)]
        wait: Duration,
    },

    #[error("edge {edge:.2}% below minimum {min_edge:.2}%")]
    EdgeBelowMinimum { edge: f64, min_edge: f64 },
}

impl RejectReason {
    /// How long the caller may sleep before the same request could pass.
    /// `None` when waiting alone will not help.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RejectReason::SpendRate { wait, .. } if !wait.is_zero() => Some(*wait),
            RejectReason::AnalysisCooldown { remaining_minutes } => {
                Some(Duration::from_secs((*remaining_minutes).max(0) as u64 * 60))
            }
            RejectReason::SymbolCooldown { remaining_secs, .. } => {
                Some(Duration::from_secs((*remaining_secs).max(0) as u64))
            }
            _ => None,
        }
    }
}

/// Outcome of an admission or analysis gate.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Approved,
    Rejected(RejectReason),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Approved)
    }

    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            Admission::Approved => None,
            Admission::Rejected(r) => Some(r),
        }
    }
}

impl From<Result<(), RejectReason>> for Admission {
    fn from(r: Result<(), RejectReason>) -> Self {
        match r {
            Ok(()) => Admission::Approved,
            Err(reason) => Admission::Rejected(reason),
        }
    }
}
