use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by the request-coalescing cache after stale fallback is exhausted.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("upstream fetch failed for {key}: {source}")]
    Upstream {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("upstream fetch for {key} timed out after {timeout:?}")]
    Timeout { key: String, timeout: Duration },
}

impl CacheError {
    pub fn key(&self) -> &str {
        match self {
            CacheError::Upstream { key, .. } | CacheError::Timeout { key, .. } => key,
        }
    }

    /// Copy handed to callers that were queued on the same failed fetch.
    pub fn share(&self) -> CacheError {
        match self {
            CacheError::Upstream { key, source } => CacheError::Upstream {
                key: key.clone(),
                source: anyhow::anyhow!("{source:#}"),
            },
            CacheError::Timeout { key, timeout } => CacheError::Timeout {
                key: key.clone(),
                timeout: *timeout,
            },
        }
    }
}

/// Errors reported by an exchange/broker collaborator.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("order rejected by {platform}: {reason}")]
    OrderRejected { platform: String, reason: String },

    #[error("insufficient balance: need={need} have={have}")]
    InsufficientBalance { need: Decimal, have: Decimal },

    #[error("market not found: {0}")]
    MarketNotFound(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Bankroll ledger misuse. Grading is driven by external settlement data, so
/// mismatched ids are reported rather than silently ignored.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BankrollError {
    #[error("no open bet with id {0}")]
    UnknownBet(String),

    #[error("bet {0} is already recorded")]
    DuplicateBet(String),

    #[error("invalid stake {stake} for bet {id}")]
    InvalidStake { id: String, stake: Decimal },
}
