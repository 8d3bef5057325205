use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Venue an opportunity or position lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Kalshi,
    Polymarket,
    Coinbase,
    Binance,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Kalshi => "kalshi",
            Platform::Polymarket => "polymarket",
            Platform::Coinbase => "coinbase",
            Platform::Binance => "binance",
        }
    }

    /// Binary-contract venues quote prices in [0, 1]; spot venues quote asset prices.
    pub fn is_prediction_market(&self) -> bool {
        matches!(self, Platform::Kalshi | Platform::Polymarket)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Yes,
    No,
    Buy,
    Sell,
}

/// Point-in-time view of a market as reported by an exchange collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub id: String,
    pub title: String,
    pub platform: Platform,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub volume: Decimal,
    pub closes_at: Option<DateTime<Utc>>,
}

impl MarketSnapshot {
    pub fn price_for(&self, side: Side) -> Decimal {
        match side {
            Side::Yes | Side::Buy => self.yes_price,
            Side::No | Side::Sell => self.no_price,
        }
    }
}
