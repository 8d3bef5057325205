use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::market::{Platform, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

/// What the host asks the exchange collaborator to place after admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub market_id: String,
    pub platform: Platform,
    pub side: Side,
    /// Contracts (or units) requested at `price` each.
    pub size: Decimal,
    pub price: Decimal,
}

impl OrderRequest {
    pub fn notional(&self) -> Decimal {
        self.size * self.price
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub market_id: String,
    pub status: OrderStatus,
    pub filled_size: Decimal,
    pub avg_fill_price: Decimal,
    pub remaining_size: Decimal,
    pub timestamp: DateTime<Utc>,
    pub error_msg: Option<String>,
}

impl OrderResult {
    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Filled | OrderStatus::PartiallyFilled | OrderStatus::Open
        )
    }

    /// Dollars actually committed.
    pub fn committed(&self) -> Decimal {
        self.filled_size * self.avg_fill_price
    }
}
