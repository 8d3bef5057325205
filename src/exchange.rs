use crate::clock::Clock;
use crate::error::ExchangeError;
use crate::models::market::{MarketSnapshot, Platform};
use crate::models::order::{OrderRequest, OrderResult, OrderStatus};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Exchange/broker boundary. The gate never talks to a network itself; hosts
/// hand it one of these.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn platform(&self) -> Platform;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResult, ExchangeError>;

    async fn get_balance(&self) -> Result<Decimal, ExchangeError>;

    async fn get_markets(&self) -> Result<Vec<MarketSnapshot>, ExchangeError>;

    async fn get_market(&self, id: &str) -> Result<MarketSnapshot, ExchangeError>;
}

/// In-memory exchange that fills every order in full at the requested price.
///
/// Used by the paper host and by tests. Markets listed in `reject` fail
/// placement with [`ExchangeError::OrderRejected`].
pub struct PaperExchange {
    platform: Platform,
    balance: Mutex<Decimal>,
    markets: DashMap<String, MarketSnapshot>,
    reject: Mutex<HashSet<String>>,
    clock: Arc<dyn Clock>,
}

impl PaperExchange {
    pub fn new(platform: Platform, balance: Decimal, clock: Arc<dyn Clock>) -> Self {
        Self {
            platform,
            balance: Mutex::new(balance),
            markets: DashMap::new(),
            reject: Mutex::new(HashSet::new()),
            clock,
        }
    }

    pub fn list_market(&self, market: MarketSnapshot) {
        self.markets.insert(market.id.clone(), market);
    }

    pub fn reject_orders_for(&self, market_id: &str) {
        self.reject.lock().insert(market_id.to_string());
    }

    /// Credit a settled payout back to the paper balance.
    pub fn credit(&self, amount: Decimal) {
        *self.balance.lock() += amount;
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResult, ExchangeError> {
        if self.reject.lock().contains(&order.market_id) {
            return Err(ExchangeError::OrderRejected {
                platform: self.platform.to_string(),
                reason: format!("market {} is halted", order.market_id),
            });
        }

        let cost = order.notional();
        {
            let mut balance = self.balance.lock();
            if cost > *balance {
                return Err(ExchangeError::InsufficientBalance {
                    need: cost,
                    have: *balance,
                });
            }
            *balance -= cost;
        }

        let order_id = uuid::Uuid::new_v4().to_string();
        info!(
            "[PAPER] Filled {order_id}: {} {:?} {} @ {} (${cost})",
            order.market_id, order.side, order.size, order.price
        );
        Ok(OrderResult {
            order_id,
            market_id: order.market_id.clone(),
            status: OrderStatus::Filled,
            filled_size: order.size,
            avg_fill_price: order.price,
            remaining_size: Decimal::ZERO,
            timestamp: self.clock.now(),
            error_msg: None,
        })
    }

    async fn get_balance(&self) -> Result<Decimal, ExchangeError> {
        Ok(*self.balance.lock())
    }

    async fn get_markets(&self) -> Result<Vec<MarketSnapshot>, ExchangeError> {
        let mut out: Vec<MarketSnapshot> = self.markets.iter().map(|m| m.value().clone()).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        debug!("[PAPER] {} markets listed", out.len());
        Ok(out)
    }

    async fn get_market(&self, id: &str) -> Result<MarketSnapshot, ExchangeError> {
        self.markets
            .get(id)
            .map(|m| m.value().clone())
            .ok_or_else(|| ExchangeError::MarketNotFound(id.to_string()))
    }
}
