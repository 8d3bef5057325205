pub mod decision;
pub mod market;
pub mod odds;
pub mod opportunity;
pub mod order;
pub mod position;
pub mod tier;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Dollar amount from a float, rounded to cents. Non-finite input maps to zero.
pub fn to_money(x: f64) -> Decimal {
    Decimal::from_f64(x)
        .map(|d| d.round_dp(2))
        .unwrap_or(Decimal::ZERO)
}

pub fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}
