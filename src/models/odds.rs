use serde::{Deserialize, Serialize};

/// Below this, a decimal payout is treated as "no payout" to keep Kelly finite.
pub const MIN_NET_PAYOUT: f64 = 1e-9;

/// Market quote for the side being bought.
///
/// Sportsbook lines arrive as American odds; prediction-market contracts
/// arrive as a price in (0, 1) that pays $1 on resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Odds {
    American(f64),
    Price(f64),
}

impl Odds {
    /// Market-implied win probability, `None` when the quote is degenerate.
    pub fn implied_probability(&self) -> Option<f64> {
        match *self {
            Odds::American(a) => american_to_implied(a),
            Odds::Price(p) if p.is_finite() && p > 0.0 && p < 1.0 => Some(p),
            Odds::Price(_) => None,
        }
    }

    /// Decimal odds (total return per $1 staked), `None` when degenerate.
    pub fn decimal(&self) -> Option<f64> {
        match *self {
            Odds::American(a) => american_to_decimal(a),
            Odds::Price(p) if p.is_finite() && p > 0.0 && p < 1.0 => Some(1.0 / p),
            Odds::Price(_) => None,
        }
    }

    pub fn american(&self) -> Option<f64> {
        match *self {
            Odds::American(a) if a.is_finite() && a != 0.0 => Some(a),
            Odds::American(_) => None,
            Odds::Price(p) => price_to_american(p),
        }
    }
}

/// -110 → 0.5238, +150 → 0.40
pub fn american_to_implied(american: f64) -> Option<f64> {
    if !american.is_finite() || american == 0.0 {
        return None;
    }
    let p = if american > 0.0 {
        100.0 / (american + 100.0)
    } else {
        american.abs() / (american.abs() + 100.0)
    };
    (p > 0.0 && p < 1.0).then_some(p)
}

/// -110 → 1.909, +150 → 2.50
pub fn american_to_decimal(american: f64) -> Option<f64> {
    if !american.is_finite() || american == 0.0 {
        return None;
    }
    let d = if american > 0.0 {
        1.0 + american / 100.0
    } else {
        1.0 + 100.0 / american.abs()
    };
    d.is_finite().then_some(d)
}

/// Binary contract price → American line. 0.40 → +150, 0.60 → -150.
pub fn price_to_american(price: f64) -> Option<f64> {
    if !price.is_finite() || price <= 0.0 || price >= 1.0 {
        return None;
    }
    if price >= 0.5 {
        Some(-(price / (1.0 - price)) * 100.0)
    } else {
        Some(((1.0 - price) / price) * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_american_conversions() {
        let p = american_to_implied(-110.0).unwrap();
        assert!((p - 0.5238).abs() < 0.0001);
        assert!((american_to_implied(150.0).unwrap() - 0.40).abs() < 1e-12);
        assert!((american_to_decimal(100.0).unwrap() - 2.0).abs() < 1e-12);
        assert!((american_to_decimal(-200.0).unwrap() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_and_nan_odds_are_degenerate() {
        assert_eq!(american_to_implied(0.0), None);
        assert_eq!(american_to_decimal(f64::NAN), None);
        assert_eq!(Odds::Price(0.0).decimal(), None);
        assert_eq!(Odds::Price(1.0).implied_probability(), None);
    }

    #[test]
    fn test_price_to_american() {
        assert!((price_to_american(0.40).unwrap() - 150.0).abs() < 1e-9);
        assert!((price_to_american(0.60).unwrap() + 150.0).abs() < 1e-9);
        assert!((price_to_american(0.50).unwrap() + 100.0).abs() < 1e-9);
        assert_eq!(price_to_american(1.2), None);
    }
}
