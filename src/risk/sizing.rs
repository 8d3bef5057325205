use crate::config::SizingConfig;
use crate::models::odds::{Odds, MIN_NET_PAYOUT};
use serde::Serialize;

/// Edge, expected value and a bounded stake for one opportunity.
///
/// Percentages are in points (edge 4.5 = 4.5%). A degenerate quote or
/// probability yields the neutral result: zero edge, zero stake, no pass.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EvResult {
    pub edge: f64,
    pub expected_value: f64,
    /// Full Kelly, percent of bankroll.
    pub kelly_fraction: f64,
    pub recommended_stake: f64,
    pub pass_filter: bool,
    pub implied_probability: f64,
    pub decimal_odds: f64,
}

impl EvResult {
    pub fn neutral() -> Self {
        Self::default()
    }
}

/// Kelly optimal fraction for a binary bet.
///
/// f* = (b*p - q) / b
/// where b = net payout per $1, p = win probability, q = 1-p
pub fn kelly_fraction(win_prob: f64, net_payout: f64) -> f64 {
    if net_payout < MIN_NET_PAYOUT || !(0.0..=1.0).contains(&win_prob) {
        return 0.0;
    }
    let kelly = (net_payout * win_prob - (1.0 - win_prob)) / net_payout;
    if kelly.is_finite() {
        kelly.max(0.0)
    } else {
        0.0
    }
}

/// Pure EV/Kelly calculator. Stakes are fractional Kelly, capped at a
/// percentage of bankroll and then at an absolute ceiling.
#[derive(Debug, Clone)]
pub struct EvCalculator {
    config: SizingConfig,
}

impl EvCalculator {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    /// American-odds entry point with an explicit stake cap.
    pub fn calculate(
        &self,
        model_probability: f64,
        american_odds: f64,
        bankroll: f64,
        max_stake_pct: f64,
    ) -> EvResult {
        self.evaluate_with_cap(model_probability, Odds::American(american_odds), bankroll, max_stake_pct)
    }

    /// Evaluate any quote with the configured stake cap.
    pub fn evaluate(&self, model_probability: f64, odds: Odds, bankroll: f64) -> EvResult {
        self.evaluate_with_cap(model_probability, odds, bankroll, self.config.max_stake_pct)
    }

    fn evaluate_with_cap(
        &self,
        model_probability: f64,
        odds: Odds,
        bankroll: f64,
        max_stake_pct: f64,
    ) -> EvResult {
        if !model_probability.is_finite() || !(0.0..=1.0).contains(&model_probability) {
            return EvResult::neutral();
        }
        let (Some(implied), Some(decimal)) = (odds.implied_probability(), odds.decimal()) else {
            return EvResult::neutral();
        };
        let net = decimal - 1.0;
        if net < MIN_NET_PAYOUT {
            return EvResult::neutral();
        }

        let edge = (model_probability - implied) * 100.0;
        let expected_value = (model_probability * net - (1.0 - model_probability)) * 100.0;
        let kelly = kelly_fraction(model_probability, net) * 100.0;

        let recommended_stake = if bankroll.is_finite() && bankroll > 0.0 {
            let kelly_stake = bankroll * (kelly / 100.0) * self.config.kelly_multiplier;
            let pct_cap = bankroll * (max_stake_pct.max(0.0) / 100.0);
            let mut stake = kelly_stake.min(pct_cap);
            if self.config.max_stake_abs > 0.0 {
                stake = stake.min(self.config.max_stake_abs);
            }
            stake.max(0.0)
        } else {
            0.0
        };

        EvResult {
            edge,
            expected_value,
            kelly_fraction: kelly,
            recommended_stake,
            pass_filter: edge >= self.config.min_edge_pct,
            implied_probability: implied,
            decimal_odds: decimal,
        }
    }

    pub fn min_edge_pct(&self) -> f64 {
        self.config.min_edge_pct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uncapped() -> EvCalculator {
        EvCalculator::new(SizingConfig {
            max_stake_abs: 0.0,
            ..SizingConfig::default()
        })
    }

    #[test]
    fn test_even_money_sixty_percent() {
        let calc = uncapped();
        let r = calc.calculate(0.6, 100.0, 1000.0, 100.0);
        assert!((r.decimal_odds - 2.0).abs() < 1e-12);
        assert!((r.edge - 10.0).abs() < 1e-9);
        assert!((r.expected_value - 20.0).abs() < 1e-9);
        assert!((r.kelly_fraction - 20.0).abs() < 1e-9);
        // Half-Kelly = 10% of bankroll
        assert!((r.recommended_stake - 100.0).abs() < 1e-9);
        assert!(r.pass_filter);

        // Capped at 5%
        let r = calc.calculate(0.6, 100.0, 1000.0, 5.0);
        assert!((r.recommended_stake - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_absolute_ceiling() {
        let calc = EvCalculator::new(SizingConfig::default());
        let r = calc.calculate(0.6, 100.0, 1000.0, 5.0);
        assert_eq!(r.recommended_stake, 25.0);
    }

    #[test]
    fn test_negative_edge_sizes_zero() {
        let calc = uncapped();
        let r = calc.calculate(0.45, -110.0, 1000.0, 5.0);
        assert!(r.edge < 0.0);
        assert_eq!(r.kelly_fraction, 0.0);
        assert_eq!(r.recommended_stake, 0.0);
        assert!(!r.pass_filter);
    }

    #[test]
    fn test_min_edge_filter() {
        let calc = uncapped();
        // +150 implies 40%; 42% is a 2pt edge
        assert!(!calc.calculate(0.42, 150.0, 1000.0, 5.0).pass_filter);
        assert!(calc.calculate(0.44, 150.0, 1000.0, 5.0).pass_filter);
    }

    #[test]
    fn test_degenerate_inputs_are_neutral() {
        let calc = uncapped();
        assert_eq!(calc.calculate(0.6, 0.0, 1000.0, 5.0), EvResult::neutral());
        assert_eq!(calc.calculate(f64::NAN, 120.0, 1000.0, 5.0), EvResult::neutral());
        assert_eq!(calc.calculate(1.4, 120.0, 1000.0, 5.0), EvResult::neutral());
        assert_eq!(calc.evaluate(0.6, Odds::Price(1.0), 1000.0), EvResult::neutral());
        assert_eq!(calc.evaluate(0.6, Odds::Price(0.0), 1000.0), EvResult::neutral());
        // Huge favourite: net payout ~1e-7 is still finite
        let r = calc.calculate(0.99, -1e9, 1000.0, 5.0);
        assert!(r.recommended_stake.is_finite());
    }

    #[test]
    fn test_contract_price_quote() {
        let calc = uncapped();
        // 0.40 contract pays 1.5:1
        let r = calc.evaluate(0.55, Odds::Price(0.40), 1000.0);
        assert!((r.edge - 15.0).abs() < 1e-9);
        assert!((r.decimal_odds - 2.5).abs() < 1e-12);
        assert!(r.recommended_stake <= 50.0);
    }

    #[test]
    fn test_stake_bounded_for_all_inputs() {
        let calc = uncapped();
        for p in [0.01, 0.2, 0.5, 0.7, 0.95, 0.999] {
            for odds in [-1000.0, -200.0, -101.0, 101.0, 250.0, 2000.0] {
                let r = calc.calculate(p, odds, 500.0, 5.0);
                assert!(r.recommended_stake >= 0.0);
                assert!(r.recommended_stake <= 25.0 + 1e-9);
            }
        }
    }

    #[test]
    fn test_zero_bankroll_has_edge_but_no_stake() {
        let calc = uncapped();
        let r = calc.calculate(0.6, 100.0, 0.0, 5.0);
        assert!(r.edge > 0.0);
        assert_eq!(r.recommended_stake, 0.0);
    }
}
