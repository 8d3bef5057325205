use crate::config::ConcentrationConfig;
use crate::models::decision::RejectReason;
use crate::models::market::Platform;
use crate::models::to_f64;
use crate::risk::position_manager::PositionManager;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// Portfolio concentration check against the ledger's open positions.
///
/// Concentration is counted in positions, not dollars: the share of open
/// positions on `platform` that would be on `symbol` after this trade.
pub struct RiskManager {
    config: ConcentrationConfig,
    position_mgr: Arc<PositionManager>,
}

impl RiskManager {
    pub fn new(config: ConcentrationConfig, position_mgr: Arc<PositionManager>) -> Self {
        Self {
            config,
            position_mgr,
        }
    }

    /// Ceiling for the given bankroll. A non-positive bankroll means unknown
    /// and gets the stricter cap.
    pub fn max_concentration(&self, bankroll: Decimal) -> f64 {
        let b = to_f64(bankroll);
        if b > 0.0 && b < self.config.small_bankroll_threshold {
            self.config.small_bankroll_max
        } else {
            self.config.large_bankroll_max
        }
    }

    /// Ok with the post-trade concentration, or a rejection when it would
    /// exceed the bankroll-dependent ceiling. An empty book always passes.
    pub fn check_concentration(
        &self,
        symbol: &str,
        amount: Decimal,
        platform: Platform,
        bankroll: Decimal,
    ) -> Result<f64, RejectReason> {
        let positions = self.position_mgr.positions(platform);
        let total = positions.len();
        if total == 0 {
            return Ok(0.0);
        }

        let same_symbol = positions.iter().filter(|p| p.symbol == symbol).count();
        let concentration = (same_symbol + 1) as f64 / (total + 1) as f64;
        let max = self.max_concentration(bankroll);

        if concentration > max {
            debug!(
                "Concentration: {symbol} {same_symbol}/{total} on {platform} amount={amount} -> {:.1}% > {:.0}%",
                concentration * 100.0,
                max * 100.0
            );
            return Err(RejectReason::Concentration {
                symbol: symbol.to_string(),
                concentration,
                max,
            });
        }
        Ok(concentration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::LedgerConfig;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn setup() -> (Arc<PositionManager>, RiskManager) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap(),
        ));
        let positions = Arc::new(PositionManager::new(LedgerConfig::default(), clock));
        let risk = RiskManager::new(ConcentrationConfig::default(), positions.clone());
        (positions, risk)
    }

    #[test]
    fn test_empty_book_always_passes() {
        let (_positions, risk) = setup();
        assert_eq!(
            risk.check_concentration("BTC-USD", dec!(5), Platform::Coinbase, dec!(1000)),
            Ok(0.0)
        );
    }

    #[test]
    fn test_cap_depends_on_bankroll() {
        let (positions, risk) = setup();
        positions.add_position("p1", "BTC-USD", Platform::Coinbase, dec!(5));
        positions.add_position("p2", "ETH-USD", Platform::Coinbase, dec!(5));
        positions.add_position("p3", "SOL-USD", Platform::Coinbase, dec!(5));

        // (1+1)/(3+1) = 50%
        assert!(risk
            .check_concentration("BTC-USD", dec!(5), Platform::Coinbase, dec!(400))
            .is_ok());
        let err = risk
            .check_concentration("BTC-USD", dec!(5), Platform::Coinbase, dec!(1000))
            .unwrap_err();
        assert_eq!(err.to_string(), "BTC-USD would be 50.0% of portfolio (max 40%)");

        // New symbol: 1/4 = 25%
        assert_eq!(
            risk.check_concentration("DOGE-USD", dec!(5), Platform::Coinbase, dec!(1000)),
            Ok(0.25)
        );
    }

    #[test]
    fn test_only_same_platform_counts() {
        let (positions, risk) = setup();
        positions.add_position("k1", "BTC-USD", Platform::Kalshi, dec!(5));
        positions.add_position("k2", "BTC-USD", Platform::Kalshi, dec!(5));

        assert!(risk
            .check_concentration("BTC-USD", dec!(5), Platform::Coinbase, dec!(1000))
            .is_ok());
    }

    #[test]
    fn test_unknown_bankroll_uses_strict_cap() {
        let (_positions, risk) = setup();
        assert_eq!(risk.max_concentration(Decimal::ZERO), 0.40);
        assert_eq!(risk.max_concentration(dec!(499.99)), 0.60);
        assert_eq!(risk.max_concentration(dec!(500)), 0.40);
    }
}
