use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Arbitrage,
    EarlyLine,
    Elite,
    Premium,
    Free,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Arbitrage => "arbitrage",
            Tier::EarlyLine => "early_line",
            Tier::Elite => "elite",
            Tier::Premium => "premium",
            Tier::Free => "free",
        };
        f.write_str(s)
    }
}

/// One rung of the tier ladder.
///
/// The confidence band `[min_confidence, max_confidence)` only selects the
/// entry rung; overflow from a full rung may land in a lower rung whatever
/// its band. The top of a band is inclusive when it is 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSpec {
    pub tier: Tier,
    pub min_confidence: f64,
    pub max_confidence: f64,
    /// `None` = uncapped.
    pub capacity: Option<usize>,
    pub requires_guaranteed_profit: bool,
    pub requires_early_line: bool,
}

impl TierSpec {
    pub fn band(tier: Tier, min_confidence: f64, max_confidence: f64, capacity: Option<usize>) -> Self {
        Self {
            tier,
            min_confidence,
            max_confidence,
            capacity,
            requires_guaranteed_profit: false,
            requires_early_line: false,
        }
    }

    pub fn guaranteed(tier: Tier) -> Self {
        Self {
            requires_guaranteed_profit: true,
            ..Self::band(tier, 0.0, 1.0, None)
        }
    }

    pub fn early_line(tier: Tier, capacity: Option<usize>) -> Self {
        Self {
            requires_early_line: true,
            ..Self::band(tier, 0.0, 1.0, capacity)
        }
    }

    pub fn in_band(&self, confidence: f64) -> bool {
        confidence >= self.min_confidence
            && (confidence < self.max_confidence
                || (self.max_confidence >= 1.0 && confidence <= self.max_confidence))
    }
}
