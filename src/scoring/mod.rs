pub mod tiers;

pub use tiers::{ScoredOpportunity, TierScorer, TieredOpportunity};
