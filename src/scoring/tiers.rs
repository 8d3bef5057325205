use crate::clock::Clock;
use crate::config::{TierConfig, MAX_DURATION_SECS};
use crate::models::opportunity::Opportunity;
use crate::models::tier::{Tier, TierSpec};
use crate::risk::sizing::EvResult;
use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

const MAX_RECENCY_HOURS: i64 = (MAX_DURATION_SECS / 3600) as i64;

/// An opportunity that has been through EV sizing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredOpportunity {
    pub opportunity: Opportunity,
    pub ev: EvResult,
}

impl ScoredOpportunity {
    pub fn new(opportunity: Opportunity, ev: EvResult) -> Self {
        Self { opportunity, ev }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TieredOpportunity {
    pub opportunity: Opportunity,
    pub ev: EvResult,
    /// `None` when every eligible rung was full.
    pub tier: Option<Tier>,
    pub quality_score: f64,
}

/// Ranks scored opportunities into the configured tier ladder.
///
/// Pure with respect to its input: the only outside read is the clock, for
/// the recency bonus.
pub struct TierScorer {
    config: TierConfig,
    clock: Arc<dyn Clock>,
}

impl TierScorer {
    pub fn new(config: TierConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// confidence% * 10 + edge * 5 + arb profit * 100 + line movement * 5,
    /// plus the recency bonus for events starting soon.
    pub fn quality_score(&self, scored: &ScoredOpportunity) -> f64 {
        let opp = &scored.opportunity;
        let mut score = opp.confidence() * 100.0 * 10.0 + finite(scored.ev.edge) * 5.0;
        score += opp.arbitrage_profit.map(finite).unwrap_or(0.0) * 100.0;
        score += opp.line_movement.map(finite).unwrap_or(0.0) * 5.0;

        if let Some(at) = opp.event_time {
            let until = at - self.clock.now();
            let window = Duration::hours(self.config.recency_window_hours.clamp(0, MAX_RECENCY_HOURS));
            if until >= Duration::zero() && until <= window {
                score += self.config.recency_bonus;
            }
        }
        score
    }

    /// Assign each opportunity to at most one tier.
    ///
    /// Output is sorted by quality score, highest first, ties by id. An
    /// opportunity enters at the first rung whose flags and band it meets;
    /// if that rung is full it falls to the next lower rung whose flags it
    /// meets, ignoring bands.
    pub fn assign(&self, scored: Vec<ScoredOpportunity>) -> Vec<TieredOpportunity> {
        let mut ranked: Vec<(f64, ScoredOpportunity)> = scored
            .into_iter()
            .map(|s| (self.quality_score(&s), s))
            .collect();
        ranked.sort_by(|(sa, a), (sb, b)| {
            sb.total_cmp(sa)
                .then_with(|| a.opportunity.id.cmp(&b.opportunity.id))
        });

        let ladder = &self.config.ladder;
        let mut filled = vec![0usize; ladder.len()];

        ranked
            .into_iter()
            .map(|(quality_score, s)| {
                let tier = self.place(&s.opportunity, &mut filled);
                debug!(
                    "Tier: {} score={quality_score:.1} -> {}",
                    s.opportunity.id,
                    tier.map(|t| t.to_string()).unwrap_or_else(|| "unassigned".into())
                );
                TieredOpportunity {
                    opportunity: s.opportunity,
                    ev: s.ev,
                    tier,
                    quality_score,
                }
            })
            .collect()
    }

    fn place(&self, opp: &Opportunity, filled: &mut [usize]) -> Option<Tier> {
        let ladder = &self.config.ladder;
        let confidence = opp.confidence();
        let entry = ladder
            .iter()
            .position(|spec| flags_met(spec, opp) && spec.in_band(confidence))?;

        for (idx, spec) in ladder.iter().enumerate().skip(entry) {
            if !flags_met(spec, opp) {
                continue;
            }
            if spec.capacity.map_or(true, |cap| filled[idx] < cap) {
                filled[idx] += 1;
                return Some(spec.tier);
            }
        }
        None
    }
}

fn flags_met(spec: &TierSpec, opp: &Opportunity) -> bool {
    (!spec.requires_guaranteed_profit || opp.is_guaranteed_profit())
        && (!spec.requires_early_line || opp.has_favorable_line())
}

fn finite(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}
