//! Paper-mode host for the admission gate.
//!
//! Runs one scan loop per platform against an in-memory exchange. Each cycle
//! lists markets, invents model probabilities around the quoted price, and
//! pushes the candidates through analyse → size → tier → admit → place, then
//! settles every placed bet with a simulated outcome.
//!
//! Usage:  cargo run -- [cycles]

use edgeguard::clock::{Clock, SystemClock};
use edgeguard::config::Config;
use edgeguard::engine::TradeGate;
use edgeguard::exchange::{ExchangeClient, PaperExchange};
use edgeguard::models::market::{MarketSnapshot, Platform, Side};
use edgeguard::models::odds::Odds;
use edgeguard::models::opportunity::Opportunity;
use edgeguard::models::order::OrderRequest;
use edgeguard::models::position::BetResult;
use edgeguard::models::{to_f64, to_money};
use edgeguard::risk::correlation::event_key;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CYCLES: u32 = 5;
const CYCLE_PAUSE_MS: u64 = 1500;
const ANALYSIS_FAILURE_RATE: f64 = 0.05;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load_or_default();
    init_tracing(&config.telemetry.log_level);

    info!("================================================");
    info!("  EDGEGUARD paper host v{}", env!("CARGO_PKG_VERSION"));
    info!("================================================");

    let cycles = std::env::args()
        .nth(1)
        .and_then(|a| a.parse().ok())
        .unwrap_or(DEFAULT_CYCLES);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let starting = config.bankroll.starting_bankroll;
    let gate = Arc::new(TradeGate::new(config, clock.clone())?);

    let kalshi = Arc::new(PaperExchange::new(Platform::Kalshi, starting, clock.clone()));
    for (id, title, yes) in [
        ("KXHIGHNY-26JAN02-B40", "NYC high 40-41°F", dec!(0.31)),
        ("KXHIGHNY-26JAN02-B42", "NYC high 42-43°F", dec!(0.27)),
        ("KXLOWTLAX-26JAN02-B53.5", "LA low 53-54°F", dec!(0.44)),
        ("KXBTCD-26JAN02-T98000", "BTC above 98k", dec!(0.52)),
        ("KXFED-26MAR-4.25", "Fed holds at 4.25", dec!(0.63)),
    ] {
        kalshi.list_market(market(id, title, Platform::Kalshi, yes));
    }

    let coinbase = Arc::new(PaperExchange::new(Platform::Coinbase, starting, clock.clone()));
    for (id, yes) in [("BTC-USD", dec!(0.50)), ("ETH-USD", dec!(0.48)), ("SOL-USD", dec!(0.46))] {
        coinbase.list_market(market(id, id, Platform::Coinbase, yes));
    }

    let loops = [kalshi, coinbase].map(|exchange| {
        let gate = gate.clone();
        tokio::spawn(async move {
            let platform = exchange.platform();
            if let Err(e) = scan_loop(gate, exchange, cycles).await {
                error!("[{platform}] scan loop failed: {e:#}");
            }
        })
    });

    tokio::select! {
        _ = futures_util::future::join_all(loops) => {}
        _ = tokio::signal::ctrl_c() => warn!("Interrupted, stopping"),
    }

    gate.log_summary();
    let state = gate.bankroll_state();
    info!("Final state: {}", serde_json::to_string(&state)?);
    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn market(id: &str, title: &str, platform: Platform, yes: Decimal) -> MarketSnapshot {
    MarketSnapshot {
        id: id.to_string(),
        title: title.to_string(),
        platform,
        yes_price: yes,
        no_price: Decimal::ONE - yes + dec!(0.02),
        volume: dec!(25000),
        closes_at: None,
    }
}

struct PlacedBet {
    id: String,
    stake: Decimal,
    win_prob: f64,
    decimal_odds: f64,
}

async fn scan_loop(gate: Arc<TradeGate>, exchange: Arc<PaperExchange>, cycles: u32) -> anyhow::Result<()> {
    let platform = exchange.platform();
    let mut rng = StdRng::from_entropy();

    for cycle in 1..=cycles {
        gate.reset_cycle_tracking();
        let markets = gate.markets(exchange.as_ref()).await?;
        info!("[{platform}] cycle {cycle}/{cycles}: {} markets", markets.len());

        // Analysis phase: dedup, then the (simulated) model call
        let mut analyzed = Vec::new();
        for m in &markets {
            if !gate.should_analyze(&m.id).is_allowed() {
                continue;
            }
            let ok = !rng.gen_bool(ANALYSIS_FAILURE_RATE);
            gate.mark_analyzed(&m.id, ok);
            if ok {
                analyzed.push(opportunity(m, &mut rng));
            }
        }

        let tiered = gate.assign_tiers(gate.score(analyzed));
        let mut placed = Vec::new();

        for t in tiered.into_iter().filter(|t| t.tier.is_some()) {
            let opp = &t.opportunity;
            let amount = to_money(t.ev.recommended_stake);
            let quote = match gate.market_snapshot(exchange.as_ref(), &opp.id).await {
                Ok(q) => q,
                Err(e) => {
                    warn!("[{platform}] no quote for {}: {e}", opp.id);
                    continue;
                }
            };
            let price = quote.price_for(opp.side);
            if price <= Decimal::ZERO {
                continue;
            }

            let session = gate.begin_admission().await;
            if !session.should_admit(opp, amount, gate.bankroll()).is_allowed() {
                continue;
            }

            let order = OrderRequest {
                market_id: opp.id.clone(),
                platform,
                side: opp.side,
                size: (amount / price).round_dp(2),
                price,
            };
            match exchange.place_order(&order).await {
                Ok(fill) if fill.is_success() => {
                    if let Err(e) = session.record_admission(opp, amount) {
                        error!("[{platform}] bankroll out of sync for {}: {e}", opp.id);
                        continue;
                    }
                    info!(
                        "[{platform}] placed {} tier={:?} ${amount} edge={:.1}% score={:.0}",
                        opp.id, t.tier, t.ev.edge, t.quality_score
                    );
                    placed.push(PlacedBet {
                        id: opp.id.clone(),
                        stake: amount,
                        win_prob: opp.model_probability,
                        decimal_odds: t.ev.decimal_odds,
                    });
                }
                Ok(fill) => {
                    warn!("[{platform}] order {} not filled: {:?}", fill.order_id, fill.status);
                    session.abort_admission(opp, amount);
                }
                Err(e) => {
                    warn!("[{platform}] order for {} failed: {e}", opp.id);
                    session.abort_admission(opp, amount);
                }
            }
        }

        // Settlement
        for bet in placed {
            let won = rng.gen_bool(bet.win_prob.clamp(0.0, 1.0));
            let (result, profit) = if won {
                (BetResult::Win, to_money(to_f64(bet.stake) * (bet.decimal_odds - 1.0)))
            } else {
                (BetResult::Loss, Decimal::ZERO)
            };
            if won {
                exchange.credit(bet.stake + profit);
            }
            if let Err(e) = gate.record_outcome(&bet.id, result, profit).await {
                error!("[{platform}] grading {} failed: {e}", bet.id);
            }
        }

        tokio::time::sleep(std::time::Duration::from_millis(CYCLE_PAUSE_MS)).await;
    }
    Ok(())
}

fn opportunity(m: &MarketSnapshot, rng: &mut StdRng) -> Opportunity {
    let price = to_f64(m.yes_price);
    let model_probability = (price + rng.gen_range(-0.05..0.15)).clamp(0.01, 0.99);
    let symbol = match m.platform {
        Platform::Kalshi => event_key(&m.id),
        _ => m.id.clone(),
    };
    let side = if m.platform.is_prediction_market() { Side::Yes } else { Side::Buy };

    let mut opp = Opportunity::new(&m.id, symbol, m.platform, side, model_probability, Odds::Price(price))
        .with_confidence((model_probability + rng.gen_range(0.0..0.25)).min(1.0));
    if rng.gen_bool(0.2) {
        opp = opp.with_early_line(rng.gen_range(0.5..3.0));
    }
    opp
}
