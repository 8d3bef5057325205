use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::models::tier::{Tier, TierSpec};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub cache: CacheConfig,
    pub ledger: LedgerConfig,
    pub spend: SpendConfig,
    pub dedup: DedupConfig,
    pub concentration: ConcentrationConfig,
    pub sizing: SizingConfig,
    pub tiers: TierConfig,
    pub bankroll: BankrollConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub default_ttl_secs: u64,    // Market list / snapshot TTL (e.g. 30)
    pub live_timeout_ms: u64,     // Bound on live ticker fetches (e.g. 5000)
    pub max_stale_serves: u32,    // Consecutive failures answered from stale data
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub recent_window_secs: u64,  // Same symbol/platform re-entry window (e.g. 3600)
    pub symbol_cooldown_secs: u64, // Per-symbol re-entry cooldown (e.g. 300)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendConfig {
    pub window_secs: u64,         // Sliding window length (e.g. 300)
    pub max_spend: Decimal,       // Dollars allowed per window (e.g. 10)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    pub analysis_cooldown_secs: u64, // Per-identifier re-analysis cooldown (e.g. 3600)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcentrationConfig {
    pub small_bankroll_threshold: f64, // Below this, the looser cap applies (e.g. 500)
    pub small_bankroll_max: f64,       // e.g. 0.60
    pub large_bankroll_max: f64,       // e.g. 0.40
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    pub min_edge_pct: f64,        // Minimum edge in percentage points (e.g. 3.0)
    pub kelly_multiplier: f64,    // Fractional Kelly (0.5 = half-Kelly)
    pub max_stake_pct: f64,       // Stake cap as % of bankroll (e.g. 5.0)
    pub max_stake_abs: f64,       // Absolute stake ceiling in dollars, 0 disables (e.g. 25)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    pub ladder: Vec<TierSpec>,    // Highest priority first
    pub recency_window_hours: i64, // Events starting within this get the bonus
    pub recency_bonus: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankrollConfig {
    pub starting_bankroll: Decimal,
    pub drawdown_low_pct: f64,
    pub drawdown_medium_pct: f64,
    pub drawdown_high_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub alert_on_drawdown: bool,
    pub latency_samples: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 30,
            live_timeout_ms: 5_000,
            max_stale_serves: 1,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            recent_window_secs: 60 * 60,
            symbol_cooldown_secs: 5 * 60,
        }
    }
}

impl Default for SpendConfig {
    fn default() -> Self {
        Self {
            window_secs: 5 * 60,
            max_spend: dec!(10),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            analysis_cooldown_secs: 60 * 60,
        }
    }
}

impl Default for ConcentrationConfig {
    fn default() -> Self {
        Self {
            small_bankroll_threshold: 500.0,
            small_bankroll_max: 0.60,
            large_bankroll_max: 0.40,
        }
    }
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            min_edge_pct: 3.0,
            kelly_multiplier: 0.5,
            max_stake_pct: 5.0,
            max_stake_abs: 25.0,
        }
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            ladder: vec![
                TierSpec::guaranteed(Tier::Arbitrage),
                TierSpec::early_line(Tier::EarlyLine, Some(3)),
                TierSpec::band(Tier::Elite, 0.85, 1.0, Some(5)),
                TierSpec::band(Tier::Premium, 0.65, 0.85, Some(3)),
                TierSpec::band(Tier::Free, 0.0, 0.65, Some(2)),
            ],
            recency_window_hours: 24,
            recency_bonus: 10.0,
        }
    }
}

impl Default for BankrollConfig {
    fn default() -> Self {
        Self {
            starting_bankroll: dec!(1000),
            drawdown_low_pct: 5.0,
            drawdown_medium_pct: 10.0,
            drawdown_high_pct: 20.0,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            telegram_bot_token: None,
            telegram_chat_id: None,
            discord_webhook_url: None,
            alert_on_drawdown: true,
            latency_samples: 1000,
        }
    }
}

impl LedgerConfig {
    pub fn recent_window(&self) -> Duration {
        bounded_secs(self.recent_window_secs)
    }

    pub fn symbol_cooldown(&self) -> Duration {
        bounded_secs(self.symbol_cooldown_secs)
    }
}

impl SpendConfig {
    pub fn window(&self) -> Duration {
        bounded_secs(self.window_secs)
    }
}

impl DedupConfig {
    pub fn analysis_cooldown(&self) -> Duration {
        bounded_secs(self.analysis_cooldown_secs)
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        bounded_secs(self.default_ttl_secs)
    }

    pub fn live_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.live_timeout_ms)
    }
}

/// Upper bound on every configured window, cooldown and TTL (one year).
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Seconds to a window, clamped so unvalidated configs cannot overflow.
fn bounded_secs(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_DURATION_SECS) as i64)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables (.env file) with defaults.
    ///
    /// Optional env vars:
    ///   STARTING_BANKROLL: initial bankroll in dollars (default: 1000)
    ///   SPEND_CAP, SPEND_WINDOW_SECS: spend-rate limiter (default: $10 / 300s)
    ///   MIN_EDGE_PCT, MAX_STAKE_PCT, MAX_STAKE_ABS: stake sizing
    ///   ANALYSIS_COOLDOWN_SECS, SYMBOL_COOLDOWN_SECS, RECENT_WINDOW_SECS
    ///   TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID, DISCORD_WEBHOOK_URL: drawdown alerts
    ///   RUST_LOG: log level (default: info)
    ///   LOG_FORMAT=json: structured log output (read by the host binary)
    pub fn load_or_default() -> Self {
        let _ = dotenv::dotenv();

        let mut config = Self::default();

        if let Some(v) = env_parse::<Decimal>("STARTING_BANKROLL") {
            config.bankroll.starting_bankroll = v;
        }
        if let Some(v) = env_parse::<Decimal>("SPEND_CAP") {
            config.spend.max_spend = v;
        }
        if let Some(v) = env_parse("SPEND_WINDOW_SECS") {
            config.spend.window_secs = v;
        }
        if let Some(v) = env_parse("MIN_EDGE_PCT") {
            config.sizing.min_edge_pct = v;
        }
        if let Some(v) = env_parse("MAX_STAKE_PCT") {
            config.sizing.max_stake_pct = v;
        }
        if let Some(v) = env_parse("MAX_STAKE_ABS") {
            config.sizing.max_stake_abs = v;
        }
        if let Some(v) = env_parse("ANALYSIS_COOLDOWN_SECS") {
            config.dedup.analysis_cooldown_secs = v;
        }
        if let Some(v) = env_parse("SYMBOL_COOLDOWN_SECS") {
            config.ledger.symbol_cooldown_secs = v;
        }
        if let Some(v) = env_parse("RECENT_WINDOW_SECS") {
            config.ledger.recent_window_secs = v;
        }

        config.telemetry.telegram_bot_token = env_nonempty("TELEGRAM_BOT_TOKEN");
        config.telemetry.telegram_chat_id = env_nonempty("TELEGRAM_CHAT_ID");
        config.telemetry.discord_webhook_url = env_nonempty("DISCORD_WEBHOOK_URL");

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.telemetry.log_level = level;
        }

        config
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.spend.max_spend > Decimal::ZERO,
            "spend.max_spend must be positive"
        );
        anyhow::ensure!(self.spend.window_secs > 0, "spend.window_secs must be positive");
        for (name, secs) in [
            ("cache.default_ttl_secs", self.cache.default_ttl_secs),
            ("cache.live_timeout_ms", self.cache.live_timeout_ms / 1000),
            ("ledger.recent_window_secs", self.ledger.recent_window_secs),
            ("ledger.symbol_cooldown_secs", self.ledger.symbol_cooldown_secs),
            ("spend.window_secs", self.spend.window_secs),
            ("dedup.analysis_cooldown_secs", self.dedup.analysis_cooldown_secs),
        ] {
            anyhow::ensure!(
                secs <= MAX_DURATION_SECS,
                "{name} must be at most {MAX_DURATION_SECS}s"
            );
        }
        anyhow::ensure!(
            (0..=MAX_DURATION_SECS as i64 / 3600).contains(&self.tiers.recency_window_hours),
            "tiers.recency_window_hours must be in [0, {}]",
            MAX_DURATION_SECS / 3600
        );
        anyhow::ensure!(
            self.sizing.max_stake_pct > 0.0 && self.sizing.max_stake_pct <= 100.0,
            "sizing.max_stake_pct must be in (0, 100]"
        );
        anyhow::ensure!(
            self.sizing.kelly_multiplier > 0.0 && self.sizing.kelly_multiplier <= 1.0,
            "sizing.kelly_multiplier must be in (0, 1]"
        );
        anyhow::ensure!(self.sizing.max_stake_abs >= 0.0, "sizing.max_stake_abs must be >= 0");
        let c = &self.concentration;
        anyhow::ensure!(
            c.small_bankroll_max > 0.0 && c.small_bankroll_max <= 1.0
                && c.large_bankroll_max > 0.0 && c.large_bankroll_max <= 1.0,
            "concentration caps must be in (0, 1]"
        );
        let b = &self.bankroll;
        anyhow::ensure!(
            b.starting_bankroll > Decimal::ZERO,
            "bankroll.starting_bankroll must be positive"
        );
        anyhow::ensure!(
            b.drawdown_low_pct < b.drawdown_medium_pct
                && b.drawdown_medium_pct < b.drawdown_high_pct,
            "drawdown thresholds must be strictly increasing"
        );
        anyhow::ensure!(!self.tiers.ladder.is_empty(), "tier ladder must not be empty");
        for spec in &self.tiers.ladder {
            anyhow::ensure!(
                spec.min_confidence <= spec.max_confidence,
                "tier {:?} has min_confidence above max_confidence",
                spec.tier
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.spend.max_spend, dec!(10));
        assert_eq!(config.dedup.analysis_cooldown(), Duration::minutes(60));
        assert_eq!(config.ledger.recent_window(), Duration::minutes(60));
        assert_eq!(config.ledger.symbol_cooldown(), Duration::minutes(5));
    }

    #[test]
    fn test_rejects_inverted_drawdown_thresholds() {
        let mut config = Config::default();
        config.bankroll.drawdown_medium_pct = 30.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_durations() {
        let mut config = Config::default();
        config.dedup.analysis_cooldown_secs = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.spend.window_secs = MAX_DURATION_SECS + 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tiers.recency_window_hours = -1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ledger.recent_window_secs = MAX_DURATION_SECS;
        assert!(config.validate().is_ok());

        // Accessors clamp rather than overflow
        let dedup = DedupConfig {
            analysis_cooldown_secs: u64::MAX,
        };
        assert_eq!(
            dedup.analysis_cooldown(),
            Duration::seconds(MAX_DURATION_SECS as i64)
        );
    }

    #[test]
    fn test_rejects_zero_spend_cap() {
        let mut config = Config::default();
        config.spend.max_spend = Decimal::ZERO;
        assert!(config.validate().is_err());
    }
}
