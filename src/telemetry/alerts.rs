use crate::config::TelemetryConfig;
use crate::risk::bankroll::DrawdownSeverity;
use anyhow::Result;
use parking_lot::Mutex;
use tracing::{error, info, warn};

/// Sends drawdown alerts via Telegram or Discord webhooks.
///
/// Delivery is best-effort: failures are logged, never returned. Unconfigured
/// channels are skipped, so with no webhooks set alerts only reach the log.
pub struct AlertManager {
    config: TelemetryConfig,
    http: reqwest::Client,
    last_severity: Mutex<Option<DrawdownSeverity>>,
}

pub fn drawdown_message(severity: DrawdownSeverity, pct: f64) -> String {
    let icon = match severity {
        DrawdownSeverity::Low => "🟡",
        DrawdownSeverity::Medium => "🟠",
        DrawdownSeverity::High => "🔴",
    };
    format!("{icon} Drawdown {severity}: {pct:.1}% below peak")
}

impl AlertManager {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            last_severity: Mutex::new(None),
        }
    }

    pub async fn send(&self, message: &str) {
        info!("ALERT: {message}");

        if let Err(e) = self.send_telegram(message).await {
            error!("Telegram alert failed: {e}");
        }

        if let Err(e) = self.send_discord(message).await {
            error!("Discord alert failed: {e}");
        }
    }

    async fn send_telegram(&self, message: &str) -> Result<()> {
        let (Some(token), Some(chat_id)) = (&self.config.telegram_bot_token, &self.config.telegram_chat_id) else {
            return Ok(());
        };

        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": format!("EDGEGUARD: {message}"),
        });

        self.http.post(&url).json(&body).send().await?.error_for_status()?;
        Ok(())
    }

    async fn send_discord(&self, message: &str) -> Result<()> {
        let Some(webhook_url) = &self.config.discord_webhook_url else {
            return Ok(());
        };

        let body = serde_json::json!({
            "content": format!("**EDGEGUARD**: {message}")
        });

        self.http.post(webhook_url).json(&body).send().await?.error_for_status()?;
        Ok(())
    }

    /// Alert when drawdown severity rises. Repeats of the same or a lower
    /// severity are suppressed; recovery below every threshold re-arms.
    /// Returns whether an alert went out.
    pub async fn on_drawdown(&self, severity: Option<DrawdownSeverity>, pct: f64) -> bool {
        if !self.config.alert_on_drawdown {
            return false;
        }
        let escalated = {
            let mut last = self.last_severity.lock();
            let escalated = match (severity, *last) {
                (Some(now), Some(prev)) => now > prev,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if escalated || severity.is_none() {
                *last = severity;
            }
            escalated
        };

        match severity {
            Some(s) if escalated => {
                self.send(&drawdown_message(s, pct)).await;
                true
            }
            Some(s) => {
                warn!("Drawdown still {s} ({pct:.1}%), alert suppressed");
                false
            }
            None => false,
        }
    }
}
