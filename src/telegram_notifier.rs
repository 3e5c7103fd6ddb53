// src/telegram_notifier.rs
use log::{error, info, warn};
use reqwest::Client;
use serde_json::json;

use crate::config::MonitorConfig;
use crate::detector::{ExecutionCandidate, ScanContext};
use crate::errors::MonitorError;
use crate::types::{ContractKey, OptionSide};

pub struct TelegramNotifier {
    client: Client,
    bot_token: Option<String>,
    chat_id: Option<String>,
    enabled: bool,
    dry_run: bool,
}

impl TelegramNotifier {
    pub fn new(cfg: &MonitorConfig, dry_run: bool) -> Self {
        let bot_token = cfg.telegram_bot_token.clone();
        let chat_id = cfg.telegram_chat_id.clone();
        let enabled = bot_token.is_some() && chat_id.is_some();

        if dry_run {
            info!("📱 Telegram notifier in dry-run mode - alerts rendered, not sent");
        } else if enabled {
            info!("📱 Telegram notifier initialized");
        } else {
            warn!("📱 Telegram notifier disabled - missing TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID");
        }

        Self {
            client: Client::new(),
            bot_token,
            chat_id,
            enabled,
            dry_run,
        }
    }

    async fn send_message(&self, message: &str) -> Result<(), MonitorError> {
        if self.dry_run {
            info!("📱 [DRY_RUN] Would send:\n{}", message);
            return Ok(());
        }
        if !self.enabled {
            return Ok(());
        }

        let (Some(bot_token), Some(chat_id)) = (&self.bot_token, &self.chat_id) else {
            return Ok(());
        };

        let url = format!("https://api.telegram.org/bot{}/sendMessage", bot_token);
        let payload = json!({
            "chat_id": chat_id,
            "text": message,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true
        });

        let response = self.client.post(&url).json(&payload).send().await?;

        if response.status().is_success() {
            info!("📱 Telegram notification sent");
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("📱 Failed to send Telegram notification: {}", error_text);
        }

        Ok(())
    }

    /// Once-per-day startup banner.
    pub async fn send_startup_message(&self, spot: f64, atm: u32) -> Result<(), MonitorError> {
        let message = format!(
            "*BANKNIFTY OI MONITOR STARTED*\n\
            Spot: `{:.0}`\nATM: `{}`",
            spot, atm
        );
        self.send_message(&message).await
    }

    pub async fn send_watch_alert(
        &self,
        key: &ContractKey,
        oi_pct: f64,
        spot: f64,
    ) -> Result<(), MonitorError> {
        let message = format!(
            "👀 *BANKNIFTY OI WATCH*\n\
            \n\
            🎯 *Contract:* `{} {}`\n\
            📈 *OI:* `+{:.0}%`\n\
            📍 *Spot:* `{:.0}`",
            key.strike, key.side, oi_pct, spot
        );
        self.send_message(&message).await
    }

    /// Execution alert: the buildup, the suggested opposite-side trade and
    /// the full score breakdown.
    pub async fn send_execution_alert(
        &self,
        candidate: &ExecutionCandidate,
        suggestion: (u32, OptionSide),
        ctx: &ScanContext,
    ) -> Result<(), MonitorError> {
        let direction = match candidate.key.side {
            OptionSide::Call => "Bearish (writer-side call buildup)",
            OptionSide::Put => "Bullish (writer-side put buildup)",
        };
        let factors = candidate
            .breakdown
            .items
            .iter()
            .map(|item| format!("  `{:+4}` {} - {}", item.points, item.factor, item.detail))
            .collect::<Vec<_>>()
            .join("\n");

        let message = format!(
            "🚀 *BANKNIFTY EXECUTION* 🚀\n\
            \n\
            🧭 *{}*\n\
            🎯 *Buildup:* `{} {}` (OI +{:.0}%)\n\
            💡 *Trade:* `Buy {} {}`\n\
            🏆 *Score:* `{}` ({})\n\
            \n\
            {}\n\
            \n\
            📍 *Spot:* `{:.0}` ({:+.2}% today)\n\
            📅 *Expiry:* `{}` ({} days)",
            direction,
            candidate.key.strike,
            candidate.key.side,
            candidate.oi_pct,
            suggestion.0,
            suggestion.1,
            candidate.breakdown.total,
            candidate.breakdown.tier,
            factors,
            ctx.spot,
            ctx.spot_move_pct,
            ctx.expiry_label,
            ctx.days_to_expiry
        );
        self.send_message(&message).await
    }

    /// Operator-visible notice for a scan that aborted on an error.
    pub async fn send_failure_notice(&self, error_text: &str) -> Result<(), MonitorError> {
        let message = format!(
            "⚠️ *BANKNIFTY OI MONITOR ERROR*\n\
            \n\
            `{}`\n\
            \n\
            Next scheduled scan will proceed normally.",
            error_text
        );
        self.send_message(&message).await
    }

    pub async fn send_test_message(&self) -> Result<(), MonitorError> {
        if !self.enabled && !self.dry_run {
            return Err(MonitorError::Feed(
                "Telegram notifier not enabled".to_string(),
            ));
        }
        let message = "🤖 *OI Monitor Test*\n\nTelegram notifications are working correctly!\n\n✅ Ready to send OI alerts.";
        self.send_message(message).await
    }
}
