//! Telegram delivery. Messages are intentionally neutral and non-urgent.

use crate::ingest::backoff::ExponentialBackoff;
use crate::notify::{Notifier, DISCLAIMER};
use crate::types::{Alert, EventKind};
use crate::util::format_pair_age;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: &str) -> Option<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .ok()?;

        Some(Self {
            client,
            base_url: "https://api.telegram.org".to_string(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
        })
    }

    async fn send_once(&self, text: &str) -> Result<(), String> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "chat_id": self.chat_id,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("Telegram status {}", response.status()));
        }

        Ok(())
    }
}

/// HTML alert body: kind, pair, magnitude, liquidity before/after, age,
/// priority, the filter outcome, and the fixed disclaimer.
pub fn format_alert(alert: &Alert) -> String {
    let type_name = match alert.kind {
        EventKind::LpAdd => "LP Added",
        EventKind::LpRemove => "LP Removed",
        EventKind::VolumeSpike => "Volume Spike",
    };

    let value_str = match alert.value_usd {
        Some(usd) => format!("{:+.0} SOL (~${:.0})", alert.value_sol, usd),
        None => format!("{:+.0} SOL", alert.value_sol),
    };

    let lp_before = alert.sol_before.unwrap_or(0.0);
    let lp_after = alert.sol_after.unwrap_or(lp_before + alert.value_sol);

    let early_stage = if alert.early_stage_passed {
        "✅ PASSED"
    } else {
        "❌ FAILED"
    };

    let quota_note = if alert.quota_exhausted {
        "\n<b>Note:</b> daily action quota exhausted"
    } else {
        ""
    };

    format!(
        "<b>🟡 Poolwatch Alert</b>\n\n\
         <b>Type:</b> {type_name}\n\
         <b>Pair:</b> {pair}\n\
         <b>Amount:</b> {value}\n\
         <b>Pair Age:</b> {age}\n\
         <b>Liquidity Before:</b> {before:.0} SOL\n\
         <b>Liquidity After:</b> {after:.0} SOL\n\
         <b>Priority:</b> {priority}\n\n\
         <b>Early-Stage Check:</b> {early_stage}{quota_note}\n\n\
         <i>Reminder:\n{disclaimer}</i>",
        type_name = type_name,
        pair = alert.pair.replace('/', " / "),
        value = value_str,
        age = format_pair_age(alert.pair_age_hours),
        before = lp_before,
        after = lp_after,
        priority = alert.priority,
        early_stage = early_stage,
        quota_note = quota_note,
        disclaimer = DISCLAIMER,
    )
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn dispatch(&self, alert: &Alert) -> bool {
        let text = format_alert(alert);
        let mut backoff = ExponentialBackoff::new(1_000, 10_000, 3);

        loop {
            match self.send_once(&text).await {
                Ok(()) => {
                    log::info!("✅ Telegram notification sent: {}", alert.pair);
                    return true;
                }
                Err(e) => {
                    log::warn!("⚠️ Telegram delivery failed: {}", e);
                    if backoff.sleep().await.is_err() {
                        log::error!("❌ Telegram delivery gave up: {}", alert.pair);
                        return false;
                    }
                }
            }
        }
    }
}
