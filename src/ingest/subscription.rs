//! WebSocket `logsSubscribe` feed for the tracked AMM program.
//!
//! Maintains one long-lived subscription with automatic reconnection.
//! A dropped transport is the one recoverable-but-loud condition: logged
//! at error level and retried forever with exponential backoff, since
//! there is no other source of truth.

use crate::types::RawNotification;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::{json, Value};
use solana_signature::Signature;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Raydium AMM V4 program ID.
pub const RAYDIUM_AMM_V4: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";

const MAX_RECONNECT_DELAY_SECS: u64 = 60;
const RATE_LIMIT_CODE: i64 = -32003;

/// One parsed frame from the subscription socket.
#[derive(Debug, Clone, PartialEq)]
pub enum WsEvent {
    SubscriptionConfirmed(u64),
    RateLimited(String),
    RpcError { code: i64, message: String },
    Notification(LogsNotification),
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogsNotification {
    pub signature: String,
    pub slot: u64,
    pub failed: bool,
    pub logs: Vec<String>,
}

/// Subscription payload for the program's logs at confirmed commitment.
pub fn logs_subscribe_request(program: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "logsSubscribe",
        "params": [
            {"mentions": [program]},
            {"commitment": "confirmed"}
        ]
    })
}

/// Classify one text frame from the socket.
pub fn parse_ws_message(text: &str) -> WsEvent {
    let data: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return WsEvent::Ignored,
    };

    if let Some(error) = data.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        if code == RATE_LIMIT_CODE {
            return WsEvent::RateLimited(message);
        }
        return WsEvent::RpcError { code, message };
    }

    // Subscription confirmations carry an integer result.
    if let Some(id) = data.get("result").and_then(Value::as_u64) {
        return WsEvent::SubscriptionConfirmed(id);
    }

    let result = match data.pointer("/params/result") {
        Some(r) => r,
        None => return WsEvent::Ignored,
    };

    let slot = result
        .pointer("/context/slot")
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let value = result.get("value").unwrap_or(result);

    let signature = match value.get("signature").and_then(Value::as_str) {
        Some(s) => s.to_string(),
        None => return WsEvent::Ignored,
    };

    let failed = value.get("err").map(|e| !e.is_null()).unwrap_or(false);

    let logs = value
        .get("logs")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    WsEvent::Notification(LogsNotification {
        signature,
        slot,
        failed,
        logs,
    })
}

/// Cheap keyword scan guarding the expensive transaction lookup.
///
/// Pool operations (initialize/deposit/withdraw) and swaps all matter
/// downstream; only notifications mentioning none of them are skipped.
pub fn is_relevant_operation(logs: &[String]) -> bool {
    if logs.is_empty() {
        return false;
    }

    let joined = logs.join(" ").to_lowercase();

    const INDICATORS: [&str; 8] = [
        "initialize",
        "init_pc_amount",
        "deposit",
        "withdraw",
        "add liquidity",
        "create pool",
        "liquidity",
        "swap",
    ];

    INDICATORS.iter().any(|word| joined.contains(word))
}

pub struct LogsSubscription {
    ws_url: String,
    program: String,
}

impl LogsSubscription {
    pub fn new(ws_url: &str, program: &str) -> Self {
        Self {
            ws_url: ws_url.to_string(),
            program: program.to_string(),
        }
    }

    /// Connect, subscribe, and forward admissible notifications until
    /// shutdown. Reconnects forever on transport loss.
    pub async fn run(&self, tx: mpsc::Sender<RawNotification>, mut shutdown: watch::Receiver<bool>) {
        let mut delay_secs = 1u64;
        let mut message_count = 0u64;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match connect_async(self.ws_url.as_str()).await {
                Ok((mut ws, _)) => {
                    log::info!("✅ Connected to subscription feed");
                    delay_secs = 1;

                    let request = logs_subscribe_request(&self.program);
                    if let Err(e) = ws.send(Message::Text(request.to_string())).await {
                        log::error!("❌ Failed to send subscription request: {}", e);
                    } else {
                        loop {
                            tokio::select! {
                                _ = shutdown.changed() => {
                                    if *shutdown.borrow() {
                                        let _ = ws.close(None).await;
                                        return;
                                    }
                                }
                                frame = ws.next() => {
                                    match frame {
                                        Some(Ok(Message::Text(text))) => {
                                            message_count += 1;
                                            if message_count % 1000 == 0 {
                                                log::debug!("📊 {} feed messages processed", message_count);
                                            }
                                            match parse_ws_message(&text) {
                                                WsEvent::SubscriptionConfirmed(id) => {
                                                    log::info!("✓ Subscription confirmed: ID {}", id);
                                                }
                                                WsEvent::RateLimited(msg) => {
                                                    log::error!("⚠️ Provider rate limit: {}", msg);
                                                    delay_secs = MAX_RECONNECT_DELAY_SECS;
                                                    break;
                                                }
                                                WsEvent::RpcError { code, message } => {
                                                    log::error!("⚠️ RPC error ({}): {}", code, message);
                                                }
                                                WsEvent::Notification(note) => {
                                                    if let Some(raw) = admit_notification(note) {
                                                        if tx.send(raw).await.is_err() {
                                                            log::warn!("⚠️ Notification channel closed, stopping feed");
                                                            return;
                                                        }
                                                    }
                                                }
                                                WsEvent::Ignored => {}
                                            }
                                        }
                                        Some(Ok(Message::Ping(payload))) => {
                                            let _ = ws.send(Message::Pong(payload)).await;
                                        }
                                        Some(Ok(_)) => {}
                                        Some(Err(e)) => {
                                            log::error!("❌ Socket error: {}", e);
                                            break;
                                        }
                                        None => {
                                            log::error!("❌ Subscription stream closed by peer");
                                            break;
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    log::error!("❌ Connection failed: {}", e);
                }
            }

            if *shutdown.borrow() {
                break;
            }

            let jitter = rand::thread_rng().gen_range(0..=delay_secs.max(4) / 4);
            log::error!("🔄 Reconnecting in {}s", delay_secs + jitter);
            sleep(Duration::from_secs(delay_secs + jitter)).await;
            delay_secs = std::cmp::min(delay_secs * 2, MAX_RECONNECT_DELAY_SECS);
        }
    }
}

/// Apply the upstream-side checks: failed transactions carry no economic
/// meaning, keyword-less logs are unrelated, and unparseable signatures
/// cannot be looked up.
fn admit_notification(note: LogsNotification) -> Option<RawNotification> {
    if note.failed {
        return None;
    }

    if !is_relevant_operation(&note.logs) {
        return None;
    }

    let signature = match Signature::from_str(&note.signature) {
        Ok(sig) => sig,
        Err(_) => {
            log::debug!("Unparseable signature in notification: {}", note.signature);
            return None;
        }
    };

    Some(RawNotification {
        signature,
        slot: note.slot,
        received_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIG: &str = "5h4s9VGhnuoKzDZTWcjdF2oWr3BF8gSRVNyrsSEfA9oKFM2UhLYLSMkDrBYPJb1opUjmnMbGEhnqXqXLRNgynyBJ";

    fn notification_json(err: &str, logs: &str) -> String {
        format!(
            r#"{{
                "jsonrpc": "2.0",
                "method": "logsNotification",
                "params": {{
                    "result": {{
                        "context": {{"slot": 294748321}},
                        "value": {{
                            "signature": "{SIG}",
                            "err": {err},
                            "logs": {logs}
                        }}
                    }},
                    "subscription": 1
                }}
            }}"#
        )
    }

    #[test]
    fn test_parse_notification() {
        let text = notification_json("null", r#"["Program log: Instruction: Deposit"]"#);
        let event = parse_ws_message(&text);

        match event {
            WsEvent::Notification(note) => {
                assert_eq!(note.signature, SIG);
                assert_eq!(note.slot, 294748321);
                assert!(!note.failed);
                assert_eq!(note.logs.len(), 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_failed_transaction_notification() {
        let text = notification_json(
            r#"{"InstructionError": [2, {"Custom": 30}]}"#,
            r#"["Program log: Instruction: Deposit"]"#,
        );
        match parse_ws_message(&text) {
            WsEvent::Notification(note) => assert!(note.failed),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_subscription_confirmation_and_errors() {
        assert_eq!(
            parse_ws_message(r#"{"jsonrpc":"2.0","result":42,"id":1}"#),
            WsEvent::SubscriptionConfirmed(42)
        );

        assert_eq!(
            parse_ws_message(r#"{"error":{"code":-32003,"message":"rate limited"}}"#),
            WsEvent::RateLimited("rate limited".to_string())
        );

        assert_eq!(
            parse_ws_message(r#"{"error":{"code":-32602,"message":"bad params"}}"#),
            WsEvent::RpcError {
                code: -32602,
                message: "bad params".to_string()
            }
        );

        assert_eq!(parse_ws_message("not json"), WsEvent::Ignored);
    }

    #[test]
    fn test_prefilter_keeps_pool_operations_and_swaps() {
        let deposit = vec!["Program log: Instruction: Deposit".to_string()];
        let withdraw = vec!["Program log: Instruction: Withdraw".to_string()];
        let swap = vec!["Program log: Instruction: Swap".to_string()];
        let transfer = vec!["Program log: Instruction: Transfer".to_string()];

        assert!(is_relevant_operation(&deposit));
        assert!(is_relevant_operation(&withdraw));
        assert!(is_relevant_operation(&swap));
        assert!(!is_relevant_operation(&transfer));
        assert!(!is_relevant_operation(&[]));
    }

    #[test]
    fn test_admit_notification_checks() {
        let good = LogsNotification {
            signature: SIG.to_string(),
            slot: 1,
            failed: false,
            logs: vec!["Program log: Instruction: Deposit".to_string()],
        };
        assert!(admit_notification(good.clone()).is_some());

        let failed = LogsNotification { failed: true, ..good.clone() };
        assert!(admit_notification(failed).is_none());

        let bad_sig = LogsNotification {
            signature: "zz!!".to_string(),
            ..good.clone()
        };
        assert!(admit_notification(bad_sig).is_none());

        let irrelevant = LogsNotification {
            logs: vec!["Program log: Instruction: Transfer".to_string()],
            ..good
        };
        assert!(admit_notification(irrelevant).is_none());
    }
}
