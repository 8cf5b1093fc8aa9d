//! Alert boundary: the single point where a decision is finalized.
//!
//! Every event reaching this boundary produces exactly one immutable
//! Alert record, persisted regardless of the verdict. Only accepted
//! events with notification quota to spare are forwarded to the notifier,
//! and that forwarding is fire-and-forget: the notifier owns its own
//! retry and can never stall the pipeline.

use crate::filters::enrich::Enrichment;
use crate::guardrails::GuardrailState;
use crate::notify::Notifier;
use crate::store::EventStore;
use crate::types::{Alert, LiquidityEvent, Priority, Verdict};
use chrono::{DateTime, Local};
use std::sync::Arc;

type LocalClock = Box<dyn Fn() -> DateTime<Local> + Send + Sync>;

pub struct AlertBoundary {
    store: Arc<dyn EventStore>,
    notifier: Arc<dyn Notifier>,
    guardrails: Arc<GuardrailState>,
    max_actions_per_day: u32,
    now_fn: LocalClock,
}

impl AlertBoundary {
    pub fn new(
        store: Arc<dyn EventStore>,
        notifier: Arc<dyn Notifier>,
        guardrails: Arc<GuardrailState>,
        max_actions_per_day: u32,
    ) -> Self {
        Self::with_clock(
            store,
            notifier,
            guardrails,
            max_actions_per_day,
            Box::new(Local::now),
        )
    }

    /// Deterministic clock injection for tests.
    pub fn with_clock(
        store: Arc<dyn EventStore>,
        notifier: Arc<dyn Notifier>,
        guardrails: Arc<GuardrailState>,
        max_actions_per_day: u32,
        now_fn: LocalClock,
    ) -> Self {
        Self {
            store,
            notifier,
            guardrails,
            max_actions_per_day,
            now_fn,
        }
    }

    /// Finalize one verdict into an Alert: persist always, dispatch only
    /// when accepted and the notification soft cap has room.
    pub async fn decide(
        &self,
        event: &LiquidityEvent,
        enrichment: &Enrichment,
        verdict: &Verdict,
    ) -> Alert {
        let snapshot = self
            .guardrails
            .snapshot((self.now_fn)(), self.max_actions_per_day);

        let accepted = verdict.is_accepted();
        let dispatched = accepted && !snapshot.quota_exhausted;

        let priority = match verdict {
            Verdict::Accepted { priority } => *priority,
            _ => Priority::from_pair_age(enrichment.pair_age_hours),
        };

        let alert = Alert {
            kind: event.kind,
            pair: event.pair_string(),
            token_mint: event.token_mint.clone(),
            pool_account: event.pool_account.clone(),
            signature: event.signature.clone(),
            value_sol: event.sol_delta,
            value_usd: enrichment
                .sol_price_usd
                .map(|price| event.magnitude_sol() * price),
            sol_before: Some(event.sol_before),
            sol_after: Some(event.sol_before + event.sol_delta),
            market_cap: enrichment.market_cap_usd,
            pair_age_hours: enrichment.pair_age_hours,
            is_new_pool: event.is_new_pool,
            early_stage_passed: accepted,
            dispatched,
            priority,
            quota_exhausted: snapshot.quota_exhausted,
            triggered_at: event.observed_at,
        };

        if let Err(e) = self.store.write_alert(&alert).await {
            log::error!("❌ Failed to persist alert {}: {}", alert.signature, e);
        }

        match verdict {
            Verdict::Accepted { .. } => {
                log::info!(
                    "🚨 {} {} {:+.1} SOL accepted (priority: {}{})",
                    alert.kind,
                    alert.pair,
                    alert.value_sol,
                    alert.priority,
                    if snapshot.quota_exhausted {
                        ", quota exhausted"
                    } else {
                        ""
                    }
                );
            }
            Verdict::PendingConfirmation => {
                log::info!(
                    "⏸ {} {} held pending a corroborating signal",
                    alert.kind,
                    alert.pair
                );
            }
            Verdict::Rejected { rule, reason } => {
                log::info!("🚫 {} {} rejected [{}]: {}", alert.kind, alert.pair, rule, reason);
            }
        }

        if dispatched {
            let notifier = self.notifier.clone();
            let outbound = alert.clone();
            tokio::spawn(async move {
                notifier.dispatch(&outbound).await;
            });
        }

        alert
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use crate::store::MemoryStore;
    use crate::types::EventKind;
    use chrono::{TimeZone, Utc};

    fn event() -> LiquidityEvent {
        LiquidityEvent {
            kind: EventKind::LpAdd,
            pool_account: "pool".to_string(),
            token_mint: "mint".to_string(),
            base_symbol: Some("TEST".to_string()),
            sol_delta: 450.0,
            token_delta: 1_000_000.0,
            sol_before: 3.0,
            signature: "sig".to_string(),
            observed_at: Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap(),
            is_new_pool: true,
            spike: None,
        }
    }

    fn enrichment() -> Enrichment {
        Enrichment {
            base_symbol: Some("TEST".to_string()),
            base_name: None,
            market_cap_usd: Some(500_000.0),
            pair_age_hours: Some(0.3),
            liquidity_usd: None,
            sol_price_usd: Some(150.0),
        }
    }

    fn boundary(store: Arc<MemoryStore>, guardrails: Arc<GuardrailState>) -> AlertBoundary {
        AlertBoundary::with_clock(
            store,
            Arc::new(LogNotifier),
            guardrails,
            2,
            Box::new(|| Local.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()),
        )
    }

    #[tokio::test]
    async fn test_accepted_alert_persisted_and_dispatched() {
        let store = Arc::new(MemoryStore::new());
        let guardrails = Arc::new(GuardrailState::new("balanced", None));
        let boundary = boundary(store.clone(), guardrails);

        let verdict = Verdict::Accepted {
            priority: Priority::High,
        };
        let alert = boundary.decide(&event(), &enrichment(), &verdict).await;

        assert!(alert.early_stage_passed);
        assert!(alert.dispatched);
        assert_eq!(alert.priority, Priority::High);
        assert_eq!(alert.pair, "TEST/SOL");
        assert_eq!(alert.value_usd, Some(67_500.0));
        assert_eq!(alert.sol_after, Some(453.0));
        assert_eq!(alert.triggered_at, event().observed_at);

        assert_eq!(store.alerts_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_alert_persisted_not_dispatched() {
        let store = Arc::new(MemoryStore::new());
        let guardrails = Arc::new(GuardrailState::new("balanced", None));
        let boundary = boundary(store.clone(), guardrails);

        let verdict = Verdict::Rejected {
            rule: "pair_age",
            reason: "too old".to_string(),
        };
        let alert = boundary.decide(&event(), &enrichment(), &verdict).await;

        assert!(!alert.early_stage_passed);
        assert!(!alert.dispatched);
        // Persisted regardless of the verdict.
        assert_eq!(store.alerts_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_quota_exhaustion_annotates_and_soft_caps() {
        let store = Arc::new(MemoryStore::new());
        let guardrails = Arc::new(GuardrailState::new("balanced", None));

        // Two explicit user actions exhaust the quota of 2.
        let now = Local.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        guardrails.record_action(now);
        guardrails.record_action(now);

        let boundary = boundary(store.clone(), guardrails);
        let verdict = Verdict::Accepted {
            priority: Priority::High,
        };
        let alert = boundary.decide(&event(), &enrichment(), &verdict).await;

        // Accepted and persisted, but the soft cap held dispatch back.
        assert!(alert.early_stage_passed);
        assert!(alert.quota_exhausted);
        assert!(!alert.dispatched);
        assert_eq!(store.alerts_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_pending_alert_records_decision() {
        let store = Arc::new(MemoryStore::new());
        let guardrails = Arc::new(GuardrailState::new("balanced", None));
        let boundary = boundary(store.clone(), guardrails);

        let alert = boundary
            .decide(&event(), &enrichment(), &Verdict::PendingConfirmation)
            .await;

        assert!(!alert.early_stage_passed);
        assert!(!alert.dispatched);
        // Priority still derived from age for the audit record.
        assert_eq!(alert.priority, Priority::High);
    }
}
