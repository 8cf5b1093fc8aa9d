//! Pipeline orchestration.
//!
//! One ingestion loop consumes the notification channel. Each admitted
//! signature is handed to a semaphore-bounded worker for the network
//! stages (resolution, enrichment), so a slow lookup never stalls
//! dequeuing. Derived events are then routed through a keyed dispatch
//! table to one lightweight sequential task per pool account, which
//! applies window updates, filtering and the alert boundary in
//! block-time order. Different pools proceed fully in parallel.

use crate::alerts::AlertBoundary;
use crate::config::{FilterProfile, FilterTemplate};
use crate::decode::deltas::TradeObservation;
use crate::decode::{analyze_balances, decode_instruction, Analysis, VolumeWindow};
use crate::filters::early_stage::evaluate;
use crate::filters::enrich::{Enricher, Enrichment};
use crate::ingest::{DedupGate, ResolveError, TransactionResolver};
use crate::signals::{Confirmation, SignalWindow};
use crate::store::EventStore;
use crate::types::{LiquidityEvent, RawNotification, Verdict};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

/// Held events per pool awaiting a corroborating signal.
const MAX_PENDING_PER_POOL: usize = 32;

/// Rolling volume baseline span, in minutes.
const VOLUME_WINDOW_MINUTES: i64 = 60;

/// Everything the post-resolution stages share.
pub struct StageContext {
    pub template: FilterTemplate,
    pub profile: FilterProfile,
    pub enricher: Arc<dyn Enricher>,
    pub store: Arc<dyn EventStore>,
    pub boundary: AlertBoundary,
}

/// Work routed to a pool's sequential task.
pub enum PoolMsg {
    Liquidity {
        event: LiquidityEvent,
        enrichment: Enrichment,
    },
    Trade(TradeObservation),
}

/// Per-pool sequential state: the signal window, the volume baseline,
/// and events held at the multi-signal gate.
pub struct PoolProcessor {
    pool: String,
    window: SignalWindow,
    volume: VolumeWindow,
    pending: Vec<(LiquidityEvent, Enrichment)>,
    ctx: Arc<StageContext>,
}

impl PoolProcessor {
    pub fn new(pool: &str, ctx: Arc<StageContext>) -> Self {
        Self {
            pool: pool.to_string(),
            window: SignalWindow::new(ctx.template.signal_window_minutes),
            volume: VolumeWindow::new(VOLUME_WINDOW_MINUTES),
            pending: Vec::new(),
            ctx,
        }
    }

    pub async fn handle(&mut self, msg: PoolMsg) {
        match msg {
            PoolMsg::Liquidity { event, enrichment } => {
                self.process_event(event, enrichment).await;
            }
            PoolMsg::Trade(observation) => {
                if let Some(spike) = self.volume.observe(&observation) {
                    let enrichment = self.ctx.enricher.enrich(&spike).await;
                    self.process_event(spike, enrichment).await;
                }
            }
        }
    }

    async fn process_event(&mut self, mut event: LiquidityEvent, enrichment: Enrichment) {
        // Resolve the pair symbol lazily, before the event is persisted.
        if event.base_symbol.is_none() {
            event.base_symbol = enrichment.base_symbol.clone();
        }

        // The raw event is persisted regardless of the downstream verdict;
        // this is what makes auto-ignored events auditable.
        if let Err(e) = self.ctx.store.write_event(&event).await {
            log::error!("❌ Failed to persist event {}: {}", event.signature, e);
        }

        let status = self.window.record(event.kind, event.observed_at);
        let verdict = evaluate(
            &event,
            &enrichment,
            &self.ctx.template,
            &self.ctx.profile,
            status.confirmation,
        );

        if verdict == Verdict::PendingConfirmation {
            if self.pending.len() < MAX_PENDING_PER_POOL {
                self.pending.push((event.clone(), enrichment.clone()));
            } else {
                log::warn!("⚠️ Pending buffer full for {}, event not held", self.pool);
            }
        }

        self.ctx.boundary.decide(&event, &enrichment, &verdict).await;

        // The confirming signal surfaces everything held in this window.
        if status.newly_confirmed && !self.pending.is_empty() {
            let held: Vec<_> = self.pending.drain(..).collect();
            log::info!(
                "📣 Window confirmed for {}, surfacing {} held event(s)",
                self.pool,
                held.len()
            );

            for (held_event, held_enrichment) in held {
                let verdict = evaluate(
                    &held_event,
                    &held_enrichment,
                    &self.ctx.template,
                    &self.ctx.profile,
                    Confirmation::Confirmed,
                );
                self.ctx
                    .boundary
                    .decide(&held_event, &held_enrichment, &verdict)
                    .await;
            }
        }

        // Held events decay with the window.
        let cutoff =
            event.observed_at - chrono::Duration::minutes(self.ctx.template.signal_window_minutes);
        self.pending.retain(|(held, _)| held.observed_at > cutoff);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

pub struct Pipeline {
    ctx: Arc<StageContext>,
    dedup: Arc<DedupGate>,
    resolver: Arc<TransactionResolver>,
    workers: usize,
}

impl Pipeline {
    pub fn new(
        ctx: StageContext,
        dedup: DedupGate,
        resolver: TransactionResolver,
        workers: usize,
    ) -> Self {
        Self {
            ctx: Arc::new(ctx),
            dedup: Arc::new(dedup),
            resolver: Arc::new(resolver),
            workers: workers.max(1),
        }
    }

    /// Consume notifications until the channel closes or shutdown fires.
    /// On shutdown, in-flight resolutions drain up to a short timeout;
    /// unresolved ones are abandoned without partial state.
    pub async fn run(
        &self,
        mut rx: mpsc::Receiver<RawNotification>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let (route_tx, route_rx) = mpsc::channel::<(String, PoolMsg)>(1_024);
        let router = tokio::spawn(route_pool_messages(route_rx, self.ctx.clone()));

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut workers = JoinSet::new();

        log::info!("🚀 Pipeline started ({} resolver workers)", self.workers);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                maybe = rx.recv() => {
                    let raw = match maybe {
                        Some(raw) => raw,
                        None => break,
                    };

                    let signature = raw.signature.to_string();
                    if !self.dedup.admit(&signature) {
                        continue;
                    }

                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };

                    workers.spawn(resolve_and_analyze(
                        self.ctx.clone(),
                        self.resolver.clone(),
                        raw,
                        signature,
                        route_tx.clone(),
                        permit,
                    ));

                    // Reap finished workers without blocking the loop.
                    while workers.try_join_next().is_some() {}
                }
            }
        }

        log::info!("🛑 Draining in-flight resolutions...");
        drop(route_tx);

        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            while workers.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            log::warn!("⚠️ Drain timeout, abandoning unresolved lookups");
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }

        if tokio::time::timeout(Duration::from_secs(5), router).await.is_err() {
            log::warn!("⚠️ Pool router did not drain in time");
        }

        log::info!("✅ Pipeline stopped");
    }
}

fn short_sig(signature: &str) -> &str {
    &signature[..signature.len().min(16)]
}

/// Network stages for one admitted notification: resolve, decode,
/// analyze, enrich, then hand off to the pool router.
async fn resolve_and_analyze(
    ctx: Arc<StageContext>,
    resolver: Arc<TransactionResolver>,
    raw: RawNotification,
    signature: String,
    route_tx: mpsc::Sender<(String, PoolMsg)>,
    _permit: OwnedSemaphorePermit,
) {
    let tx = match resolver.resolve(&signature).await {
        Ok(tx) => tx,
        Err(ResolveError::Malformed(msg)) => {
            log::debug!("Skipping malformed transaction {}: {}", short_sig(&signature), msg);
            return;
        }
        Err(e) => {
            log::warn!("⚠️ Dropping {} after retries: {}", short_sig(&signature), e);
            return;
        }
    };

    // Failed transactions carry no economic meaning.
    if !tx.success {
        return;
    }

    let decoded = decode_instruction(&tx);
    let analysis = match analyze_balances(&tx, &decoded, raw.received_at) {
        Some(analysis) => analysis,
        None => return,
    };

    match analysis {
        Analysis::Liquidity(event) => {
            log::info!(
                "💧 {} {} {:+.2} SOL ({})",
                event.kind,
                event.pool_account,
                event.sol_delta,
                short_sig(&signature)
            );
            let enrichment = ctx.enricher.enrich(&event).await;
            let pool = event.pool_account.clone();
            let _ = route_tx.send((pool, PoolMsg::Liquidity { event, enrichment })).await;
        }
        Analysis::Trade(observation) => {
            let pool = observation.pool_account.clone();
            let _ = route_tx.send((pool, PoolMsg::Trade(observation))).await;
        }
    }
}

/// Keyed dispatch: one sequential task per pool account. Window mutations
/// for a pool apply in order while different pools run in parallel.
async fn route_pool_messages(
    mut rx: mpsc::Receiver<(String, PoolMsg)>,
    ctx: Arc<StageContext>,
) {
    let mut senders: HashMap<String, mpsc::Sender<PoolMsg>> = HashMap::new();
    let mut actors = JoinSet::new();

    while let Some((pool, msg)) = rx.recv().await {
        let sender = senders.entry(pool.clone()).or_insert_with(|| {
            let (tx, mut actor_rx) = mpsc::channel::<PoolMsg>(64);
            let mut processor = PoolProcessor::new(&pool, ctx.clone());
            actors.spawn(async move {
                while let Some(msg) = actor_rx.recv().await {
                    processor.handle(msg).await;
                }
            });
            tx
        });

        if sender.send(msg).await.is_err() {
            log::warn!("⚠️ Pool task for {} is gone", pool);
        }
    }

    // Channel closed: drop senders so the actors drain and finish.
    drop(senders);
    while actors.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::enrich::Enrichment;
    use crate::guardrails::GuardrailState;
    use crate::notify::LogNotifier;
    use crate::store::MemoryStore;
    use crate::types::{EventKind, SpikeInfo};
    use async_trait::async_trait;
    use chrono::{DateTime, Local, TimeZone, Utc};

    struct FixedEnricher(Enrichment);

    #[async_trait]
    impl Enricher for FixedEnricher {
        async fn enrich(&self, _event: &LiquidityEvent) -> Enrichment {
            self.0.clone()
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

    fn profile() -> FilterProfile {
        FilterProfile {
            name: "test".to_string(),
            description: String::new(),
            lp_add_min_sol: 300.0,
            lp_add_min_usd: 10_000.0,
            lp_remove_min_pct: 50.0,
            volume_spike_multiplier: 3.0,
            max_actions_per_day: 10,
        }
    }

    fn context(store: Arc<MemoryStore>) -> Arc<StageContext> {
        let guardrails = Arc::new(GuardrailState::new("test", None));
        let boundary = AlertBoundary::with_clock(
            store.clone(),
            Arc::new(LogNotifier),
            guardrails,
            10,
            Box::new(|| Local.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()),
        );

        Arc::new(StageContext {
            template: FilterTemplate::default(),
            profile: profile(),
            enricher: Arc::new(FixedEnricher(enrichment())),
            store,
            boundary,
        })
    }

    fn ts(offset_mins: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap() + chrono::Duration::minutes(offset_mins)
    }

    fn lp_add(signature: &str, offset_mins: i64) -> LiquidityEvent {
        LiquidityEvent {
            kind: EventKind::LpAdd,
            pool_account: "pool_1".to_string(),
            token_mint: "mint_1".to_string(),
            base_symbol: None,
            sol_delta: 450.0,
            token_delta: 1_000_000.0,
            sol_before: 3.0,
            signature: signature.to_string(),
            observed_at: ts(offset_mins),
            is_new_pool: false,
            spike: None,
        }
    }

    fn spike(signature: &str, offset_mins: i64) -> LiquidityEvent {
        LiquidityEvent {
            kind: EventKind::VolumeSpike,
            pool_account: "pool_1".to_string(),
            token_mint: "mint_1".to_string(),
            base_symbol: None,
            sol_delta: 80.0,
            token_delta: 0.0,
            sol_before: 10.0,
            signature: signature.to_string(),
            observed_at: ts(offset_mins),
            is_new_pool: false,
            spike: Some(SpikeInfo {
                multiplier: 5.0,
                baseline_sol: 16.0,
            }),
        }
    }

    #[tokio::test]
    async fn test_lone_lp_add_held_then_surfaced_by_second_signal() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store.clone());
        let mut processor = PoolProcessor::new("pool_1", ctx);

        // A lone addition passes thresholds but lacks corroboration.
        processor
            .handle(PoolMsg::Liquidity {
                event: lp_add("sig_add", 0),
                enrichment: enrichment(),
            })
            .await;

        let alerts = store.alerts_snapshot();
        assert_eq!(alerts.len(), 1);
        assert!(!alerts[0].early_stage_passed);
        assert_eq!(processor.pending_len(), 1);

        // A volume spike 10 minutes later confirms the window: the spike
        // is accepted and the held addition surfaces as a new alert.
        processor
            .handle(PoolMsg::Liquidity {
                event: spike("sig_spike", 10),
                enrichment: enrichment(),
            })
            .await;

        let alerts = store.alerts_snapshot();
        assert_eq!(alerts.len(), 3);

        let spike_alert = alerts.iter().find(|a| a.signature == "sig_spike").unwrap();
        assert!(spike_alert.early_stage_passed);
        assert!(spike_alert.dispatched);

        let surfaced: Vec<_> = alerts.iter().filter(|a| a.signature == "sig_add").collect();
        assert_eq!(surfaced.len(), 2);
        assert!(!surfaced[0].early_stage_passed);
        assert!(surfaced[1].early_stage_passed);

        assert_eq!(processor.pending_len(), 0);

        // Both raw events were persisted exactly once.
        assert_eq!(store.events_snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_pair_symbol_resolved_before_persist() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store.clone());
        let mut processor = PoolProcessor::new("pool_1", ctx);

        processor
            .handle(PoolMsg::Liquidity {
                event: lp_add("sig_add", 0),
                enrichment: enrichment(),
            })
            .await;

        let events = store.events_snapshot();
        assert_eq!(events[0].base_symbol.as_deref(), Some("TEST"));
        assert_eq!(store.alerts_snapshot()[0].pair, "TEST/SOL");
    }

    #[tokio::test]
    async fn test_trade_path_derives_spike_through_volume_window() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store.clone());
        let mut processor = PoolProcessor::new("pool_1", ctx);

        // Build a ~1 SOL baseline; none of these derive events.
        for i in 0..10 {
            processor
                .handle(PoolMsg::Trade(TradeObservation {
                    pool_account: "pool_1".to_string(),
                    token_mint: "mint_1".to_string(),
                    volume_sol: 1.0,
                    sol_before: 10.0,
                    signature: format!("trade_{}", i),
                    observed_at: ts(i),
                }))
                .await;
        }
        assert!(store.events_snapshot().is_empty());

        // A 30 SOL trade against that baseline derives a spike event.
        processor
            .handle(PoolMsg::Trade(TradeObservation {
                pool_account: "pool_1".to_string(),
                token_mint: "mint_1".to_string(),
                volume_sol: 30.0,
                sol_before: 10.0,
                signature: "trade_big".to_string(),
                observed_at: ts(11),
            }))
            .await;

        let events = store.events_snapshot();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::VolumeSpike);
        assert!(events[0].spike.unwrap().multiplier > 3.0);

        // Lone spike: recorded but held at the multi-signal gate.
        let alerts = store.alerts_snapshot();
        assert_eq!(alerts.len(), 1);
        assert!(!alerts[0].early_stage_passed);
    }

    #[tokio::test]
    async fn test_missing_enrichment_degrades_gracefully() {
        // No symbol, no market cap, no age, no price: the event still
        // flows, filtered on whatever fields exist.
        let store = Arc::new(MemoryStore::new());
        let guardrails = Arc::new(GuardrailState::new("test", None));
        let boundary = AlertBoundary::with_clock(
            store.clone(),
            Arc::new(LogNotifier),
            guardrails,
            10,
            Box::new(|| Local.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()),
        );
        let ctx = Arc::new(StageContext {
            template: FilterTemplate::default(),
            profile: profile(),
            enricher: Arc::new(crate::filters::enrich::NullEnricher),
            store: store.clone(),
            boundary,
        });
        let mut processor = PoolProcessor::new("pool_1", ctx);

        processor
            .handle(PoolMsg::Liquidity {
                event: lp_add("sig_bare", 0),
                enrichment: Enrichment::empty(),
            })
            .await;

        let events = store.events_snapshot();
        assert_eq!(events.len(), 1);
        // No symbol resolved: the pair label falls back to the mint.
        assert!(events[0].base_symbol.is_none());

        let alerts = store.alerts_snapshot();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].pair.starts_with("mint_1"));
        assert_eq!(alerts[0].value_usd, None);
        assert_eq!(alerts[0].market_cap, None);
    }

    #[tokio::test]
    async fn test_pending_events_decay_with_window() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store.clone());
        let mut processor = PoolProcessor::new("pool_1", ctx);

        processor
            .handle(PoolMsg::Liquidity {
                event: lp_add("sig_old", 0),
                enrichment: enrichment(),
            })
            .await;
        assert_eq!(processor.pending_len(), 1);

        // 40 minutes later the window has fully decayed: the late spike
        // does not surface the stale addition.
        processor
            .handle(PoolMsg::Liquidity {
                event: spike("sig_late", 40),
                enrichment: enrichment(),
            })
            .await;

        assert_eq!(processor.pending_len(), 1); // the late spike itself is now held
        let surfaced: Vec<_> = store
            .alerts_snapshot()
            .into_iter()
            .filter(|a| a.signature == "sig_old" && a.early_stage_passed)
            .collect();
        assert!(surfaced.is_empty());
    }
}
