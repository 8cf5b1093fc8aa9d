//! Production runtime: subscription feed + full pipeline.

use chrono::Utc;
use poolwatch::alerts::AlertBoundary;
use poolwatch::config::{Config, FilterProfile, FilterTemplate};
use poolwatch::filters::enrich::EnrichmentClient;
use poolwatch::guardrails::GuardrailState;
use poolwatch::ingest::{DedupGate, LogsSubscription, TransactionResolver, RAYDIUM_AMM_V4};
use poolwatch::notify::{LogNotifier, Notifier, TelegramNotifier};
use poolwatch::pipeline::{Pipeline, StageContext};
use poolwatch::store::{ActiveProfileRecord, SqliteStore};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

fn exit_with(message: String) -> ! {
    log::error!("❌ {}", message);
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => exit_with(e.to_string()),
    };

    let template = match FilterTemplate::load(&config.config_dir, &config.filter_template) {
        Ok(template) => template,
        Err(e) => exit_with(e.to_string()),
    };

    let store = match SqliteStore::new(&config.db_path) {
        Ok(store) => store,
        Err(e) => exit_with(e.to_string()),
    };

    // The persisted active-profile record wins over the env default; a
    // differing env request is a switch attempt gated by the enforcer.
    let active = store.load_active_profile().unwrap_or(None);
    let (mut profile_name, last_switch) = match active {
        Some(record) => (record.name, record.switched_at),
        None => (config.profile.clone(), None),
    };

    let guardrails = Arc::new(GuardrailState::new(&profile_name, last_switch));

    if config.profile != profile_name {
        match guardrails.request_profile_switch(&config.profile, Utc::now()) {
            Ok(()) => {
                profile_name = config.profile.clone();
                let record = ActiveProfileRecord {
                    name: profile_name.clone(),
                    switched_at: Some(Utc::now()),
                };
                if let Err(e) = store.save_active_profile(&record) {
                    log::error!("❌ Failed to persist profile switch: {}", e);
                }
            }
            Err(e) => {
                log::warn!("⚠️ {} (staying on '{}')", e, profile_name);
            }
        }
    } else if last_switch.is_none() {
        let record = ActiveProfileRecord {
            name: profile_name.clone(),
            switched_at: None,
        };
        let _ = store.save_active_profile(&record);
    }

    let profile = match FilterProfile::load(&config.config_dir, &profile_name) {
        Ok(profile) => profile,
        Err(e) => exit_with(e.to_string()),
    };

    let notifier: Arc<dyn Notifier> = match (&config.telegram_bot_token, &config.telegram_chat_id) {
        (Some(token), Some(chat_id)) => match TelegramNotifier::new(token, chat_id) {
            Some(telegram) => {
                log::info!("✅ Telegram notifications enabled");
                Arc::new(telegram)
            }
            None => Arc::new(LogNotifier),
        },
        _ => {
            log::warn!("⚠️ Telegram not configured, alerts will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let enricher = match EnrichmentClient::new() {
        Ok(client) => Arc::new(client),
        Err(e) => exit_with(e.to_string()),
    };

    let resolver = match TransactionResolver::new(&config.rpc_url) {
        Ok(resolver) => resolver,
        Err(e) => exit_with(e.to_string()),
    };

    let store = Arc::new(store);
    let boundary = AlertBoundary::new(
        store.clone(),
        notifier,
        guardrails.clone(),
        profile.max_actions_per_day,
    );

    log::info!("🚀 Starting poolwatch");
    log::info!("📊 Configuration:");
    log::info!("   Filter template: {}", config.filter_template);
    log::info!("   Profile: {} ({})", profile.name, profile.description);
    log::info!("   LP add min: {:.0} SOL (~${:.0})", profile.lp_add_min_sol, profile.lp_add_min_usd);
    log::info!("   LP remove min: {:.0}%", profile.lp_remove_min_pct);
    log::info!("   Volume spike: {:.1}x", profile.volume_spike_multiplier);
    log::info!("   Max pair age: {:.0}h", template.max_pair_age_hours);
    log::info!("   Hard-reject baseline: {:.0} SOL", template.hard_reject.baseline_liquidity_sol);
    log::info!("   Signal window: {} min", template.signal_window_minutes);

    let ctx = StageContext {
        template,
        profile,
        enricher,
        store,
        boundary,
    };

    let pipeline = Pipeline::new(
        ctx,
        DedupGate::new(config.dedup_capacity),
        resolver,
        config.resolver_workers,
    );

    let (notify_tx, notify_rx) = mpsc::channel(config.channel_buffer);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let subscription = LogsSubscription::new(&config.ws_url, RAYDIUM_AMM_V4);
    let feed_shutdown = shutdown_rx.clone();
    let feed = tokio::spawn(async move {
        subscription.run(notify_tx, feed_shutdown).await;
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("🛑 Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    pipeline.run(notify_rx, shutdown_rx).await;
    let _ = feed.await;

    log::info!("👋 poolwatch stopped");
}
