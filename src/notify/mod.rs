//! Notifier collaborators. Delivery semantics and formatting live here,
//! fully outside the pipeline: the alert boundary fires a dispatch and
//! moves on.

pub mod telegram;

use crate::types::Alert;
use async_trait::async_trait;

pub use telegram::TelegramNotifier;

/// Fixed disclaimer attached to every dispatched alert.
pub const DISCLAIMER: &str = "This is NOT a trade signal. Check risk/reward and rules first.";

/// Dispatch seam. Implementations own their retry/backoff; a failed
/// delivery never propagates into the pipeline.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns true when the alert was delivered.
    async fn dispatch(&self, alert: &Alert) -> bool;
}

/// Fallback notifier when no delivery channel is configured: alerts are
/// logged and nothing else happens.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn dispatch(&self, alert: &Alert) -> bool {
        log::info!(
            "🔔 ALERT {} {} {:+.1} SOL (priority: {})",
            alert.kind,
            alert.pair,
            alert.value_sol,
            alert.priority
        );
        true
    }
}
