//! Core data model shared across the pipeline stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_signature::Signature;

/// Wrapped SOL mint address.
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// A `{signature, slot}` notification from the subscription feed.
///
/// Ephemeral: consumed exactly once by the dedup gate.
#[derive(Debug, Clone)]
pub struct RawNotification {
    pub signature: Signature,
    pub slot: u64,
    pub received_at: DateTime<Utc>,
}

/// Classified liquidity event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    LpAdd,
    LpRemove,
    VolumeSpike,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::LpAdd => "lp_add",
            EventKind::LpRemove => "lp_remove",
            EventKind::VolumeSpike => "volume_spike",
        }
    }
}

impl From<EventKind> for &'static str {
    fn from(kind: EventKind) -> &'static str {
        kind.as_str()
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Volume-spike magnitude details.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpikeInfo {
    /// Trade volume as a multiple of the rolling baseline.
    pub multiplier: f64,
    /// Rolling baseline at the time of the trade, in SOL.
    pub baseline_sol: f64,
}

/// The canonical derived fact: one economically meaningful pool event.
///
/// Created once by the balance delta analyzer (or the volume tracker for
/// spikes), immutable afterwards, and persisted regardless of the filter
/// outcome so rejected events remain auditable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityEvent {
    pub kind: EventKind,
    /// Pool (AMM) account address.
    pub pool_account: String,
    /// Mint of the non-SOL side of the pair.
    pub token_mint: String,
    /// Base symbol, resolved lazily by enrichment. None until resolved.
    pub base_symbol: Option<String>,
    /// Signed SOL vault change, in SOL.
    pub sol_delta: f64,
    /// Signed token vault change, in UI units.
    pub token_delta: f64,
    /// SOL vault balance immediately before the event (baseline liquidity).
    pub sol_before: f64,
    /// Source transaction signature.
    pub signature: String,
    /// Block time of the source transaction.
    pub observed_at: DateTime<Utc>,
    /// True when the instruction created the pool (initialize/initialize2).
    pub is_new_pool: bool,
    /// Present for volume_spike events only.
    pub spike: Option<SpikeInfo>,
}

impl LiquidityEvent {
    /// TOKEN/SOL pair label. Falls back to a shortened mint until the
    /// symbol is resolved.
    pub fn pair_string(&self) -> String {
        match &self.base_symbol {
            Some(symbol) => format!("{}/SOL", symbol.to_uppercase()),
            None => {
                let short: String = self.token_mint.chars().take(8).collect();
                format!("{}…/SOL", short)
            }
        }
    }

    /// Magnitude in SOL for thresholding and display.
    pub fn magnitude_sol(&self) -> f64 {
        self.sol_delta.abs()
    }
}

/// Priority tier derived from pair age at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// High under 30 minutes, medium up to 2 hours, low beyond that.
    /// Unknown age never justifies urgency.
    pub fn from_pair_age(pair_age_hours: Option<f64>) -> Self {
        match pair_age_hours {
            Some(age) if age < 0.5 => Priority::High,
            Some(age) if age < 2.0 => Priority::Medium,
            _ => Priority::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the early-stage filter engine for one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Failed a hard-reject rule or a profile threshold. Log-only.
    Rejected { rule: &'static str, reason: String },
    /// Passed thresholds but the pool lacks a corroborating second signal.
    /// The event is held and may surface when the window confirms.
    PendingConfirmation,
    /// Passed every stage.
    Accepted { priority: Priority },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }
}

/// The persisted decision record. Created exactly once per event reaching
/// the alert boundary, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: EventKind,
    pub pair: String,
    pub token_mint: String,
    pub pool_account: String,
    pub signature: String,
    pub value_sol: f64,
    pub value_usd: Option<f64>,
    pub sol_before: Option<f64>,
    pub sol_after: Option<f64>,
    pub market_cap: Option<f64>,
    pub pair_age_hours: Option<f64>,
    pub is_new_pool: bool,
    pub early_stage_passed: bool,
    pub dispatched: bool,
    pub priority: Priority,
    /// Annotation only: the daily action quota was exhausted when the
    /// decision was made. Never blocks persistence.
    pub quota_exhausted: bool,
    pub triggered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_tiers_from_age() {
        assert_eq!(Priority::from_pair_age(Some(0.3)), Priority::High);
        assert_eq!(Priority::from_pair_age(Some(0.5)), Priority::Medium);
        assert_eq!(Priority::from_pair_age(Some(1.9)), Priority::Medium);
        assert_eq!(Priority::from_pair_age(Some(2.0)), Priority::Low);
        assert_eq!(Priority::from_pair_age(Some(23.0)), Priority::Low);
        assert_eq!(Priority::from_pair_age(None), Priority::Low);
    }

    #[test]
    fn test_pair_string_falls_back_to_mint() {
        let event = LiquidityEvent {
            kind: EventKind::LpAdd,
            pool_account: "pool".to_string(),
            token_mint: "MintAddress1111111111111111111111111111111".to_string(),
            base_symbol: None,
            sol_delta: 10.0,
            token_delta: 1000.0,
            sol_before: 0.0,
            signature: "sig".to_string(),
            observed_at: Utc::now(),
            is_new_pool: true,
            spike: None,
        };

        assert_eq!(event.pair_string(), "MintAddr…/SOL");

        let mut named = event.clone();
        named.base_symbol = Some("wif".to_string());
        assert_eq!(named.pair_string(), "WIF/SOL");
    }

    #[test]
    fn test_event_kind_round_trip() {
        let json = serde_json::to_string(&EventKind::VolumeSpike).unwrap();
        assert_eq!(json, "\"volume_spike\"");
        assert_eq!(EventKind::LpAdd.as_str(), "lp_add");
    }
}
