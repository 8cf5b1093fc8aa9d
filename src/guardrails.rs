//! Behavioral guardrails: daily action quota and profile-switch cooldown.
//!
//! Advisory to the human operator. The quota never blocks ingestion,
//! filtering, or alert persistence; it only annotates decisions and
//! soft-caps notification volume. The one operation actually gated here
//! is the profile configuration change.

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use std::sync::Mutex;

/// A profile switch is accepted at most once per week.
pub const PROFILE_SWITCH_COOLDOWN_DAYS: i64 = 7;

#[derive(Debug, PartialEq)]
pub enum GuardrailError {
    /// Switch refused; carries the earliest allowed switch time.
    ProfileLocked { earliest: DateTime<Utc> },
}

impl std::fmt::Display for GuardrailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardrailError::ProfileLocked { earliest } => {
                write!(f, "Profile switch locked until {}", earliest.to_rfc3339())
            }
        }
    }
}

impl std::error::Error for GuardrailError {}

/// Point-in-time view consumed by the alert boundary for annotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardrailSnapshot {
    pub actions_today: u32,
    pub quota_exhausted: bool,
}

struct Inner {
    actions_today: u32,
    counted_day: NaiveDate,
    active_profile: String,
    last_switch: Option<DateTime<Utc>>,
}

/// Process-wide guardrail counters.
///
/// Explicitly owned and injected; passed by reference to the one
/// component (the alert boundary) that consults it. All read-modify-write
/// happens under a single lock so concurrent workers never lose updates.
pub struct GuardrailState {
    inner: Mutex<Inner>,
}

impl GuardrailState {
    pub fn new(active_profile: &str, last_switch: Option<DateTime<Utc>>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                actions_today: 0,
                counted_day: Local::now().date_naive(),
                active_profile: active_profile.to_string(),
                last_switch,
            }),
        }
    }

    fn roll_day(inner: &mut Inner, today: NaiveDate) {
        if today != inner.counted_day {
            inner.actions_today = 0;
            inner.counted_day = today;
        }
    }

    /// Record one explicit user-attributed action. Mere alert emission
    /// never calls this. Returns the updated count for the day.
    pub fn record_action(&self, now: DateTime<Local>) -> u32 {
        let mut inner = self.inner.lock().unwrap();
        Self::roll_day(&mut inner, now.date_naive());
        inner.actions_today += 1;
        inner.actions_today
    }

    /// Snapshot for annotation against the given quota.
    pub fn snapshot(&self, now: DateTime<Local>, max_actions_per_day: u32) -> GuardrailSnapshot {
        let mut inner = self.inner.lock().unwrap();
        Self::roll_day(&mut inner, now.date_naive());
        GuardrailSnapshot {
            actions_today: inner.actions_today,
            quota_exhausted: inner.actions_today >= max_actions_per_day,
        }
    }

    /// Gate a profile configuration change behind the weekly cooldown.
    pub fn request_profile_switch(
        &self,
        new_profile: &str,
        now: DateTime<Utc>,
    ) -> Result<(), GuardrailError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(last) = inner.last_switch {
            let earliest = last + Duration::days(PROFILE_SWITCH_COOLDOWN_DAYS);
            if now < earliest {
                return Err(GuardrailError::ProfileLocked { earliest });
            }
        }

        log::info!(
            "🔁 Profile switch: {} -> {}",
            inner.active_profile,
            new_profile
        );
        inner.active_profile = new_profile.to_string();
        inner.last_switch = Some(now);
        Ok(())
    }

    pub fn active_profile(&self) -> String {
        self.inner.lock().unwrap().active_profile.clone()
    }

    pub fn last_switch(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().unwrap().last_switch
    }
}
