//! Multi-signal correlation per pool account.
//!
//! Each pool keeps a short rolling history of distinct signal kinds.
//! One isolated signal (a lone LP add with no corroborating volume) is
//! noise; a second distinct kind inside the window confirms it.
//! Confirmation fires once per fresh window: after the transition,
//! further signals do not re-trigger until the window has fully decayed
//! and a fresh pair of distinct kinds reappears.

use crate::types::EventKind;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Unconfirmed,
    Confirmed,
}

/// Result of recording one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStatus {
    pub confirmation: Confirmation,
    /// True only on the unconfirmed→confirmed transition.
    pub newly_confirmed: bool,
    pub distinct_kinds: usize,
    pub entries: usize,
}

/// Rolling signal window for a single pool account.
///
/// Entries are kept ordered by observed (block) time, not arrival order,
/// and evicted lazily on the next access. Duplicate kinds within the
/// window add no confirmation value but are retained for inspection.
#[derive(Debug, Clone)]
pub struct SignalWindow {
    window: Duration,
    entries: Vec<(EventKind, DateTime<Utc>)>,
    confirmed_fired: bool,
}

impl SignalWindow {
    pub fn new(window_minutes: i64) -> Self {
        Self {
            window: Duration::minutes(window_minutes),
            entries: Vec::new(),
            confirmed_fired: false,
        }
    }

    /// Record a signal and return the window's confirmation status.
    pub fn record(&mut self, kind: EventKind, timestamp: DateTime<Utc>) -> WindowStatus {
        // Evict against the newest time seen so replayed history stays
        // deterministic regardless of wall clock.
        let newest = self
            .entries
            .iter()
            .map(|(_, ts)| *ts)
            .chain(std::iter::once(timestamp))
            .max()
            .unwrap_or(timestamp);
        let cutoff = newest - self.window;

        self.entries.retain(|(_, ts)| *ts > cutoff);

        // A fully decayed window starts a fresh confirmation cycle.
        if self.entries.is_empty() {
            self.confirmed_fired = false;
        }

        // Keep entries ordered by observed time.
        let position = self
            .entries
            .partition_point(|(_, ts)| *ts <= timestamp);
        self.entries.insert(position, (kind, timestamp));

        let distinct: HashSet<EventKind> = self.entries.iter().map(|(k, _)| *k).collect();
        let confirmed = distinct.len() >= 2;

        let newly_confirmed = confirmed && !self.confirmed_fired;
        if newly_confirmed {
            self.confirmed_fired = true;
        }

        WindowStatus {
            confirmation: if confirmed {
                Confirmation::Confirmed
            } else {
                Confirmation::Unconfirmed
            },
            newly_confirmed,
            distinct_kinds: distinct.len(),
            entries: self.entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Keyed tracker over all observed pools.
pub struct SignalWindowTracker {
    window_minutes: i64,
    windows: HashMap<String, SignalWindow>,
}

impl SignalWindowTracker {
    pub fn new(window_minutes: i64) -> Self {
        Self {
            window_minutes,
            windows: HashMap::new(),
        }
    }

    pub fn record(
        &mut self,
        pool_account: &str,
        kind: EventKind,
        timestamp: DateTime<Utc>,
    ) -> WindowStatus {
        let window_minutes = self.window_minutes;
        self.windows
            .entry(pool_account.to_string())
            .or_insert_with(|| SignalWindow::new(window_minutes))
            .record(kind, timestamp)
    }

    pub fn pool_count(&self) -> usize {
        self.windows.len()
    }
}
