//! Dedup gate: suppresses repeated processing of the same signature.
//!
//! Redundant subscriptions and reconnects deliver the same transaction
//! more than once. The gate admits a signature exactly once within a
//! bounded retention horizon; repeats are dropped silently. Pure state
//! lookup, cannot fail.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

pub struct DedupGate {
    inner: Mutex<Inner>,
    capacity: usize,
}

struct Inner {
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl DedupGate {
    /// `capacity` bounds retention to the last N admitted signatures.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                seen: HashSet::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Returns true exactly once per signature within the retention
    /// horizon. Check-and-record happens under one lock, so of two
    /// near-simultaneous admissions exactly one wins.
    pub fn admit(&self, signature: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();

        if inner.seen.contains(signature) {
            return false;
        }

        inner.seen.insert(signature.to_string());
        inner.order.push_back(signature.to_string());

        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
            }
        }

        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
