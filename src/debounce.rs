//! Per-key debouncing
//!
//! A key is "on cooldown" while less than `interval` has passed since its
//! last accepted hit. Blocked hits do not refresh the timestamp, so a user
//! hammering the bot is released exactly `interval` after the last hit that
//! got through.
//!
//! The map is pruned opportunistically: once it holds more than
//! `DEBOUNCE_PRUNE_THRESHOLD` keys, entries older than `DEBOUNCE_RETENTION`
//! are dropped before the next decision. The retention window is independent
//! of the debounce interval.
//!
//! `hit` takes `&mut self`, so the read-check-write on a key is atomic with
//! respect to whatever lock the owner holds (see `AdmissionController`).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::constants::{DEBOUNCE_PRUNE_THRESHOLD, DEBOUNCE_RETENTION};

#[derive(Debug)]
pub struct Debouncer {
    interval: Duration,
    records: HashMap<String, Instant>,
}

impl Debouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            records: HashMap::new(),
        }
    }

    /// Returns true if `key` is blocked; otherwise records the hit and returns false
    pub fn hit(&mut self, key: &str) -> bool {
        self.hit_at(key, Instant::now())
    }

    /// Same as `hit`, evaluated at an explicit instant
    pub fn hit_at(&mut self, key: &str, now: Instant) -> bool {
        if self.records.len() > DEBOUNCE_PRUNE_THRESHOLD {
            let before = self.records.len();
            self.records
                .retain(|_, last| now.saturating_duration_since(*last) < DEBOUNCE_RETENTION);
            tracing::debug!(
                pruned = before - self.records.len(),
                remaining = self.records.len(),
                "Pruned stale debounce records"
            );
        }

        if let Some(last) = self.records.get(key) {
            if now.saturating_duration_since(*last) < self.interval {
                return true;
            }
        }
        self.records.insert(key.to_string(), now);
        false
    }

    /// True if `key` would currently be blocked, without recording anything
    pub fn is_on_cooldown(&self, key: &str, now: Instant) -> bool {
        self.records
            .get(key)
            .map(|last| now.saturating_duration_since(*last) < self.interval)
            .unwrap_or(false)
    }

    pub fn clear_all(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
