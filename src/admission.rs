//! Request admission
//!
//! Every trigger passes through `AdmissionController::admit` before any remote
//! call is made. The checks run in a fixed order under a single lock:
//!
//! 1. the message id was already handled within the retention window
//! 2. the user completed a request within the completion cooldown, or the
//!    debouncer reports the key on cooldown
//! 3. the key is already in flight
//!
//! On success the caller receives an [`AdmissionPermit`]. The permit owns the
//! in-flight slot: dropping it releases the slot on every exit path, including
//! errors, panics and task cancellation. A permit that is dropped without
//! `succeed()` also rolls back the message-id record so the same trigger can
//! be retried.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;

use crate::constants::{ADMISSION_MAINTENANCE_INTERVAL, ADMISSION_RETENTION, MESSAGE_ID_FALLBACK_CHARS};
use crate::debounce::Debouncer;
use crate::metrics::PluginMetrics;

/// Why a trigger was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The same message was already handled
    AlreadyHandled,
    /// The user is on cooldown
    TooFrequent,
    /// The user already has a request running
    InProgress,
}

impl Rejection {
    pub fn user_message(&self) -> &'static str {
        match self {
            Rejection::AlreadyHandled => "This request was already handled",
            Rejection::TooFrequent => "Too many requests, please try again later",
            Rejection::InProgress => "Your image is still being generated, please wait",
        }
    }

    /// Metric label for this outcome
    pub fn as_label(&self) -> &'static str {
        match self {
            Rejection::AlreadyHandled => "already_handled",
            Rejection::TooFrequent => "too_frequent",
            Rejection::InProgress => "in_progress",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.user_message())
    }
}

#[derive(Debug)]
struct AdmissionState {
    debouncer: Debouncer,
    in_flight: HashSet<String>,
    processed: HashMap<String, Instant>,
    completions: HashMap<String, Instant>,
}

impl AdmissionState {
    fn prune(&mut self, now: Instant, retention: Duration) -> usize {
        let before = self.processed.len() + self.completions.len();
        self.processed
            .retain(|_, at| now.saturating_duration_since(*at) <= retention);
        self.completions
            .retain(|_, at| now.saturating_duration_since(*at) <= retention);
        before - (self.processed.len() + self.completions.len())
    }
}

/// Owns all admission state for one plugin instance
pub struct AdmissionController {
    state: Arc<Mutex<AdmissionState>>,
    completion_cooldown: Duration,
    retention: Duration,
    maintenance_shutdown: RwLock<Option<oneshot::Sender<()>>>,
}

impl AdmissionController {
    /// Create a controller
    ///
    /// # Arguments
    /// * `debounce_interval` - Minimum time between accepted hits per key
    /// * `completion_cooldown` - Minimum time after a successful completion before the same key is admitted again
    pub fn new(debounce_interval: Duration, completion_cooldown: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(AdmissionState {
                debouncer: Debouncer::new(debounce_interval),
                in_flight: HashSet::new(),
                processed: HashMap::new(),
                completions: HashMap::new(),
            })),
            completion_cooldown,
            retention: ADMISSION_RETENTION,
            maintenance_shutdown: RwLock::new(None),
        }
    }

    /// Override the retention window of processed-message and completion records
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Decide whether `(key, message_id)` may proceed
    pub fn admit(&self, key: &str, message_id: &str) -> Result<AdmissionPermit, Rejection> {
        self.admit_at(key, message_id, Instant::now())
    }

    /// Same as `admit`, evaluated at an explicit instant
    pub fn admit_at(
        &self,
        key: &str,
        message_id: &str,
        now: Instant,
    ) -> Result<AdmissionPermit, Rejection> {
        let metrics = PluginMetrics::global();
        let decision = {
            let mut state = self.state.lock();
            Self::decide(&mut state, key, message_id, now, self.retention, self.completion_cooldown)
        };

        match decision {
            Ok(()) => {
                metrics.record_admission("admitted");
                metrics.inflight.inc();
                tracing::debug!(key = %key, message_id = %message_id, "Request admitted");
                Ok(AdmissionPermit {
                    state: Arc::clone(&self.state),
                    key: key.to_string(),
                    message_id: message_id.to_string(),
                    succeeded: false,
                })
            }
            Err(rejection) => {
                metrics.record_admission(rejection.as_label());
                tracing::debug!(
                    key = %key,
                    message_id = %message_id,
                    reason = rejection.as_label(),
                    "Request rejected"
                );
                Err(rejection)
            }
        }
    }

    fn decide(
        state: &mut AdmissionState,
        key: &str,
        message_id: &str,
        now: Instant,
        retention: Duration,
        completion_cooldown: Duration,
    ) -> Result<(), Rejection> {
        if let Some(at) = state.processed.get(message_id) {
            if now.saturating_duration_since(*at) <= retention {
                return Err(Rejection::AlreadyHandled);
            }
        }

        if let Some(done) = state.completions.get(key) {
            if now.saturating_duration_since(*done) < completion_cooldown {
                return Err(Rejection::TooFrequent);
            }
        }
        if state.debouncer.hit_at(key, now) {
            return Err(Rejection::TooFrequent);
        }

        if state.in_flight.contains(key) {
            return Err(Rejection::InProgress);
        }

        state.processed.insert(message_id.to_string(), now);
        state.in_flight.insert(key.to_string());
        Ok(())
    }

    /// Drop processed-message and completion records older than the retention window
    ///
    /// Returns the number of records removed.
    pub fn prune_expired(&self, now: Instant) -> usize {
        self.state.lock().prune(now, self.retention)
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.state.lock().in_flight.contains(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    pub fn is_processed(&self, message_id: &str) -> bool {
        self.state.lock().processed.contains_key(message_id)
    }

    /// Forget all debounce records
    pub fn clear_debounce(&self) {
        self.state.lock().debouncer.clear_all();
    }

    /// Start the periodic record pruning task
    ///
    /// A second call while the task is running is a no-op.
    pub fn start_maintenance_task(&self, interval: Option<Duration>) {
        let interval = interval.unwrap_or(ADMISSION_MAINTENANCE_INTERVAL);
        let state = Arc::clone(&self.state);
        let retention = self.retention;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        {
            let mut guard = self.maintenance_shutdown.write();
            if guard.is_some() {
                tracing::debug!("Admission maintenance task already running, skipping duplicate start");
                return;
            }
            *guard = Some(shutdown_tx);
        }

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = state.lock().prune(Instant::now(), retention);
                        tracing::debug!(removed = removed, "Admission state pruned");
                    }
                    _ = &mut shutdown_rx => {
                        tracing::debug!("Admission maintenance task shutting down");
                        break;
                    }
                }
            }
        });
    }

    /// Stop the maintenance task if it is running
    pub fn stop_maintenance_task(&self) {
        if let Some(shutdown_tx) = self.maintenance_shutdown.write().take() {
            let _ = shutdown_tx.send(());
        }
    }
}

impl Drop for AdmissionController {
    fn drop(&mut self) {
        self.stop_maintenance_task();
    }
}

/// Token for one admitted request
///
/// Dropping the permit removes the key from the in-flight set. Unless
/// `succeed()` was called first, the message-id record is rolled back too.
#[derive(Debug)]
#[must_use = "dropping the permit immediately releases the in-flight slot"]
pub struct AdmissionPermit {
    state: Arc<Mutex<AdmissionState>>,
    key: String,
    message_id: String,
    succeeded: bool,
}

impl AdmissionPermit {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Mark the request as completed and release it
    pub fn succeed(mut self) {
        self.succeeded = true;
    }

    /// Mark the request as failed and release it
    pub fn fail(self) {}
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        {
            let mut state = self.state.lock();
            state.in_flight.remove(&self.key);
            if self.succeeded {
                state.completions.insert(self.key.clone(), Instant::now());
            } else {
                state.processed.remove(&self.message_id);
            }
        }
        PluginMetrics::global().inflight.dec();
    }
}

/// Message id to de-duplicate on
///
/// Uses the host id when present, otherwise `"{user_id}_{hash}"` over the
/// first characters of the message text.
pub fn message_id_or_fallback(message_id: Option<&str>, user_id: &str, text: &str) -> String {
    match message_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => {
            let head: String = text.chars().take(MESSAGE_ID_FALLBACK_CHARS).collect();
            let mut hasher = DefaultHasher::new();
            head.hash(&mut hasher);
            format!("{}_{}", user_id, hasher.finish())
        }
    }
}

/// Admission key for edit requests of `user_id`
pub fn edit_key(user_id: &str) -> String {
    format!("edit_{}", user_id)
}
