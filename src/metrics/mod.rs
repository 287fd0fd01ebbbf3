// Metrics module - Prometheus-compatible metrics tracking
// Provides counters, histograms, and gauges for observability

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;

/// Process-wide plugin metrics
pub struct PluginMetrics {
    /// Admission decisions by outcome (admitted, already_handled, too_frequent, in_progress)
    pub admissions: IntCounterVec,

    /// Generation calls by result (success, error)
    pub generations: IntCounterVec,

    /// Edit jobs by result (success, failed, timeout, error)
    pub edits: IntCounterVec,

    /// Files removed by cache sweeps
    pub swept_files: IntCounter,

    /// Bytes reclaimed by cache sweeps
    pub freed_bytes: IntCounter,

    /// Requests currently holding an admission permit
    pub inflight: IntGauge,

    /// Generation call duration (in seconds)
    pub generation_duration: Histogram,
}

/// Global singleton instance of metrics
static METRICS: OnceLock<PluginMetrics> = OnceLock::new();

impl PluginMetrics {
    /// Initialize and return the global metrics instance
    ///
    /// Subsequent calls return the same instance.
    pub fn global() -> &'static Self {
        METRICS.get_or_init(|| PluginMetrics {
            admissions: register_int_counter_vec!(
                "aiimg_admissions_total",
                "Admission decisions by outcome",
                &["outcome"]
            )
            .expect("Failed to register admissions_total metric"),
            generations: register_int_counter_vec!(
                "aiimg_generations_total",
                "Image generation calls by result",
                &["result"]
            )
            .expect("Failed to register generations_total metric"),
            edits: register_int_counter_vec!(
                "aiimg_edits_total",
                "Image edit jobs by result",
                &["result"]
            )
            .expect("Failed to register edits_total metric"),
            swept_files: register_int_counter!(
                "aiimg_cache_swept_files_total",
                "Image files removed by cache sweeps"
            )
            .expect("Failed to register cache_swept_files_total metric"),
            freed_bytes: register_int_counter!(
                "aiimg_cache_freed_bytes_total",
                "Bytes reclaimed by cache sweeps"
            )
            .expect("Failed to register cache_freed_bytes_total metric"),
            inflight: register_int_gauge!(
                "aiimg_inflight_requests",
                "Requests currently admitted and running"
            )
            .expect("Failed to register inflight_requests metric"),
            generation_duration: register_histogram!(
                "aiimg_generation_duration_seconds",
                "Duration of image generation calls",
                vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0]
            )
            .expect("Failed to register generation_duration_seconds metric"),
        })
    }

    /// Record one admission decision
    pub fn record_admission(&self, outcome: &str) {
        self.admissions.with_label_values(&[outcome]).inc();
    }

    /// Record the outcome of a generation call
    pub fn record_generation(&self, success: bool, duration_secs: f64) {
        let result = if success { "success" } else { "error" };
        self.generations.with_label_values(&[result]).inc();
        self.generation_duration.observe(duration_secs);
    }

    /// Record the outcome of an edit job
    pub fn record_edit(&self, result: &str) {
        self.edits.with_label_values(&[result]).inc();
    }

    /// Record a completed sweep
    pub fn record_sweep(&self, deleted: usize, freed_bytes: u64) {
        self.swept_files.inc_by(deleted as u64);
        self.freed_bytes.inc_by(freed_bytes);
    }
}

/// Export all registered metrics in Prometheus text format
pub fn export_text() -> String {
    // Make sure our metrics exist even if nothing has been recorded yet
    let _ = PluginMetrics::global();

    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
