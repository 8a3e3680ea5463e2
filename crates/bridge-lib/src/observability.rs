//! Observability infrastructure for the alert bridge
//!
//! Provides:
//! - The `MetricsRecorder` sink the pipeline reports into
//! - Prometheus metrics (auth/fetch/dispatch latency, delivery counters, dedup size)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::models::FailureReason;

/// Histogram buckets for remote call latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Sink for pipeline counters and durations
pub trait MetricsRecorder: Send + Sync {
    /// A valid alert reached the dedup gate
    fn inc_alerts_processed(&self);
    /// An incident event was accepted
    fn inc_alerts_sent(&self);
    fn inc_dispatch_failed(&self, reason: FailureReason);
    fn inc_duplicates_suppressed(&self);
    fn inc_malformed_alerts(&self);
    /// A poll cycle finished with the given outcome label
    fn inc_poll_cycle(&self, outcome: &str);
    fn observe_auth_duration(&self, duration_secs: f64);
    fn observe_fetch_duration(&self, duration_secs: f64);
    fn observe_dispatch_duration(&self, duration_secs: f64);
    fn set_session_active(&self, active: bool);
    fn set_dedup_entries(&self, count: usize);
}

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<BridgeMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct BridgeMetricsInner {
    alerts_processed: IntCounter,
    alerts_sent: IntCounter,
    alerts_failed: IntCounterVec,
    duplicates_suppressed: IntCounter,
    malformed_alerts: IntCounter,
    poll_cycles: IntCounterVec,
    auth_duration_seconds: Histogram,
    fetch_duration_seconds: Histogram,
    dispatch_duration_seconds: Histogram,
    session_active: IntGauge,
    dedup_entries: IntGauge,
}

impl BridgeMetricsInner {
    fn new() -> Self {
        Self {
            alerts_processed: register_int_counter!(
                "bridge_alerts_processed_total",
                "Total monitoring alerts that reached the dedup gate"
            )
            .expect("Failed to register alerts_processed"),

            alerts_sent: register_int_counter!(
                "bridge_incident_events_sent_total",
                "Total incident events accepted by the incident API"
            )
            .expect("Failed to register alerts_sent"),

            alerts_failed: register_int_counter_vec!(
                "bridge_incident_events_failed_total",
                "Incident events that could not be delivered",
                &["reason"]
            )
            .expect("Failed to register alerts_failed"),

            duplicates_suppressed: register_int_counter!(
                "bridge_alerts_duplicate_total",
                "Alerts suppressed because they were already forwarded"
            )
            .expect("Failed to register duplicates_suppressed"),

            malformed_alerts: register_int_counter!(
                "bridge_alerts_malformed_total",
                "Alert entries skipped because they could not be parsed"
            )
            .expect("Failed to register malformed_alerts"),

            poll_cycles: register_int_counter_vec!(
                "bridge_poll_cycles_total",
                "Completed poll cycles by outcome",
                &["outcome"]
            )
            .expect("Failed to register poll_cycles"),

            auth_duration_seconds: register_histogram!(
                "bridge_monitoring_auth_duration_seconds",
                "Time spent authenticating against the monitoring API",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register auth_duration_seconds"),

            fetch_duration_seconds: register_histogram!(
                "bridge_monitoring_fetch_duration_seconds",
                "Time spent listing alerts from the monitoring API",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register fetch_duration_seconds"),

            dispatch_duration_seconds: register_histogram!(
                "bridge_dispatch_duration_seconds",
                "Time to deliver an alert to the incident API, retries included",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register dispatch_duration_seconds"),

            session_active: register_int_gauge!(
                "bridge_monitoring_session_active",
                "Monitoring API session status (1=active, 0=inactive)"
            )
            .expect("Failed to register session_active"),

            dedup_entries: register_int_gauge!(
                "bridge_dedup_entries",
                "Number of alert keys held in the dedup cache"
            )
            .expect("Failed to register dedup_entries"),
        }
    }
}

/// Prometheus-backed `MetricsRecorder`
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct BridgeMetrics {
    _private: (),
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(BridgeMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &BridgeMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }
}

impl MetricsRecorder for BridgeMetrics {
    fn inc_alerts_processed(&self) {
        self.inner().alerts_processed.inc();
    }

    fn inc_alerts_sent(&self) {
        self.inner().alerts_sent.inc();
    }

    fn inc_dispatch_failed(&self, reason: FailureReason) {
        self.inner()
            .alerts_failed
            .with_label_values(&[reason.as_str()])
            .inc();
    }

    fn inc_duplicates_suppressed(&self) {
        self.inner().duplicates_suppressed.inc();
    }

    fn inc_malformed_alerts(&self) {
        self.inner().malformed_alerts.inc();
    }

    fn inc_poll_cycle(&self, outcome: &str) {
        self.inner().poll_cycles.with_label_values(&[outcome]).inc();
    }

    fn observe_auth_duration(&self, duration_secs: f64) {
        self.inner().auth_duration_seconds.observe(duration_secs);
    }

    fn observe_fetch_duration(&self, duration_secs: f64) {
        self.inner().fetch_duration_seconds.observe(duration_secs);
    }

    fn observe_dispatch_duration(&self, duration_secs: f64) {
        self.inner().dispatch_duration_seconds.observe(duration_secs);
    }

    fn set_session_active(&self, active: bool) {
        self.inner().session_active.set(i64::from(active));
    }

    fn set_dedup_entries(&self, count: usize) {
        self.inner().dedup_entries.set(count as i64);
    }
}

/// Structured logger for bridge events
///
/// Provides consistent JSON-formatted logging for forwarded alerts,
/// delivery failures, and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log bridge startup
    pub fn log_startup(&self, version: &str, polling_enabled: bool) {
        info!(
            event = "bridge_started",
            instance = %self.instance,
            version = %version,
            polling_enabled = polling_enabled,
            "Alert bridge started"
        );
    }

    /// Log bridge shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "bridge_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Alert bridge shutting down"
        );
    }

    /// Log an alert delivered to the incident API
    pub fn log_alert_forwarded(&self, dedup_key: &str, resource_name: &str, attempts: u32) {
        info!(
            event = "alert_forwarded",
            instance = %self.instance,
            dedup_key = %dedup_key,
            resource = %resource_name,
            attempts = attempts,
            "Alert forwarded to incident API"
        );
    }

    /// Log an alert that could not be delivered
    pub fn log_dispatch_failed(
        &self,
        dedup_key: &str,
        resource_name: &str,
        reason: FailureReason,
        attempts: u32,
        released: bool,
    ) {
        warn!(
            event = "alert_dispatch_failed",
            instance = %self.instance,
            dedup_key = %dedup_key,
            resource = %resource_name,
            reason = %reason,
            attempts = attempts,
            admission_released = released,
            "Alert delivery failed"
        );
    }

    /// Log a completed poll cycle
    pub fn log_cycle(
        &self,
        fetched: usize,
        dispatched: usize,
        duplicates: usize,
        failed: usize,
        elapsed_ms: u128,
    ) {
        info!(
            event = "poll_cycle_completed",
            instance = %self.instance,
            fetched = fetched,
            dispatched = dispatched,
            duplicates = duplicates,
            failed = failed,
            elapsed_ms = elapsed_ms,
            "Poll cycle completed"
        );
    }

    /// Log a session (re)authentication
    pub fn log_session_renewed(&self, renews_in_secs: u64) {
        info!(
            event = "session_renewed",
            instance = %self.instance,
            renews_in_secs = renews_in_secs,
            "Authenticated with monitoring API"
        );
    }
}
