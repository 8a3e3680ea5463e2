//! Alert polling pipeline
//!
//! Fetches the alert list from the monitoring API, normalizes and filters
//! entries, gates them through the dedup cache and hands novel alerts to the
//! dispatcher. Scheduled polls, manual triggers and webhook pushes all share
//! one `AlertPoller` and therefore one session and one dedup cache.

mod r#loop;
mod normalize;

pub use normalize::{normalize, parse_raw};
pub use r#loop::{PollLoop, PollLoopBuilder, PollLoopConfig};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::dedup::DedupCache;
use crate::dispatcher::EventDispatcher;
use crate::error::{BridgeError, Result};
use crate::health::{components, HealthRegistry};
use crate::models::{DedupKeyMode, DispatchOutcome, Severity};
use crate::monitoring::MonitoringApi;
use crate::observability::{MetricsRecorder, StructuredLogger};
use crate::session::SessionManager;

/// Filtering and admission settings
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Only alerts of exactly this severity are forwarded
    pub forward_severity: Severity,
    pub dedup_ttl: Duration,
    pub key_mode: DedupKeyMode,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            forward_severity: Severity::Critical,
            dedup_ttl: crate::dedup::DEFAULT_DEDUP_TTL,
            key_mode: DedupKeyMode::Identity,
        }
    }
}

/// What started a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Scheduled,
    Manual,
}

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Fetched and every admitted alert was delivered
    Success,
    /// Fetched, but at least one delivery failed
    Partial,
    /// The monitoring API could not be reached
    Failed,
    /// Another cycle was already running
    Coalesced,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Success => "success",
            CycleOutcome::Partial => "partial",
            CycleOutcome::Failed => "failed",
            CycleOutcome::Coalesced => "coalesced",
        }
    }
}

/// Counts from one pass of the normalize → dedup → dispatch path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestSummary {
    pub received: usize,
    pub malformed: usize,
    /// Wrong severity or not active
    pub filtered: usize,
    pub duplicates: usize,
    pub dispatched: usize,
    pub failed: usize,
    #[serde(skip)]
    pub outcomes: Vec<DispatchOutcome>,
}

/// Result of one `run_cycle`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub trigger: Trigger,
    pub outcome: CycleOutcome,
    pub coalesced: bool,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    #[serde(flatten)]
    pub summary: IngestSummary,
    /// Expired dedup entries removed at the end of the cycle
    pub swept: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CycleReport {
    fn coalesced(trigger: Trigger) -> Self {
        Self {
            trigger,
            outcome: CycleOutcome::Coalesced,
            coalesced: true,
            started_at: Utc::now(),
            elapsed_ms: 0,
            summary: IngestSummary::default(),
            swept: 0,
            error: None,
        }
    }
}

/// Read-only poller state for health surfaces
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollerStatus {
    pub running: bool,
    pub cycles_run: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<CycleOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// The alert ingestion pipeline
pub struct AlertPoller {
    sessions: Arc<SessionManager>,
    api: Arc<dyn MonitoringApi>,
    dedup: Arc<DedupCache>,
    dispatcher: Arc<EventDispatcher>,
    metrics: Arc<dyn MetricsRecorder>,
    logger: StructuredLogger,
    health: HealthRegistry,
    config: PollerConfig,
    /// Held for the duration of a cycle
    cycle_guard: Mutex<()>,
    status: RwLock<PollerStatus>,
}

impl AlertPoller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<SessionManager>,
        api: Arc<dyn MonitoringApi>,
        dedup: Arc<DedupCache>,
        dispatcher: Arc<EventDispatcher>,
        metrics: Arc<dyn MetricsRecorder>,
        logger: StructuredLogger,
        health: HealthRegistry,
        config: PollerConfig,
    ) -> Self {
        Self {
            sessions,
            api,
            dedup,
            dispatcher,
            metrics,
            logger,
            health,
            config,
            cycle_guard: Mutex::new(()),
            status: RwLock::new(PollerStatus::default()),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn dedup(&self) -> &Arc<DedupCache> {
        &self.dedup
    }

    /// Run one full poll. Returns immediately with a coalesced report when
    /// another cycle holds the guard.
    pub async fn run_cycle(&self, trigger: Trigger) -> CycleReport {
        let _guard = match self.cycle_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(trigger = ?trigger, "Poll cycle already running, coalescing trigger");
                self.metrics.inc_poll_cycle(CycleOutcome::Coalesced.as_str());
                return CycleReport::coalesced(trigger);
            }
        };

        let started = Instant::now();
        let started_at = Utc::now();

        let (summary, error) = match self.fetch().await {
            Ok(entries) => {
                self.health.set_healthy(components::MONITORING_SESSION).await;
                (self.ingest(entries).await, None)
            }
            Err(e) => {
                warn!(error = %e, trigger = ?trigger, "Failed to fetch alerts from monitoring API");
                let component = match e {
                    BridgeError::Auth(_) => components::MONITORING_SESSION,
                    _ => components::POLLER,
                };
                self.health
                    .set_degraded(component, format!("alert fetch failed: {}", e))
                    .await;
                (IngestSummary::default(), Some(e.to_string()))
            }
        };

        let swept = self.dedup.sweep();
        self.metrics.set_dedup_entries(self.dedup.size());

        let outcome = match (&error, summary.failed) {
            (Some(_), _) => CycleOutcome::Failed,
            (None, 0) => CycleOutcome::Success,
            (None, _) => CycleOutcome::Partial,
        };
        if error.is_none() {
            self.health.set_healthy(components::POLLER).await;
        }
        if summary.failed > 0 {
            self.health
                .set_degraded(
                    components::DISPATCHER,
                    format!("{} alert(s) not delivered", summary.failed),
                )
                .await;
        } else if summary.dispatched > 0 {
            self.health.set_healthy(components::DISPATCHER).await;
        }

        let elapsed = started.elapsed();
        self.metrics.inc_poll_cycle(outcome.as_str());
        self.logger.log_cycle(
            summary.received,
            summary.dispatched,
            summary.duplicates,
            summary.failed,
            elapsed.as_millis(),
        );

        {
            let mut status = self.status.write().await;
            status.cycles_run += 1;
            status.last_cycle_at = Some(started_at);
            status.last_outcome = Some(outcome);
            status.last_error = error.clone();
        }

        CycleReport {
            trigger,
            outcome,
            coalesced: false,
            started_at,
            elapsed_ms: elapsed.as_millis() as u64,
            summary,
            swept,
            error,
        }
    }

    /// Fetch the alert list, re-authenticating once on an auth failure
    async fn fetch(&self) -> Result<Vec<Value>> {
        let token = self.sessions.ensure_valid().await?;
        let started = Instant::now();

        let result = match self.api.list_alerts(&token).await {
            Err(BridgeError::Auth(reason)) => {
                info!(reason = %reason, "Monitoring API rejected session, re-authenticating");
                self.sessions.invalidate().await;
                let token = self.sessions.ensure_valid().await?;
                self.api.list_alerts(&token).await
            }
            other => other,
        };

        self.metrics
            .observe_fetch_duration(started.elapsed().as_secs_f64());
        result
    }

    /// Normalize, filter, dedup and dispatch a batch of raw entries.
    ///
    /// Per-entry failures are counted and skipped; the batch always runs to
    /// completion.
    pub async fn ingest(&self, entries: Vec<Value>) -> IngestSummary {
        let mut summary = IngestSummary::default();

        for entry in entries {
            summary.received += 1;

            let alert = match parse_raw(entry).and_then(|raw| normalize(&raw, self.config.key_mode)) {
                Ok(alert) => alert,
                Err(e) => {
                    summary.malformed += 1;
                    self.metrics.inc_malformed_alerts();
                    warn!(error = %e, "Skipping malformed alert");
                    continue;
                }
            };

            if alert.severity != self.config.forward_severity || !alert.state.is_active() {
                summary.filtered += 1;
                debug!(
                    alert_id = %alert.identity,
                    severity = %alert.severity,
                    state = ?alert.state,
                    "Alert filtered"
                );
                continue;
            }

            self.metrics.inc_alerts_processed();
            if !self.dedup.try_admit(&alert.dedup_key, self.config.dedup_ttl) {
                summary.duplicates += 1;
                self.metrics.inc_duplicates_suppressed();
                debug!(dedup_key = %alert.dedup_key, "Duplicate alert suppressed");
                continue;
            }

            let outcome = self.dispatcher.dispatch(alert).await;
            if outcome.success {
                summary.dispatched += 1;
            } else {
                summary.failed += 1;
            }
            summary.outcomes.push(outcome);
        }

        self.metrics.set_dedup_entries(self.dedup.size());
        summary
    }

    /// Run `run_cycle` on its own task. The cycle completes even if the
    /// returned handle is dropped.
    pub fn spawn_cycle(self: &Arc<Self>, trigger: Trigger) -> JoinHandle<CycleReport> {
        let poller = Arc::clone(self);
        tokio::spawn(async move { poller.run_cycle(trigger).await })
    }

    /// Run `ingest` on its own task. Admitted alerts are always either
    /// delivered or released, even if the returned handle is dropped.
    pub fn spawn_ingest(self: &Arc<Self>, entries: Vec<Value>) -> JoinHandle<IngestSummary> {
        let poller = Arc::clone(self);
        tokio::spawn(async move { poller.ingest(entries).await })
    }

    /// Authenticate from scratch and count the currently listed alerts
    pub async fn test_connection(&self) -> Result<usize> {
        self.sessions.invalidate().await;
        let token = self.sessions.ensure_valid().await?;
        let alerts = self.api.list_alerts(&token).await?;
        Ok(alerts.len())
    }

    pub async fn status(&self) -> PollerStatus {
        let mut status = self.status.read().await.clone();
        status.running = self.cycle_guard.try_lock().is_err();
        status
    }
}
