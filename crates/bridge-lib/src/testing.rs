//! In-memory doubles for the monitoring and incident APIs

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{BridgeError, Result};
use crate::incident::{IncidentApi, IncidentEvent};
use crate::models::{AlertState, AuthGrant, FailureReason, NormalizedAlert, Severity};
use crate::monitoring::MonitoringApi;
use crate::observability::MetricsRecorder;

/// Critical, active alert with the given key as both identity and dedup key
pub fn normalized_alert(key: &str) -> NormalizedAlert {
    NormalizedAlert {
        dedup_key: key.to_string(),
        identity: key.to_string(),
        severity: Severity::Critical,
        state: AlertState::Active,
        resource_name: "enclosure-1".to_string(),
        category: "enclosures".to_string(),
        description: "Fan failure".to_string(),
        source: "/rest/enclosures/1".to_string(),
        alert_type: None,
        health_category: None,
        urgency: None,
        created: None,
        modified: None,
        first_seen_at: Utc::now(),
    }
}

/// Raw alert entry as the appliance would return it
pub fn raw_alert(uri: &str, severity: &str) -> Value {
    serde_json::json!({
        "uri": uri,
        "severity": severity,
        "description": "Fan failure",
        "alertState": "Active",
        "associatedResource": {
            "resourceName": "enclosure-1",
            "resourceCategory": "enclosures",
            "resourceUri": "/rest/enclosures/1"
        }
    })
}

#[derive(Default)]
pub struct RecordingMetrics {
    processed: AtomicUsize,
    sent: AtomicUsize,
    duplicates: AtomicUsize,
    malformed: AtomicUsize,
    failures: Mutex<HashMap<FailureReason, usize>>,
    cycles: Mutex<Vec<String>>,
    session_active: Mutex<Option<bool>>,
    dedup_entries: Mutex<Option<usize>>,
}

impl RecordingMetrics {
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates.load(Ordering::SeqCst)
    }

    pub fn malformed(&self) -> usize {
        self.malformed.load(Ordering::SeqCst)
    }

    pub fn failed(&self, reason: FailureReason) -> usize {
        self.failures
            .lock()
            .unwrap()
            .get(&reason)
            .copied()
            .unwrap_or(0)
    }

    pub fn cycles(&self) -> Vec<String> {
        self.cycles.lock().unwrap().clone()
    }

    pub fn session_active(&self) -> Option<bool> {
        *self.session_active.lock().unwrap()
    }

    pub fn dedup_entries(&self) -> Option<usize> {
        *self.dedup_entries.lock().unwrap()
    }
}

impl MetricsRecorder for RecordingMetrics {
    fn inc_alerts_processed(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    fn inc_alerts_sent(&self) {
        self.sent.fetch_add(1, Ordering::SeqCst);
    }

    fn inc_dispatch_failed(&self, reason: FailureReason) {
        *self.failures.lock().unwrap().entry(reason).or_insert(0) += 1;
    }

    fn inc_duplicates_suppressed(&self) {
        self.duplicates.fetch_add(1, Ordering::SeqCst);
    }

    fn inc_malformed_alerts(&self) {
        self.malformed.fetch_add(1, Ordering::SeqCst);
    }

    fn inc_poll_cycle(&self, outcome: &str) {
        self.cycles.lock().unwrap().push(outcome.to_string());
    }

    fn observe_auth_duration(&self, _duration_secs: f64) {}

    fn observe_fetch_duration(&self, _duration_secs: f64) {}

    fn observe_dispatch_duration(&self, _duration_secs: f64) {}

    fn set_session_active(&self, active: bool) {
        *self.session_active.lock().unwrap() = Some(active);
    }

    fn set_dedup_entries(&self, count: usize) {
        *self.dedup_entries.lock().unwrap() = Some(count);
    }
}

/// Monitoring API double; issues `token-1`, `token-2`, ...
#[derive(Default)]
pub struct MockMonitoring {
    auth_delay: Option<Duration>,
    lifetime: Option<Duration>,
    auth_failures: Mutex<VecDeque<BridgeError>>,
    list_failures: Mutex<VecDeque<BridgeError>>,
    list_delay: Option<Duration>,
    alerts: Mutex<Vec<Value>>,
    auth_calls: AtomicUsize,
    list_calls: AtomicUsize,
    tokens_seen: Mutex<Vec<String>>,
}

impl MockMonitoring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auth_delay(mut self, delay: Duration) -> Self {
        self.auth_delay = Some(delay);
        self
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    pub fn with_alerts(self, alerts: Vec<Value>) -> Self {
        *self.alerts.lock().unwrap() = alerts;
        self
    }

    pub fn fail_next_auth(self, error: BridgeError) -> Self {
        self.auth_failures.lock().unwrap().push_back(error);
        self
    }

    pub fn fail_next_list(self, error: BridgeError) -> Self {
        self.list_failures.lock().unwrap().push_back(error);
        self
    }

    pub fn set_alerts(&self, alerts: Vec<Value>) {
        *self.alerts.lock().unwrap() = alerts;
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl MonitoringApi for MockMonitoring {
    async fn authenticate(&self) -> Result<AuthGrant> {
        let call = self.auth_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.auth_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.auth_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(AuthGrant {
            token: format!("token-{}", call),
            lifetime: self.lifetime,
        })
    }

    async fn list_alerts(&self, token: &str) -> Result<Vec<Value>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen.lock().unwrap().push(token.to_string());
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.list_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(self.alerts.lock().unwrap().clone())
    }
}

/// Incident API double; fails scripted attempts, accepts everything else
#[derive(Default)]
pub struct MockIncident {
    failures: Mutex<VecDeque<BridgeError>>,
    events: Mutex<Vec<IncidentEvent>>,
    attempts: AtomicUsize,
}

impl MockIncident {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` submissions with `error`
    pub fn fail_times(self, times: usize, error: BridgeError) -> Self {
        {
            let mut failures = self.failures.lock().unwrap();
            for _ in 0..times {
                failures.push_back(error.clone());
            }
        }
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Accepted events only
    pub fn events(&self) -> Vec<IncidentEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn submitted_keys(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|event| event.dedup_key)
            .collect()
    }
}

#[async_trait]
impl IncidentApi for MockIncident {
    async fn submit_event(&self, event: &IncidentEvent) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
