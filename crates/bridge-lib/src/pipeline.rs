//! Assembly of the shared pipeline components
//!
//! One `Pipeline` owns the session, dedup cache and poller used by every
//! entry point (poll loop, webhook, manual trigger).

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::dedup::DedupCache;
use crate::dispatcher::{EventDispatcher, RetryPolicy};
use crate::error::Result;
use crate::health::{components, HealthRegistry};
use crate::incident::{IncidentApi, PagerDutyClient};
use crate::monitoring::{MonitoringApi, MonitoringConfig, OneViewClient};
use crate::observability::{MetricsRecorder, StructuredLogger};
use crate::poller::{AlertPoller, PollerConfig, PollerStatus};
use crate::session::{SessionConfig, SessionManager, SessionSnapshot};

/// Behavioural settings shared by every pipeline
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub routing_key: String,
    pub session: SessionConfig,
    pub retry: RetryPolicy,
    pub poller: PollerConfig,
    pub polling_enabled: bool,
}

impl PipelineOptions {
    pub fn new(routing_key: impl Into<String>) -> Self {
        Self {
            routing_key: routing_key.into(),
            session: SessionConfig::default(),
            retry: RetryPolicy::default(),
            poller: PollerConfig::default(),
            polling_enabled: true,
        }
    }
}

/// Snapshot served by `/status`
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    pub polling_enabled: bool,
    pub session: SessionSnapshot,
    pub poller: PollerStatus,
    pub dedup_entries: usize,
}

pub struct Pipeline {
    pub sessions: Arc<SessionManager>,
    pub dedup: Arc<DedupCache>,
    pub poller: Arc<AlertPoller>,
    pub polling_enabled: bool,
}

impl Pipeline {
    /// Build a pipeline against the real OneView and PagerDuty clients
    pub fn connect(
        monitoring: MonitoringConfig,
        events_url: &str,
        request_timeout: Duration,
        options: PipelineOptions,
        metrics: Arc<dyn MetricsRecorder>,
        logger: StructuredLogger,
        health: HealthRegistry,
    ) -> Result<Self> {
        let api = Arc::new(OneViewClient::new(monitoring)?);
        let incident = Arc::new(PagerDutyClient::new(events_url, request_timeout)?);
        Ok(Self::assemble(api, incident, options, metrics, logger, health))
    }

    /// Wire the pipeline around arbitrary API implementations
    pub fn assemble(
        api: Arc<dyn MonitoringApi>,
        incident: Arc<dyn IncidentApi>,
        options: PipelineOptions,
        metrics: Arc<dyn MetricsRecorder>,
        logger: StructuredLogger,
        health: HealthRegistry,
    ) -> Self {
        let dedup = Arc::new(DedupCache::new(options.poller.dedup_ttl));
        let sessions = Arc::new(SessionManager::new(
            api.clone(),
            options.session,
            metrics.clone(),
            logger.clone(),
        ));
        let dispatcher = Arc::new(EventDispatcher::new(
            incident,
            options.routing_key,
            options.retry,
            dedup.clone(),
            metrics.clone(),
            logger.clone(),
        ));
        let poller = Arc::new(AlertPoller::new(
            sessions.clone(),
            api,
            dedup.clone(),
            dispatcher,
            metrics,
            logger,
            health,
            options.poller,
        ));

        Self {
            sessions,
            dedup,
            poller,
            polling_enabled: options.polling_enabled,
        }
    }

    /// Register the pipeline components with the health registry
    pub async fn register_health(health: &HealthRegistry) {
        health.register(components::MONITORING_SESSION).await;
        health.register(components::POLLER).await;
        health.register(components::DISPATCHER).await;
        health.register(components::DEDUP_CACHE).await;
    }

    pub async fn status(&self) -> BridgeStatus {
        BridgeStatus {
            polling_enabled: self.polling_enabled,
            session: self.sessions.snapshot().await,
            poller: self.poller.status().await,
            dedup_entries: self.dedup.size(),
        }
    }
}
