//! Delivery of novel alerts to the incident API
//!
//! Retries transient failures with exponential backoff and releases the
//! dedup admission of alerts that could not be delivered, so the next poll
//! cycle tries again instead of dropping them.

mod backoff;

pub use backoff::{RetryDecision, RetryPolicy};

use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::dedup::DedupCache;
use crate::incident::{IncidentApi, IncidentEvent};
use crate::models::{DispatchOutcome, FailureReason, NormalizedAlert};
use crate::observability::{MetricsRecorder, StructuredLogger};

/// Sends normalized alerts to the incident API
pub struct EventDispatcher {
    incident: Arc<dyn IncidentApi>,
    routing_key: String,
    policy: RetryPolicy,
    dedup: Arc<DedupCache>,
    metrics: Arc<dyn MetricsRecorder>,
    logger: StructuredLogger,
}

impl EventDispatcher {
    pub fn new(
        incident: Arc<dyn IncidentApi>,
        routing_key: impl Into<String>,
        policy: RetryPolicy,
        dedup: Arc<DedupCache>,
        metrics: Arc<dyn MetricsRecorder>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            incident,
            routing_key: routing_key.into(),
            policy,
            dedup,
            metrics,
            logger,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver one alert whose dedup key the caller has already admitted
    pub async fn dispatch(&self, alert: NormalizedAlert) -> DispatchOutcome {
        let started = Instant::now();
        let event = IncidentEvent::trigger(&self.routing_key, &alert);
        let mut attempt = 0u32;

        let failure = loop {
            attempt += 1;
            match self.incident.submit_event(&event).await {
                Ok(()) => break None,
                Err(e) => match self.policy.decide(attempt, &e) {
                    RetryDecision::Retry(delay) => {
                        warn!(
                            dedup_key = %alert.dedup_key,
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Incident delivery failed, retrying"
                        );
                        sleep(delay).await;
                    }
                    RetryDecision::GiveUp => {
                        debug!(
                            dedup_key = %alert.dedup_key,
                            attempt = attempt,
                            error = %e,
                            "Giving up on incident delivery"
                        );
                        break Some(e.failure_reason());
                    }
                },
            }
        };

        let duration = started.elapsed();
        self.metrics.observe_dispatch_duration(duration.as_secs_f64());

        match failure {
            None => {
                self.metrics.inc_alerts_sent();
                self.logger
                    .log_alert_forwarded(&alert.dedup_key, &alert.resource_name, attempt);
            }
            Some(reason) => {
                self.metrics.inc_dispatch_failed(reason);
                let released = should_release(reason) && self.dedup.release(&alert.dedup_key);
                self.logger.log_dispatch_failed(
                    &alert.dedup_key,
                    &alert.resource_name,
                    reason,
                    attempt,
                    released,
                );
            }
        }

        DispatchOutcome {
            dedup_key: alert.dedup_key,
            success: failure.is_none(),
            failure_reason: failure,
            attempt_count: attempt,
            duration,
        }
    }
}

/// A definitive rejection keeps its admission; resubmitting the same payload
/// every cycle would be rejected again.
fn should_release(reason: FailureReason) -> bool {
    !matches!(reason, FailureReason::Rejected)
}
