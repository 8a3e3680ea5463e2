//! Scheduled polling loop
//!
//! Runs a poll cycle immediately, then every interval plus random jitter
//! until shutdown is signalled. A cycle in progress always runs to
//! completion; shutdown is observed between cycles.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, info};

use super::{AlertPoller, Trigger};
use crate::error::{BridgeError, Result};

/// Configuration for the polling loop
#[derive(Debug, Clone)]
pub struct PollLoopConfig {
    /// Base poll interval (default: 180 seconds)
    pub interval: Duration,
    /// Maximum jitter added to each interval (default: 10 seconds)
    pub jitter: Duration,
}

impl Default for PollLoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(180),
            jitter: Duration::from_secs(10),
        }
    }
}

/// Periodically drives [`AlertPoller::run_cycle`]
pub struct PollLoop {
    poller: Arc<AlertPoller>,
    config: PollLoopConfig,
}

impl PollLoop {
    pub fn new(poller: Arc<AlertPoller>, config: PollLoopConfig) -> Self {
        Self { poller, config }
    }

    /// Run until a message (or closure) arrives on `shutdown`
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            jitter_ms = self.config.jitter.as_millis() as u64,
            "Starting alert polling loop"
        );

        loop {
            let report = self.poller.run_cycle(Trigger::Scheduled).await;
            debug!(
                outcome = report.outcome.as_str(),
                elapsed_ms = report.elapsed_ms,
                "Scheduled poll finished"
            );

            tokio::select! {
                _ = sleep(self.next_delay()) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down alert polling loop");
                    break;
                }
            }
        }
    }

    fn next_delay(&self) -> Duration {
        let jitter_ms = rand_jitter(self.config.jitter.as_millis() as u64);
        self.config.interval + Duration::from_millis(jitter_ms)
    }
}

/// Uniform random jitter in `[0, max_ms)`
fn rand_jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..max_ms)
}

/// Builder for the polling loop
pub struct PollLoopBuilder {
    poller: Option<Arc<AlertPoller>>,
    config: PollLoopConfig,
}

impl PollLoopBuilder {
    pub fn new() -> Self {
        Self {
            poller: None,
            config: PollLoopConfig::default(),
        }
    }

    pub fn poller(mut self, poller: Arc<AlertPoller>) -> Self {
        self.poller = Some(poller);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn build(self) -> Result<PollLoop> {
        let poller = self
            .poller
            .ok_or_else(|| BridgeError::Config("poller is required".to_string()))?;
        if self.config.interval.is_zero() {
            return Err(BridgeError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(PollLoop::new(poller, self.config))
    }
}

impl Default for PollLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::DedupCache;
    use crate::dispatcher::{EventDispatcher, RetryPolicy};
    use crate::health::HealthRegistry;
    use crate::observability::StructuredLogger;
    use crate::poller::PollerConfig;
    use crate::session::{SessionConfig, SessionManager};
    use crate::testing::{raw_alert, MockIncident, MockMonitoring, RecordingMetrics};

    fn poller(monitoring: Arc<MockMonitoring>) -> Arc<AlertPoller> {
        let metrics = Arc::new(RecordingMetrics::default());
        let logger = StructuredLogger::new("test");
        let dedup = Arc::new(DedupCache::default());
        let sessions = Arc::new(SessionManager::new(
            monitoring.clone(),
            SessionConfig::default(),
            metrics.clone(),
            logger.clone(),
        ));
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::new(MockIncident::new()),
            "routing-key",
            RetryPolicy::default(),
            dedup.clone(),
            metrics.clone(),
            logger.clone(),
        ));
        Arc::new(AlertPoller::new(
            sessions,
            monitoring,
            dedup,
            dispatcher,
            metrics,
            logger,
            HealthRegistry::new(),
            PollerConfig::default(),
        ))
    }

    #[test]
    fn test_poll_loop_config_default() {
        let config = PollLoopConfig::default();
        assert_eq!(config.interval, Duration::from_secs(180));
        assert_eq!(config.jitter, Duration::from_secs(10));
    }

    #[test]
    fn test_rand_jitter() {
        for _ in 0..100 {
            assert!(rand_jitter(1000) < 1000);
        }
        assert_eq!(rand_jitter(0), 0);
    }

    #[test]
    fn test_builder_requires_poller() {
        assert!(PollLoopBuilder::new().build().is_err());
    }

    #[tokio::test]
    async fn test_builder_rejects_zero_interval() {
        let monitoring = Arc::new(MockMonitoring::new());
        let result = PollLoopBuilder::new()
            .poller(poller(monitoring))
            .interval(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_polls_on_interval_until_shutdown() {
        let monitoring =
            Arc::new(MockMonitoring::new().with_alerts(vec![raw_alert("A1", "Critical")]));
        let poll_loop = PollLoopBuilder::new()
            .poller(poller(monitoring.clone()))
            .interval(Duration::from_secs(180))
            .jitter(Duration::ZERO)
            .build()
            .unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(poll_loop.run(shutdown_rx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(monitoring.list_calls(), 1);

        tokio::time::sleep(Duration::from_secs(180)).await;
        assert_eq!(monitoring.list_calls(), 2);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(monitoring.list_calls(), 2);
    }
}
