//! Alert deduplication cache
//!
//! Holds the keys of alerts that were forwarded (or are being forwarded)
//! within the retention window. Admission is an atomic check-and-insert on a
//! sharded concurrent map, so two callers can never both admit the same key.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant};
use tracing::{debug, info};

use crate::health::{components, HealthRegistry};
use crate::observability::MetricsRecorder;

/// Default retention window (24 hours)
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A recorded admission
#[derive(Debug, Clone)]
pub struct DedupEntry {
    pub dedup_key: String,
    pub recorded_at: Instant,
    pub expires_at: Instant,
}

impl DedupEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// Bounded-retention set of alert keys
#[derive(Debug)]
pub struct DedupCache {
    entries: DashMap<String, DedupEntry>,
    default_ttl: Duration,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_TTL)
    }
}

impl DedupCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    /// Retention applied by callers that do not pick their own TTL
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Admit `dedup_key` unless an unexpired entry already holds it.
    ///
    /// Returns true when the caller now owns the key and must dispatch.
    pub fn try_admit(&self, dedup_key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let entry = DedupEntry {
            dedup_key: dedup_key.to_string(),
            recorded_at: now,
            expires_at: now + ttl,
        };

        match self.entries.entry(dedup_key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(entry);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                true
            }
        }
    }

    /// Drop an admission early so the key can be admitted again
    pub fn release(&self, dedup_key: &str) -> bool {
        let removed = self.entries.remove(dedup_key).is_some();
        if removed {
            debug!(dedup_key = %dedup_key, "Released dedup admission");
        }
        removed
    }

    /// Remove every entry whose `expires_at` has passed.
    ///
    /// Shards are locked one at a time.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0usize;

        self.entries.retain(|_, entry| {
            if entry.is_expired(now) {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            info!(removed = removed, remaining = self.entries.len(), "Swept expired alert records");
        }
        removed
    }

    /// Number of entries currently held, expired or not
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Forget every admission
    pub fn reset(&self) {
        self.entries.clear();
        info!("Dedup cache reset");
    }

    /// Sweep periodically until shutdown.
    ///
    /// Each sweep refreshes the `dedup_cache` health component. Once the
    /// sweeper stops the component reports degraded.
    pub async fn run_sweeper(
        self: Arc<Self>,
        every: Duration,
        metrics: Arc<dyn MetricsRecorder>,
        health: HealthRegistry,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(interval_secs = every.as_secs(), "Starting dedup sweeper");
        let mut ticker = interval(every);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                    metrics.set_dedup_entries(self.size());
                    health.set_healthy(components::DEDUP_CACHE).await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down dedup sweeper");
                    break;
                }
            }
        }

        health
            .set_degraded(components::DEDUP_CACHE, "sweeper stopped")
            .await;
    }
}
