//! Monitoring API session management
//!
//! Owns the bearer credential used against the monitoring appliance.
//! Renewal is single-flight: one caller authenticates, every concurrent
//! caller waits for that attempt's result instead of starting its own.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::monitoring::MonitoringApi;
use crate::observability::{MetricsRecorder, StructuredLogger};

/// Session lifetime assumed when the upstream does not declare one (23 hours)
pub const DEFAULT_SESSION_LIFETIME: Duration = Duration::from_secs(23 * 60 * 60);

/// Renew this long before the declared lifetime runs out
pub const DEFAULT_RENEWAL_MARGIN: Duration = Duration::from_secs(60 * 60);

/// Session timing configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub default_lifetime: Duration,
    pub renewal_margin: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_lifetime: DEFAULT_SESSION_LIFETIME,
            renewal_margin: DEFAULT_RENEWAL_MARGIN,
        }
    }
}

/// Position in the session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Active,
    /// Renewal point reached; the next `ensure_valid` re-authenticates
    NearExpiry,
    /// Last attempt failed; behaves like `Unauthenticated`
    Failed,
}

/// Authenticated session against the monitoring API
#[derive(Clone)]
pub struct Session {
    pub token: String,
    pub issued_at: Instant,
    /// Declared lifetime minus the renewal margin
    pub expires_at: Instant,
    pub valid: bool,
    issued_wall: DateTime<Utc>,
}

impl Session {
    fn is_usable(&self, now: Instant) -> bool {
        self.valid && now < self.expires_at
    }

    fn expires_wall(&self) -> DateTime<Utc> {
        let remaining = self.expires_at.saturating_duration_since(self.issued_at);
        self.issued_wall + chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("valid", &self.valid)
            .finish()
    }
}

/// Read-only view of the session for health surfaces
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renews_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Shared result of one authentication attempt
type AuthSlot = Option<Result<String>>;

struct SessionInner {
    session: Option<Session>,
    state: SessionState,
    last_error: Option<String>,
    inflight: Option<watch::Receiver<AuthSlot>>,
}

impl SessionInner {
    /// An in-flight attempt whose leader vanished without publishing a result
    fn inflight_is_stale(&self) -> bool {
        match &self.inflight {
            Some(rx) => rx.has_changed().is_err() && rx.borrow().is_none(),
            None => false,
        }
    }

    /// Forget an abandoned attempt so the next caller can lead a new one
    fn clear_stale_inflight(&mut self) {
        if self.inflight_is_stale() {
            self.inflight = None;
            if self.state == SessionState::Authenticating {
                self.state = SessionState::Unauthenticated;
            }
        }
    }
}

/// Issues and renews the monitoring API credential
pub struct SessionManager {
    api: Arc<dyn MonitoringApi>,
    config: SessionConfig,
    metrics: Arc<dyn MetricsRecorder>,
    logger: StructuredLogger,
    inner: Mutex<SessionInner>,
}

impl SessionManager {
    pub fn new(
        api: Arc<dyn MonitoringApi>,
        config: SessionConfig,
        metrics: Arc<dyn MetricsRecorder>,
        logger: StructuredLogger,
    ) -> Self {
        metrics.set_session_active(false);
        Self {
            api,
            config,
            metrics,
            logger,
            inner: Mutex::new(SessionInner {
                session: None,
                state: SessionState::Unauthenticated,
                last_error: None,
                inflight: None,
            }),
        }
    }

    /// Return a usable token, authenticating first when needed.
    pub async fn ensure_valid(&self) -> Result<String> {
        loop {
            let mut rx = {
                let mut inner = self.inner.lock().await;

                if let Some(session) = inner.session.as_ref() {
                    if session.is_usable(Instant::now()) {
                        return Ok(session.token.clone());
                    }
                }

                inner.clear_stale_inflight();

                match inner.inflight.clone() {
                    Some(rx) => rx,
                    None => {
                        let (tx, rx) = watch::channel(None);
                        inner.inflight = Some(rx);
                        inner.state = SessionState::Authenticating;
                        drop(inner);
                        return self.authenticate(tx).await;
                    }
                }
            };

            debug!("Waiting for in-flight authentication");
            let shared = match rx.wait_for(|slot| slot.is_some()).await {
                Ok(slot) => slot.clone(),
                // Leader dropped before publishing; take over on the next pass
                Err(_) => None,
            };
            if let Some(result) = shared {
                return result;
            }
        }
    }

    /// Perform the single in-flight authentication and publish its result
    async fn authenticate(&self, tx: watch::Sender<AuthSlot>) -> Result<String> {
        let started = Instant::now();
        let result = self.api.authenticate().await;
        self.metrics
            .observe_auth_duration(started.elapsed().as_secs_f64());

        let mut inner = self.inner.lock().await;
        inner.inflight = None;

        let outcome = match result {
            Ok(grant) => {
                let now = Instant::now();
                let lifetime = grant.lifetime.unwrap_or(self.config.default_lifetime);
                let effective = lifetime.saturating_sub(self.config.renewal_margin);
                if effective.is_zero() {
                    warn!(
                        lifetime_secs = lifetime.as_secs(),
                        margin_secs = self.config.renewal_margin.as_secs(),
                        "Session lifetime shorter than renewal margin, token will be renewed on next use"
                    );
                }

                inner.session = Some(Session {
                    token: grant.token.clone(),
                    issued_at: now,
                    expires_at: now + effective,
                    valid: true,
                    issued_wall: Utc::now(),
                });
                inner.state = SessionState::Active;
                inner.last_error = None;
                self.metrics.set_session_active(true);
                self.logger.log_session_renewed(effective.as_secs());
                Ok(grant.token)
            }
            Err(e) => {
                inner.session = None;
                inner.state = SessionState::Failed;
                inner.last_error = Some(e.to_string());
                self.metrics.set_session_active(false);
                warn!(error = %e, "Authentication with monitoring API failed");
                Err(e)
            }
        };
        drop(inner);

        tx.send_replace(Some(outcome.clone()));
        outcome
    }

    /// Mark the session unusable, forcing the next `ensure_valid` to re-authenticate
    pub async fn invalidate(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(session) = inner.session.as_mut() {
            session.valid = false;
        }
        if inner.inflight.is_none() {
            inner.state = SessionState::Unauthenticated;
        }
        self.metrics.set_session_active(false);
        info!("Monitoring API session invalidated");
    }

    /// Whether a usable token is currently held
    pub async fn is_valid(&self) -> bool {
        let inner = self.inner.lock().await;
        inner
            .session
            .as_ref()
            .map(|s| s.is_usable(Instant::now()))
            .unwrap_or(false)
    }

    /// Point-in-time view for health and status endpoints
    pub async fn snapshot(&self) -> SessionSnapshot {
        let mut inner = self.inner.lock().await;
        inner.clear_stale_inflight();
        let now = Instant::now();

        let state = match (inner.state, inner.session.as_ref()) {
            (SessionState::Authenticating, _) => SessionState::Authenticating,
            (_, Some(session)) if session.is_usable(now) => SessionState::Active,
            (_, Some(session)) if session.valid => SessionState::NearExpiry,
            (state, _) => state,
        };

        SessionSnapshot {
            state,
            valid: matches!(state, SessionState::Active),
            issued_at: inner.session.as_ref().map(|s| s.issued_wall),
            renews_at: inner.session.as_ref().map(|s| s.expires_wall()),
            last_error: inner.last_error.clone(),
        }
    }
}
