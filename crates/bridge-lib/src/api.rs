//! HTTP surface: probes, metrics, status and pipeline triggers

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinError;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};

use crate::health::{ComponentStatus, HealthRegistry};
use crate::observability::{BridgeMetrics, MetricsRecorder};
use crate::pipeline::{BridgeStatus, Pipeline};
use crate::poller::Trigger;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub instance: String,
    pub health_registry: HealthRegistry,
    pub metrics: BridgeMetrics,
    /// Absent when the bridge is not configured
    pub pipeline: Option<Arc<Pipeline>>,
}

impl AppState {
    pub fn new(
        instance: impl Into<String>,
        health_registry: HealthRegistry,
        metrics: BridgeMetrics,
        pipeline: Option<Arc<Pipeline>>,
    ) -> Self {
        Self {
            instance: instance.into(),
            health_registry,
            metrics,
            pipeline,
        }
    }

    fn pipeline(&self) -> Result<&Arc<Pipeline>, Response> {
        self.pipeline.as_ref().ok_or_else(|| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "missing configuration" })),
            )
                .into_response()
        })
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    instance: String,
    version: &'static str,
    #[serde(flatten)]
    bridge: BridgeStatus,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint; gauges are refreshed at scrape time
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    if let Some(pipeline) = &state.pipeline {
        state.metrics.set_dedup_entries(pipeline.dedup.size());
        state
            .metrics
            .set_session_active(pipeline.sessions.is_valid().await);
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn status(State(state): State<Arc<AppState>>) -> Response {
    let pipeline = match state.pipeline() {
        Ok(pipeline) => pipeline,
        Err(response) => return response,
    };

    Json(StatusResponse {
        instance: state.instance.clone(),
        version: env!("CARGO_PKG_VERSION"),
        bridge: pipeline.status().await,
    })
    .into_response()
}

fn task_failed(task: &str, e: JoinError) -> Response {
    error!(task, error = %e, "Pipeline task did not complete");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": format!("{} did not complete", task) })),
    )
        .into_response()
}

/// Push path: accepts one alert object or an array of them
async fn webhook(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    let pipeline = match state.pipeline() {
        Ok(pipeline) => pipeline,
        Err(response) => return response,
    };

    let entries = match body {
        Value::Array(items) => items,
        other => vec![other],
    };
    info!(count = entries.len(), "Received webhook alerts");

    match pipeline.poller.spawn_ingest(entries).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => task_failed("webhook ingest", e),
    }
}

async fn force_poll(State(state): State<Arc<AppState>>) -> Response {
    let pipeline = match state.pipeline() {
        Ok(pipeline) => pipeline,
        Err(response) => return response,
    };

    let report = match pipeline.poller.spawn_cycle(Trigger::Manual).await {
        Ok(report) => report,
        Err(e) => return task_failed("manual poll", e),
    };
    let status_code = if report.coalesced {
        StatusCode::CONFLICT
    } else {
        StatusCode::OK
    };
    (status_code, Json(report)).into_response()
}

async fn test_connection(State(state): State<Arc<AppState>>) -> Response {
    let pipeline = match state.pipeline() {
        Ok(pipeline) => pipeline,
        Err(response) => return response,
    };

    match pipeline.poller.test_connection().await {
        Ok(count) => Json(json!({
            "connected": true,
            "alert_count": count,
        }))
        .into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "connected": false,
                "error": e.to_string(),
            })),
        )
            .into_response(),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .route("/webhook", post(webhook))
        .route("/force-poll", post(force_poll))
        .route("/test-connection", get(test_connection))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}
