//! Alert bridge library
//!
//! Forwards critical alerts from a monitoring appliance to an incident API:
//! - Session management against the monitoring API
//! - Alert polling, normalization and filtering
//! - Time-bounded deduplication
//! - Incident delivery with retry and rollback
//! - Health checks, metrics and the HTTP surface

pub mod api;
pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod incident;
pub mod models;
pub mod monitoring;
pub mod observability;
pub mod pipeline;
pub mod poller;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{BridgeError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{BridgeMetrics, MetricsRecorder, StructuredLogger};
pub use pipeline::{BridgeStatus, Pipeline, PipelineOptions};
