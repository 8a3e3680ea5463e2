//! Incident API client (PagerDuty Events API v2)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::models::NormalizedAlert;
use crate::monitoring::check_status;

/// Default Events API v2 endpoint
pub const DEFAULT_EVENTS_URL: &str = "https://events.pagerduty.com/v2/enqueue";

/// Delivery of incident events
#[async_trait]
pub trait IncidentApi: Send + Sync {
    /// Submit one event; `Ok` means the API accepted it
    async fn submit_event(&self, event: &IncidentEvent) -> Result<()>;
}

/// Event envelope sent to the incident API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentEvent {
    pub routing_key: String,
    pub event_action: String,
    pub dedup_key: String,
    pub payload: IncidentPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentPayload {
    pub summary: String,
    pub severity: String,
    pub source: String,
    pub timestamp: String,
    pub component: String,
    pub group: String,
    pub class: String,
    pub custom_details: CustomDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomDetails {
    pub alert_id: String,
    pub resource_name: String,
    pub resource_category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    pub severity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgency: Option<String>,
}

impl IncidentEvent {
    /// Build a `trigger` event for a normalized alert
    pub fn trigger(routing_key: &str, alert: &NormalizedAlert) -> Self {
        let timestamp = alert
            .created
            .clone()
            .unwrap_or_else(|| alert.first_seen_at.to_rfc3339());

        Self {
            routing_key: routing_key.to_string(),
            event_action: "trigger".to_string(),
            dedup_key: alert.dedup_key.clone(),
            payload: IncidentPayload {
                summary: alert.summary(),
                severity: alert.severity.incident_severity().to_string(),
                source: alert.source.clone(),
                timestamp,
                component: alert.resource_name.clone(),
                group: alert.category.clone(),
                class: alert
                    .alert_type
                    .clone()
                    .unwrap_or_else(|| "Alert".to_string()),
                custom_details: CustomDetails {
                    alert_id: alert.identity.clone(),
                    resource_name: alert.resource_name.clone(),
                    resource_category: alert.category.clone(),
                    alert_type: alert.alert_type.clone(),
                    description: alert.description.clone(),
                    created: alert.created.clone(),
                    modified: alert.modified.clone(),
                    severity: alert.severity.to_string(),
                    health_category: alert.health_category.clone(),
                    urgency: alert.urgency.clone(),
                },
            },
        }
    }
}

/// Events API v2 client
pub struct PagerDutyClient {
    client: Client,
    events_url: String,
}

impl PagerDutyClient {
    pub fn new(events_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let events_url = events_url.into();
        url::Url::parse(&events_url)
            .map_err(|e| BridgeError::Config(format!("invalid events URL {}: {}", events_url, e)))?;

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BridgeError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, events_url })
    }
}

#[async_trait]
impl IncidentApi for PagerDutyClient {
    async fn submit_event(&self, event: &IncidentEvent) -> Result<()> {
        let response = self
            .client
            .post(&self.events_url)
            .json(event)
            .send()
            .await?;

        let response = check_status(response).await?;
        debug!(
            dedup_key = %event.dedup_key,
            status = response.status().as_u16(),
            "Incident event accepted"
        );
        Ok(())
    }
}
