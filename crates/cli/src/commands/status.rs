//! Status and health commands

use anyhow::Result;
use reqwest::Method;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, BridgeStatus, HealthReport, Readiness};
use crate::output::{
    color_status, format_optional_timestamp, format_unix, print_info, print_json, print_table,
    print_warning, OutputFormat,
};

/// Key/value row used for status output
#[derive(Debug, Tabled, Serialize)]
pub struct FieldRow {
    #[tabled(rename = "Field")]
    pub field: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl FieldRow {
    fn new(field: &str, value: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Tabled, Serialize)]
pub struct ComponentRow {
    #[tabled(rename = "Component")]
    pub component: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Message")]
    pub message: String,
    #[tabled(rename = "Checked")]
    pub checked: String,
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Build the status rows shown by `bridgectl status`
pub fn status_rows(status: &BridgeStatus) -> Vec<FieldRow> {
    let session = &status.session;
    let poller = &status.poller;

    vec![
        FieldRow::new("Instance", status.instance.clone()),
        FieldRow::new("Version", status.version.clone()),
        FieldRow::new("Polling", yes_no(status.polling_enabled)),
        FieldRow::new("Session", color_status(&session.state)),
        FieldRow::new(
            "Session issued",
            format_optional_timestamp(session.issued_at.as_deref()),
        ),
        FieldRow::new(
            "Session renews",
            format_optional_timestamp(session.renews_at.as_deref()),
        ),
        FieldRow::new("Cycles run", poller.cycles_run.to_string()),
        FieldRow::new("Cycle running", yes_no(poller.running)),
        FieldRow::new(
            "Last cycle",
            format_optional_timestamp(poller.last_cycle_at.as_deref()),
        ),
        FieldRow::new(
            "Last outcome",
            poller
                .last_outcome
                .as_deref()
                .map(color_status)
                .unwrap_or_else(|| "-".to_string()),
        ),
        FieldRow::new("Dedup entries", status.dedup_entries.to_string()),
    ]
}

/// Show the bridge pipeline status
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status: BridgeStatus = client.get("status").await?;

    match format {
        OutputFormat::Json => print_json(&status),
        OutputFormat::Table => {
            print_table(&status_rows(&status), format);

            if let Some(err) = &status.session.last_error {
                print_warning(&format!("Last session error: {}", err));
            }
            if let Some(err) = &status.poller.last_error {
                print_warning(&format!("Last cycle error: {}", err));
            }
        }
    }

    Ok(())
}

/// Show component health and readiness
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    // Probes answer 503 with a body when unhealthy or not ready
    let (_, health): (_, HealthReport) = client.request(Method::GET, "healthz").await?;
    let (_, readiness): (_, Readiness) = client.request(Method::GET, "readyz").await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "health": health,
            "readiness": readiness,
        })),
        OutputFormat::Table => {
            let rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    component: name.clone(),
                    status: color_status(&component.status),
                    message: component.message.clone().unwrap_or_else(|| "-".to_string()),
                    checked: format_unix(component.last_check_timestamp),
                })
                .collect();

            print_info(&format!("Overall: {}", color_status(&health.status)));
            print_table(&rows, format);

            if readiness.ready {
                print_info(&format!("Ready: {}", color_status("yes")));
            } else {
                print_warning(&format!(
                    "Not ready: {}",
                    readiness.reason.as_deref().unwrap_or("unknown")
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{PollerStatus, SessionStatus};

    #[test]
    fn test_status_rows_without_history() {
        colored::control::set_override(false);
        let status = BridgeStatus {
            instance: "bridge-0".to_string(),
            version: "0.1.0".to_string(),
            polling_enabled: false,
            session: SessionStatus {
                state: "unauthenticated".to_string(),
                valid: false,
                issued_at: None,
                renews_at: None,
                last_error: None,
            },
            poller: PollerStatus {
                running: false,
                cycles_run: 0,
                last_cycle_at: None,
                last_outcome: None,
                last_error: None,
            },
            dedup_entries: 0,
        };

        let rows = status_rows(&status);
        let value = |field: &str| {
            rows.iter()
                .find(|r| r.field == field)
                .map(|r| r.value.clone())
                .unwrap()
        };

        assert_eq!(value("Polling"), "no");
        assert_eq!(value("Session"), "unauthenticated");
        assert_eq!(value("Last outcome"), "-");
        assert_eq!(value("Last cycle"), "-");
    }
}
