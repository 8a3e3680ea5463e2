//! Manual poll and connectivity check

use anyhow::Result;
use reqwest::{Method, StatusCode};
use tabled::Tabled;

use crate::client::{decode_success, ApiClient, ConnectionReport, CycleReport};
use crate::output::{
    color_status, print_error, print_json, print_success, print_table, print_warning,
    OutputFormat,
};

#[derive(Debug, Tabled, serde::Serialize)]
struct CycleRow {
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Received")]
    received: usize,
    #[tabled(rename = "Malformed")]
    malformed: usize,
    #[tabled(rename = "Filtered")]
    filtered: usize,
    #[tabled(rename = "Duplicates")]
    duplicates: usize,
    #[tabled(rename = "Dispatched")]
    dispatched: usize,
    #[tabled(rename = "Failed")]
    failed: usize,
    #[tabled(rename = "Swept")]
    swept: usize,
    #[tabled(rename = "Elapsed")]
    elapsed: String,
}

impl From<&CycleReport> for CycleRow {
    fn from(report: &CycleReport) -> Self {
        Self {
            outcome: color_status(&report.outcome),
            received: report.received,
            malformed: report.malformed,
            filtered: report.filtered,
            duplicates: report.duplicates,
            dispatched: report.dispatched,
            failed: report.failed,
            swept: report.swept,
            elapsed: format!("{}ms", report.elapsed_ms),
        }
    }
}

/// Run one poll cycle now
pub async fn force_poll(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (status, body): (StatusCode, serde_json::Value) =
        client.request(Method::POST, "force-poll").await?;

    if status == StatusCode::CONFLICT {
        print_warning("A poll cycle is already running; request was coalesced");
        return Ok(());
    }
    let report: CycleReport = decode_success(status, body)?;

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => {
            print_table(&[CycleRow::from(&report)], format);
            match &report.error {
                Some(err) => print_error(&format!("Cycle failed: {}", err)),
                None => print_success(&format!(
                    "Forwarded {} alert(s) to the incident API",
                    report.dispatched
                )),
            }
        }
    }

    Ok(())
}

/// Re-authenticate against the monitoring API and count alerts
pub async fn test_connection(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (status, report): (StatusCode, ConnectionReport) =
        client.request(Method::GET, "test-connection").await?;

    if let OutputFormat::Json = format {
        print_json(&report);
    } else if report.connected {
        print_success(&format!(
            "Connected to monitoring API ({} alert(s) visible)",
            report.alert_count.unwrap_or(0)
        ));
    } else {
        print_error(&format!(
            "Connection failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        ));
    }

    if !report.connected {
        anyhow::bail!("connection test failed ({})", status);
    }
    Ok(())
}
