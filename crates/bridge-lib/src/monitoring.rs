//! Client for the monitoring appliance REST API
//!
//! Speaks the HPE OneView dialect: session login at `/rest/login-sessions`,
//! alert listing at `/rest/alerts` with server-side filtering and
//! `nextPageUri` pagination.

use async_trait::async_trait;
use reqwest::{Certificate, Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{BridgeError, Result};
use crate::models::{AuthGrant, Severity};

/// Upper bound on followed `nextPageUri` links per listing
const MAX_PAGES: usize = 50;

/// Operations the pipeline needs from the monitoring appliance
#[async_trait]
pub trait MonitoringApi: Send + Sync {
    /// Log in and obtain a session credential
    async fn authenticate(&self) -> Result<AuthGrant>;

    /// List current alerts as raw JSON entries, newest first
    async fn list_alerts(&self, token: &str) -> Result<Vec<Value>>;
}

/// Connection settings for the monitoring appliance
#[derive(Clone)]
pub struct MonitoringConfig {
    /// Host name or base URL; `https://` is assumed when no scheme is given
    pub host: String,
    pub username: String,
    pub password: String,
    /// Value sent in the `X-API-Version` header
    pub api_version: String,
    pub verify_tls: bool,
    /// Extra PEM bundle trusted for the appliance certificate
    pub ca_cert_path: Option<PathBuf>,
    pub request_timeout: Duration,
    /// Severity requested through the server-side filter
    pub severity: Severity,
}

impl std::fmt::Debug for MonitoringConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoringConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("verify_tls", &self.verify_tls)
            .field("ca_cert_path", &self.ca_cert_path)
            .field("request_timeout", &self.request_timeout)
            .field("severity", &self.severity)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(rename = "sessionID")]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlertPage {
    #[serde(default)]
    members: Vec<Value>,
    #[serde(default)]
    next_page_uri: Option<String>,
}

/// REST client for a OneView appliance
pub struct OneViewClient {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
    api_version: String,
    severity: Severity,
    max_pages: usize,
}

impl OneViewClient {
    pub fn new(config: MonitoringConfig) -> Result<Self> {
        let base_url = normalize_base_url(&config.host)?;

        let mut builder = Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(!config.verify_tls);

        if let Some(path) = &config.ca_cert_path {
            let pem = std::fs::read(path).map_err(|e| {
                BridgeError::Config(format!("failed to read CA bundle {}: {}", path.display(), e))
            })?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| BridgeError::Config(format!("invalid CA bundle: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| BridgeError::Config(format!("failed to create HTTP client: {}", e)))?;

        info!(
            base_url = %base_url,
            verify_tls = config.verify_tls,
            "Monitoring client initialized"
        );

        Ok(Self {
            client,
            base_url,
            username: config.username,
            password: config.password,
            api_version: config.api_version,
            severity: config.severity,
            max_pages: MAX_PAGES,
        })
    }

    /// Cap on pages followed per listing
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| BridgeError::Config(format!("invalid path {}: {}", path, e)))
    }

    async fn get_page(&self, url: Url, token: &str) -> Result<AlertPage> {
        let response = self
            .client
            .get(url)
            .header("Auth", token)
            .header("X-API-Version", &self.api_version)
            .send()
            .await?;

        let response = check_status(response).await?;
        response
            .json::<AlertPage>()
            .await
            .map_err(|e| BridgeError::Malformed(format!("alert list: {}", e)))
    }
}

#[async_trait]
impl MonitoringApi for OneViewClient {
    async fn authenticate(&self) -> Result<AuthGrant> {
        let url = self.endpoint("/rest/login-sessions")?;

        let response = self
            .client
            .post(url)
            .header("X-API-Version", &self.api_version)
            .json(&json!({
                "userName": self.username,
                "password": self.password,
            }))
            .send()
            .await?;

        let response = check_status(response).await?;
        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::Malformed(format!("login response: {}", e)))?;

        let token = login
            .session_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BridgeError::Auth("login response carried no sessionID".to_string()))?;

        Ok(AuthGrant {
            token,
            lifetime: None,
        })
    }

    async fn list_alerts(&self, token: &str) -> Result<Vec<Value>> {
        let mut url = self.endpoint("/rest/alerts")?;
        url.query_pairs_mut()
            .append_pair("filter", &format!("severity='{}'", self.severity))
            .append_pair("sort", "created:desc");

        let mut alerts = Vec::new();
        let mut pages = 0usize;
        let mut next_url = Some(url);
        while let Some(url) = next_url.take() {
            if pages == self.max_pages {
                warn!(
                    max_pages = self.max_pages,
                    fetched = alerts.len(),
                    pending = %url,
                    "Alert listing truncated at page limit, remaining alerts not fetched"
                );
                break;
            }

            let page = self.get_page(url, token).await?;
            pages += 1;
            alerts.extend(page.members);

            if let Some(next) = page.next_page_uri.filter(|uri| !uri.is_empty()) {
                debug!(page = pages, next = %next, "Following alert pagination");
                next_url = Some(self.endpoint(&next)?);
            }
        }

        debug!(count = alerts.len(), "Retrieved alerts from monitoring API");
        Ok(alerts)
    }
}

/// Turn a configured host into a base URL, defaulting to HTTPS
fn normalize_base_url(host: &str) -> Result<Url> {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return Err(BridgeError::Config("monitoring host is empty".to_string()));
    }

    let with_scheme = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    };

    Url::parse(&with_scheme)
        .map_err(|e| BridgeError::Config(format!("invalid monitoring host {}: {}", host, e)))
}

/// Pass through 2xx responses, map everything else to a typed error
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BridgeError::from_status(status.as_u16(), body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn config(host: String) -> MonitoringConfig {
        MonitoringConfig {
            host,
            username: "administrator".into(),
            password: "hunter2".into(),
            api_version: "4600".into(),
            verify_tls: true,
            ca_cert_path: None,
            request_timeout: Duration::from_secs(5),
            severity: Severity::Critical,
        }
    }

    #[test]
    fn test_base_url_defaults_to_https() {
        assert_eq!(
            normalize_base_url("oneview.example.com").unwrap().as_str(),
            "https://oneview.example.com/"
        );
        assert_eq!(
            normalize_base_url("http://127.0.0.1:8443/").unwrap().as_str(),
            "http://127.0.0.1:8443/"
        );
        assert!(normalize_base_url("  ").is_err());
    }

    #[test]
    fn test_config_debug_redacts_password() {
        let rendered = format!("{:?}", config("oneview".into()));
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_authenticate_returns_session_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/login-sessions")
            .match_header("x-api-version", "4600")
            .match_body(Matcher::PartialJson(json!({
                "userName": "administrator",
                "password": "hunter2"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"sessionID":"LTE2NjQ"}"#)
            .create_async()
            .await;

        let client = OneViewClient::new(config(server.url())).unwrap();
        let grant = client.authenticate().await.unwrap();

        assert_eq!(grant.token, "LTE2NjQ");
        assert!(grant.lifetime.is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_authenticate_maps_401_to_auth_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/login-sessions")
            .with_status(401)
            .with_body("invalid credentials")
            .create_async()
            .await;

        let client = OneViewClient::new(config(server.url())).unwrap();
        let err = client.authenticate().await.unwrap_err();

        assert!(matches!(err, BridgeError::Auth(_)));
    }

    #[tokio::test]
    async fn test_list_alerts_sends_filter_and_follows_pages() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/rest/alerts")
            .match_header("auth", "session-1")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("filter".into(), "severity='Critical'".into()),
                Matcher::UrlEncoded("sort".into(), "created:desc".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "members": [{"uri": "/rest/alerts/1", "severity": "Critical"}],
                    "nextPageUri": "/rest/alerts?start=1&count=1"
                })
                .to_string(),
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/rest/alerts")
            .match_query(Matcher::UrlEncoded("start".into(), "1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "members": [{"uri": "/rest/alerts/2", "severity": "Critical"}],
                    "nextPageUri": null
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = OneViewClient::new(config(server.url())).unwrap();
        let alerts = client.list_alerts("session-1").await.unwrap();

        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[1]["uri"], "/rest/alerts/2");
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_alerts_stops_at_page_limit() {
        let mut server = mockito::Server::new_async().await;
        let pages = server
            .mock("GET", "/rest/alerts")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "members": [{"uri": "/rest/alerts/1", "severity": "Critical"}],
                    "nextPageUri": "/rest/alerts?start=1&count=1"
                })
                .to_string(),
            )
            .expect(2)
            .create_async()
            .await;

        let client = OneViewClient::new(config(server.url()))
            .unwrap()
            .with_max_pages(2);
        let alerts = client.list_alerts("session-1").await.unwrap();

        assert_eq!(alerts.len(), 2);
        pages.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_alerts_maps_server_error_to_network() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/alerts")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let client = OneViewClient::new(config(server.url())).unwrap();
        let err = client.list_alerts("session-1").await.unwrap_err();

        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_missing_ca_bundle_is_config_error() {
        let mut cfg = config("oneview".into());
        cfg.ca_cert_path = Some(PathBuf::from("/nonexistent/ca.pem"));

        assert!(matches!(OneViewClient::new(cfg), Err(BridgeError::Config(_))));
    }
}
