//! Bridge configuration

use anyhow::{bail, Context, Result};
use bridge_lib::{
    dispatcher::RetryPolicy,
    monitoring::MonitoringConfig,
    poller::PollerConfig,
    session::SessionConfig,
    DedupKeyMode, PipelineOptions, Severity,
};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Bridge configuration
#[derive(Clone, Deserialize)]
pub struct BridgeConfig {
    /// API server port for probes, metrics and triggers
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Name attached to every structured log event
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    #[serde(default)]
    pub oneview_host: Option<String>,
    #[serde(default)]
    pub oneview_username: Option<String>,
    #[serde(default)]
    pub oneview_password: Option<String>,
    #[serde(default = "default_api_version")]
    pub oneview_api_version: String,
    /// Appliances usually ship self-signed certificates
    #[serde(default)]
    pub oneview_ssl_verify: bool,
    #[serde(default)]
    pub oneview_ca_cert: Option<PathBuf>,

    #[serde(default = "default_session_lifetime")]
    pub session_lifetime_secs: u64,
    #[serde(default = "default_renewal_margin")]
    pub session_renewal_margin_secs: u64,

    #[serde(default)]
    pub pagerduty_routing_key: Option<String>,
    #[serde(default = "default_events_url")]
    pub pagerduty_events_url: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_poll_jitter")]
    pub poll_jitter_secs: u64,
    /// Disable to run in webhook-only mode
    #[serde(default = "default_true")]
    pub polling_enabled: bool,
    #[serde(default = "default_forward_severity")]
    pub forward_severity: String,

    #[serde(default = "default_dedup_ttl")]
    pub dedup_ttl_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub dedup_sweep_interval_secs: u64,
    #[serde(default)]
    pub dedup_key_mode: DedupKeyMode,

    #[serde(default = "default_max_attempts")]
    pub dispatch_max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub dispatch_base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub dispatch_max_delay_ms: u64,

    /// Per-request timeout for both upstream APIs
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_port() -> u16 {
    8080
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_version() -> String {
    "4600".to_string()
}

fn default_session_lifetime() -> u64 {
    23 * 60 * 60
}

fn default_renewal_margin() -> u64 {
    60 * 60
}

fn default_events_url() -> String {
    bridge_lib::incident::DEFAULT_EVENTS_URL.to_string()
}

fn default_poll_interval() -> u64 {
    180
}

fn default_poll_jitter() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_forward_severity() -> String {
    "Critical".to_string()
}

fn default_dedup_ttl() -> u64 {
    24 * 60 * 60
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_request_timeout() -> u64 {
    30
}

impl BridgeConfig {
    /// Load configuration from the optional `BRIDGE_CONFIG` file and
    /// `BRIDGE_*` environment variables (environment wins)
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var("BRIDGE_CONFIG") {
            builder = builder.add_source(config::File::with_name(&path));
        }
        let config = builder
            .add_source(config::Environment::with_prefix("BRIDGE").try_parsing(true))
            .build()
            .context("failed to read configuration")?;

        Self::from_config(config)
    }

    fn from_config(config: config::Config) -> Result<Self> {
        let parsed: BridgeConfig = config
            .try_deserialize()
            .context("invalid configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than zero");
        }
        if self.dedup_sweep_interval_secs == 0 {
            bail!("dedup_sweep_interval_secs must be greater than zero");
        }
        if self.dispatch_max_attempts == 0 {
            bail!("dispatch_max_attempts must be at least 1");
        }
        self.severity()?;
        Ok(())
    }

    pub fn severity(&self) -> Result<Severity> {
        Severity::parse(&self.forward_severity)
            .with_context(|| format!("unknown forward_severity {}", self.forward_severity))
    }

    /// Settings that must be present before the pipeline can run
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let required = [
            ("oneview_host", &self.oneview_host),
            ("oneview_username", &self.oneview_username),
            ("oneview_password", &self.oneview_password),
            ("pagerduty_routing_key", &self.pagerduty_routing_key),
        ];
        required
            .into_iter()
            .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
            .map(|(name, _)| name)
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_jitter(&self) -> Duration {
        Duration::from_secs(self.poll_jitter_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.dedup_sweep_interval_secs)
    }

    /// Monitoring client settings; `None` while credentials are missing
    pub fn monitoring_config(&self) -> Result<Option<MonitoringConfig>> {
        let (Some(host), Some(username), Some(password)) = (
            self.oneview_host.clone(),
            self.oneview_username.clone(),
            self.oneview_password.clone(),
        ) else {
            return Ok(None);
        };

        Ok(Some(MonitoringConfig {
            host,
            username,
            password,
            api_version: self.oneview_api_version.clone(),
            verify_tls: self.oneview_ssl_verify,
            ca_cert_path: self.oneview_ca_cert.clone(),
            request_timeout: self.request_timeout(),
            severity: self.severity()?,
        }))
    }

    pub fn pipeline_options(&self) -> Result<PipelineOptions> {
        let mut options = PipelineOptions::new(
            self.pagerduty_routing_key.clone().unwrap_or_default(),
        );
        options.session = SessionConfig {
            default_lifetime: Duration::from_secs(self.session_lifetime_secs),
            renewal_margin: Duration::from_secs(self.session_renewal_margin_secs),
        };
        options.retry = RetryPolicy {
            max_attempts: self.dispatch_max_attempts,
            base_delay: Duration::from_millis(self.dispatch_base_delay_ms),
            max_delay: Duration::from_millis(self.dispatch_max_delay_ms),
        };
        options.poller = PollerConfig {
            forward_severity: self.severity()?,
            dedup_ttl: Duration::from_secs(self.dedup_ttl_secs),
            key_mode: self.dedup_key_mode,
        };
        options.polling_enabled = self.polling_enabled;
        Ok(options)
    }
}

fn redact(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "<redacted>")
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("api_port", &self.api_port)
            .field("instance_name", &self.instance_name)
            .field("oneview_host", &self.oneview_host)
            .field("oneview_username", &self.oneview_username)
            .field("oneview_password", &redact(&self.oneview_password))
            .field("oneview_api_version", &self.oneview_api_version)
            .field("oneview_ssl_verify", &self.oneview_ssl_verify)
            .field("oneview_ca_cert", &self.oneview_ca_cert)
            .field("session_lifetime_secs", &self.session_lifetime_secs)
            .field("session_renewal_margin_secs", &self.session_renewal_margin_secs)
            .field("pagerduty_routing_key", &redact(&self.pagerduty_routing_key))
            .field("pagerduty_events_url", &self.pagerduty_events_url)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("poll_jitter_secs", &self.poll_jitter_secs)
            .field("polling_enabled", &self.polling_enabled)
            .field("forward_severity", &self.forward_severity)
            .field("dedup_ttl_secs", &self.dedup_ttl_secs)
            .field("dedup_sweep_interval_secs", &self.dedup_sweep_interval_secs)
            .field("dedup_key_mode", &self.dedup_key_mode)
            .field("dispatch_max_attempts", &self.dispatch_max_attempts)
            .field("dispatch_base_delay_ms", &self.dispatch_base_delay_ms)
            .field("dispatch_max_delay_ms", &self.dispatch_max_delay_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(overrides: &[(&str, &str)]) -> Result<BridgeConfig> {
        let mut builder = config::Config::builder();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }
        BridgeConfig::from_config(builder.build()?)
    }

    #[test]
    fn test_defaults() {
        let config = build(&[]).unwrap();

        assert_eq!(config.api_port, 8080);
        assert_eq!(config.poll_interval_secs, 180);
        assert_eq!(config.poll_jitter_secs, 10);
        assert_eq!(config.session_lifetime_secs, 82_800);
        assert_eq!(config.dedup_ttl_secs, 86_400);
        assert_eq!(config.dedup_key_mode, DedupKeyMode::Identity);
        assert!(config.polling_enabled);
        assert!(!config.oneview_ssl_verify);
        assert_eq!(config.severity().unwrap(), Severity::Critical);
    }

    #[test]
    fn test_missing_credentials_are_reported() {
        let config = build(&[("oneview_host", "oneview.local")]).unwrap();

        assert_eq!(
            config.missing_settings(),
            vec!["oneview_username", "oneview_password", "pagerduty_routing_key"]
        );
        assert!(config.monitoring_config().unwrap().is_none());
    }

    #[test]
    fn test_complete_configuration_builds_options() {
        let config = build(&[
            ("oneview_host", "oneview.local"),
            ("oneview_username", "administrator"),
            ("oneview_password", "hunter2"),
            ("pagerduty_routing_key", "R0UT1NG"),
            ("dedup_key_mode", "identity_severity"),
            ("dispatch_max_attempts", "5"),
        ])
        .unwrap();

        assert!(config.missing_settings().is_empty());
        let monitoring = config.monitoring_config().unwrap().unwrap();
        assert_eq!(monitoring.api_version, "4600");

        let options = config.pipeline_options().unwrap();
        assert_eq!(options.routing_key, "R0UT1NG");
        assert_eq!(options.retry.max_attempts, 5);
        assert_eq!(options.poller.key_mode, DedupKeyMode::IdentitySeverity);
        assert_eq!(options.session.renewal_margin, Duration::from_secs(3600));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(build(&[("poll_interval_secs", "0")]).is_err());
        assert!(build(&[("forward_severity", "apocalyptic")]).is_err());
        assert!(build(&[("dispatch_max_attempts", "0")]).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = build(&[
            ("oneview_password", "hunter2"),
            ("pagerduty_routing_key", "R0UT1NG"),
        ])
        .unwrap();

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("R0UT1NG"));
    }
}
