//! Configuration management for XCW
//!
//! Values come from built-in defaults, then an optional TOML/JSON/YAML file,
//! then `XCW__`-prefixed environment variables (`XCW__APP__NAME=demo`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static APP_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-z0-9]+$").expect("valid app name pattern"));

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application identity and topic names
    pub app: AppSection,

    /// Upstream service endpoints
    pub aws: AwsConfig,

    /// Scan configuration
    pub scan: ScanConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Application identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// Unique lowercase alphanumeric app name
    pub name: String,
    /// Topic feeding SMS subscribers; defaults to `<name>-xcw-event`
    pub event_topic: Option<String>,
    /// Topic feeding email subscribers; defaults to `<name>-xcw-alarm`
    pub alarm_topic: Option<String>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "xcw".to_string(),
            event_topic: None,
            alarm_topic: None,
        }
    }
}

impl AppSection {
    /// Name of the SMS (event) topic
    pub fn event_topic(&self) -> String {
        self.event_topic
            .clone()
            .unwrap_or_else(|| format!("{}-xcw-event", self.name))
    }

    /// Name of the email (alarm) topic
    pub fn alarm_topic(&self) -> String {
        self.alarm_topic
            .clone()
            .unwrap_or_else(|| format!("{}-xcw-alarm", self.name))
    }
}

/// Upstream endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    /// Region the traced services run in
    pub region: String,
    /// Service graph endpoint override
    pub xray_endpoint: Option<String>,
    /// Topic registry endpoint override
    pub sns_endpoint: Option<String>,
    /// Event bus endpoint override
    pub events_endpoint: Option<String>,
    /// Metric store endpoint override
    pub monitoring_endpoint: Option<String>,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Access key id; falls back to `AWS_ACCESS_KEY_ID`
    pub access_key_id: Option<String>,
    /// Secret access key; falls back to `AWS_SECRET_ACCESS_KEY`
    #[serde(skip_serializing)]
    pub secret_access_key: Option<String>,
    /// Session token; falls back to `AWS_SESSION_TOKEN`
    #[serde(skip_serializing)]
    pub session_token: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: "us-west-2".to_string(),
            xray_endpoint: None,
            sns_endpoint: None,
            events_endpoint: None,
            monitoring_endpoint: None,
            request_timeout: Duration::from_secs(30),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
        }
    }
}

impl AwsConfig {
    fn regional(&self, service: &str, explicit: Option<&String>) -> String {
        explicit
            .cloned()
            .unwrap_or_else(|| format!("https://{service}.{}.amazonaws.com", self.region))
    }

    /// Configured override for `service` (`xray`, `sns`, `events`, `monitoring`)
    pub fn endpoint_override(&self, service: &str) -> Option<&String> {
        match service {
            "xray" => self.xray_endpoint.as_ref(),
            "sns" => self.sns_endpoint.as_ref(),
            "events" => self.events_endpoint.as_ref(),
            "monitoring" => self.monitoring_endpoint.as_ref(),
            _ => None,
        }
    }

    /// Endpoint for `service`, the override or the regional default
    pub fn endpoint(&self, service: &str) -> String {
        self.regional(service, self.endpoint_override(service))
    }

    /// Service graph endpoint
    pub fn xray_endpoint(&self) -> String {
        self.regional("xray", self.xray_endpoint.as_ref())
    }

    /// Topic registry endpoint
    pub fn sns_endpoint(&self) -> String {
        self.regional("sns", self.sns_endpoint.as_ref())
    }

    /// Event bus endpoint
    pub fn events_endpoint(&self) -> String {
        self.regional("events", self.events_endpoint.as_ref())
    }

    /// Metric store endpoint
    pub fn monitoring_endpoint(&self) -> String {
        self.regional("monitoring", self.monitoring_endpoint.as_ref())
    }
}

/// Scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Policy document location
    pub policy_path: PathBuf,
    /// Time between cycles in `run` mode; defaults to the policy's window
    #[serde(with = "humantime_serde")]
    pub interval: Option<Duration>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            policy_path: PathBuf::from("xraycloudwatchevent.json"),
            interval: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load defaults, then `path` if given, then `XCW__*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("XCW")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the rest of the crate relies on
    pub fn validate(&self) -> Result<()> {
        if !APP_NAME_PATTERN.is_match(&self.app.name) {
            return Err(Error::config(format!(
                "app name '{}' must match ^[a-z0-9]+$",
                self.app.name
            )));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(Error::config(format!(
                "logging format '{}' must be 'pretty' or 'json'",
                self.logging.format
            )));
        }

        if self.aws.request_timeout.is_zero() {
            return Err(Error::config("request timeout must be positive"));
        }

        if self.scan.interval.is_some_and(|interval| interval.is_zero()) {
            return Err(Error::config("scan interval must be positive"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        config.validate().unwrap();
        assert_eq!(config.app.event_topic(), "xcw-xcw-event");
        assert_eq!(config.app.alarm_topic(), "xcw-xcw-alarm");
        assert_eq!(config.aws.xray_endpoint(), "https://xray.us-west-2.amazonaws.com");
        assert_eq!(config.aws.request_timeout, Duration::from_secs(30));
        assert_eq!(config.scan.interval, None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[app]
name = "shop"
event_topic = "shop-sms"

[aws]
region = "eu-west-1"
sns_endpoint = "http://localhost:4566"
request_timeout = "5s"

[scan]
policy_path = "/etc/xcw/policy.json"
interval = "10m"

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.app.name, "shop");
        assert_eq!(config.app.event_topic(), "shop-sms");
        assert_eq!(config.app.alarm_topic(), "shop-xcw-alarm");
        assert_eq!(config.aws.sns_endpoint(), "http://localhost:4566");
        assert_eq!(config.aws.events_endpoint(), "https://events.eu-west-1.amazonaws.com");
        assert_eq!(config.aws.request_timeout, Duration::from_secs(5));
        assert_eq!(config.scan.interval, Some(Duration::from_secs(600)));
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_rejects_invalid_app_name() {
        let mut config = AppConfig::default();
        config.app.name = "My-App".to_string();

        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_zero_scan_interval() {
        let mut config = AppConfig::default();
        config.scan.interval = Some(Duration::ZERO);

        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        let mut config = AppConfig::default();
        config.logging.format = "xml".to_string();

        assert!(config.validate().is_err());
    }
}
