//! Alert data models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metric dimension a service can breach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertCategory {
    /// Average response time
    Response,
    /// Client error percentage
    Error,
    /// Throttled request percentage
    Throttle,
    /// Server fault percentage
    Fault,
}

impl AlertCategory {
    /// Every category, in evaluation order
    pub const ALL: [AlertCategory; 4] = [
        AlertCategory::Response,
        AlertCategory::Error,
        AlertCategory::Throttle,
        AlertCategory::Fault,
    ];

    /// Name used in notification text
    pub fn as_str(self) -> &'static str {
        match self {
            AlertCategory::Response => "Response",
            AlertCategory::Error => "Error",
            AlertCategory::Throttle => "Throttle",
            AlertCategory::Fault => "Fault",
        }
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One breached category for one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breach {
    /// The category that was breached
    pub category: AlertCategory,
    /// The service that breached it
    pub service_name: String,
}

/// Collapsed description of a cycle's breaches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSummary {
    /// Category part, e.g. `Error` or `Error and other thresholds have been breached for`
    pub headline: String,
    /// Service part, e.g. `checkout` or `checkout+2 nodes`
    pub service_label: String,
}

impl AlertSummary {
    /// Status line sent to subscribers
    pub fn status_message(&self, at: &str) -> String {
        format!("{} {} at {}.", self.headline, self.service_label, at)
    }
}

/// Notification delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Text messages, fed by the event topic
    Sms,
    /// Email, fed by the alarm topic
    Email,
}

impl Channel {
    /// Subscription protocol name
    pub fn protocol(self) -> &'static str {
        match self {
            Channel::Sms => "sms",
            Channel::Email => "email",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.protocol())
    }
}

/// An event put on the event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertNotification {
    /// Event source, `<app>-xcw.alerts`
    pub source: String,
    /// Fixed descriptive detail type
    pub detail_type: String,
    /// JSON detail, `{"status": "..."}`
    pub detail: String,
    /// When the event was emitted
    pub time: DateTime<Utc>,
    /// Topic identifiers the event relates to
    pub resources: Vec<String>,
}

/// Unit of a metric datum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricUnit {
    /// Plain count
    Count,
}

/// A metric data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDatum {
    /// Metric namespace, `XCW/<app>`
    pub namespace: String,
    /// Metric name, `<app>xraycloudwatchmetric`
    pub metric_name: String,
    /// Recorded value
    pub value: f64,
    /// Unit of the value
    pub unit: MetricUnit,
    /// When the value was recorded
    pub timestamp: DateTime<Utc>,
}
