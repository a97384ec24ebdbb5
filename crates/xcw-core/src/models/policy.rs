//! Alerting policy document
//!
//! The policy is a JSON document with per-service thresholds under `alerts`
//! (plus an optional `default` entry), notification targets under
//! `communications`, and the scan window.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Key of the fallback threshold entry
pub const DEFAULT_POLICY_KEY: &str = "default";

/// Lookback window used when the document does not set one
pub const DEFAULT_ANALYZE_MINUTES: u32 = 360;

/// Alarm evaluation periods used when the document does not set one
pub const DEFAULT_ALARM_EVALUATION_PERIODS: u32 = 1;

/// The whole policy document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Threshold policy
    pub alerts: Policy,

    /// Notification targets
    #[serde(default)]
    pub communications: CommunicationsTargets,

    /// Minutes of service graph to analyze each cycle
    #[serde(default = "default_analyze_minutes", rename = "analyzeservicemapminutes")]
    pub analyze_minutes: u32,

    /// Evaluation periods for the downstream alarm (deployment tooling only)
    #[serde(
        default = "default_alarm_evaluation_periods",
        rename = "evaluationperiodforcwalarm"
    )]
    pub alarm_evaluation_periods: u32,
}

fn default_analyze_minutes() -> u32 {
    DEFAULT_ANALYZE_MINUTES
}

fn default_alarm_evaluation_periods() -> u32 {
    DEFAULT_ALARM_EVALUATION_PERIODS
}

/// Mapping of service name (or `default`) to its thresholds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Policy {
    entries: HashMap<String, ThresholdRecord>,
}

/// Thresholds applied to one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRecord {
    /// Average response time at or above which a Response alert fires
    #[serde(rename = "responseunitthreshold")]
    pub response_unit_threshold: f64,

    /// Error percentage (0-100) at or above which an Error alert fires
    #[serde(rename = "errorpercentagethreshold")]
    pub error_percentage_threshold: f64,

    /// Throttle percentage (0-100) at or above which a Throttle alert fires
    #[serde(rename = "throttlepercentagethreshold")]
    pub throttle_percentage_threshold: f64,

    /// Fault percentage (0-100) at or above which a Fault alert fires
    #[serde(rename = "faultpercentagethreshold")]
    pub fault_percentage_threshold: f64,

    /// Node types this entry applies to
    #[serde(default, rename = "type")]
    pub applicable_node_types: BTreeSet<String>,
}

/// SMS numbers and email addresses to notify
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunicationsTargets {
    /// Phone numbers subscribed to the event topic
    #[serde(default)]
    pub sms: Vec<String>,

    /// Email addresses subscribed to the alarm topic
    #[serde(default)]
    pub email: Vec<String>,
}

impl PolicyDocument {
    /// Parse a policy document from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        let document: Self = serde_json::from_str(json)
            .map_err(|e| Error::policy(format!("invalid policy document: {e}")))?;

        if document.analyze_minutes == 0 {
            return Err(Error::policy("analyzeservicemapminutes must be at least 1"));
        }

        Ok(document)
    }

    /// Read and parse a policy document from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::policy(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Alarm period in seconds, derived from the scan window
    pub fn alarm_period_seconds(&self) -> u64 {
        u64::from(self.analyze_minutes) * 60
    }
}

impl Policy {
    /// Build a policy from `(key, record)` pairs
    pub fn from_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, ThresholdRecord)>) -> Self {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Entry registered under exactly this service name
    pub fn entry(&self, service_name: &str) -> Option<&ThresholdRecord> {
        self.entries.get(service_name)
    }

    /// The `default` entry, if any
    pub fn default_entry(&self) -> Option<&ThresholdRecord> {
        self.entries.get(DEFAULT_POLICY_KEY)
    }

    /// Thresholds to apply to a service: its own entry, else `default`
    pub fn resolve(&self, service_name: &str) -> Option<&ThresholdRecord> {
        self.entry(service_name).or_else(|| self.default_entry())
    }

    /// Whether a node enters evaluation at all.
    ///
    /// A `default` entry admits every node. Without one, the service needs
    /// its own entry listing the node's type.
    pub fn is_eligible(&self, service_name: &str, node_type: &str) -> bool {
        let typed_match = self
            .entry(service_name)
            .is_some_and(|record| record.applies_to(node_type));

        typed_match || self.default_entry().is_some()
    }

    /// Number of entries, `default` included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are configured
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ThresholdRecord {
    /// Build a record with the four thresholds and no node types
    pub fn new(response: f64, error_pct: f64, throttle_pct: f64, fault_pct: f64) -> Self {
        Self {
            response_unit_threshold: response,
            error_percentage_threshold: error_pct,
            throttle_percentage_threshold: throttle_pct,
            fault_percentage_threshold: fault_pct,
            applicable_node_types: BTreeSet::new(),
        }
    }

    /// Add an applicable node type
    pub fn with_type(mut self, node_type: impl Into<String>) -> Self {
        self.applicable_node_types.insert(node_type.into());
        self
    }

    /// Whether this record lists the node type
    pub fn applies_to(&self, node_type: &str) -> bool {
        self.applicable_node_types.contains(node_type)
    }
}
