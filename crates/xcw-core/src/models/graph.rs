//! Service graph data model
//!
//! Mirrors the shape returned by the tracing backend's `GetServiceGraph`
//! call. Only the fields the alerting engine reads are modelled; everything
//! else in the payload is ignored on deserialization.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A snapshot of the service graph over a time window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceGraph {
    /// Start of the window the graph covers
    #[serde(default, with = "epoch_seconds::option")]
    pub start_time: Option<DateTime<Utc>>,

    /// End of the window the graph covers
    #[serde(default, with = "epoch_seconds::option")]
    pub end_time: Option<DateTime<Utc>>,

    /// Nodes of the graph; `None` when the key was absent
    #[serde(default)]
    pub services: Option<Vec<ServiceGraphNode>>,

    /// Pagination token for the next page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// A single service node of the graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceGraphNode {
    /// Service name
    #[serde(default)]
    pub name: String,

    /// Node type (e.g. `AWS::Lambda`, `AWS::EC2::Instance`)
    #[serde(default, rename = "Type")]
    pub node_type: String,

    /// Aggregated counters, absent for nodes that saw no traffic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_statistics: Option<SummaryStatistics>,
}

/// Aggregated request counters of a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SummaryStatistics {
    /// Requests that completed
    #[serde(default)]
    pub total_count: u64,

    /// Client errors (4xx)
    #[serde(default)]
    pub error_statistics: ErrorStatistics,

    /// Server faults (5xx)
    #[serde(default)]
    pub fault_statistics: FaultStatistics,

    /// Sum of response times of all requests
    #[serde(default)]
    pub total_response_time: f64,
}

/// Client error counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorStatistics {
    /// Requests throttled (429)
    #[serde(default)]
    pub throttle_count: u64,

    /// Other client errors
    #[serde(default)]
    pub other_count: u64,

    /// All client errors
    #[serde(default)]
    pub total_count: u64,
}

/// Server fault counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FaultStatistics {
    /// Faults other than the classified ones
    #[serde(default)]
    pub other_count: u64,

    /// All server faults
    #[serde(default)]
    pub total_count: u64,
}

impl ServiceGraphNode {
    /// Build a node with the given counters
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_type: node_type.into(),
            summary_statistics: None,
        }
    }

    /// Attach summary counters
    pub fn with_counts(
        mut self,
        total_count: u64,
        error_count: u64,
        throttle_count: u64,
        fault_count: u64,
        total_response_time: f64,
    ) -> Self {
        self.summary_statistics = Some(SummaryStatistics {
            total_count,
            error_statistics: ErrorStatistics {
                throttle_count,
                other_count: error_count.saturating_sub(throttle_count),
                total_count: error_count,
            },
            fault_statistics: FaultStatistics {
                other_count: fault_count,
                total_count: fault_count,
            },
            total_response_time,
        });
        self
    }

    /// Total requests, zero when no counters were reported
    pub fn total_count(&self) -> u64 {
        self.summary_statistics
            .as_ref()
            .map_or(0, |s| s.total_count)
    }

    /// Client errors, zero when no counters were reported
    pub fn error_count(&self) -> u64 {
        self.summary_statistics
            .as_ref()
            .map_or(0, |s| s.error_statistics.total_count)
    }

    /// Throttled requests, zero when no counters were reported
    pub fn throttle_count(&self) -> u64 {
        self.summary_statistics
            .as_ref()
            .map_or(0, |s| s.error_statistics.throttle_count)
    }

    /// Server faults, zero when no counters were reported
    pub fn fault_count(&self) -> u64 {
        self.summary_statistics
            .as_ref()
            .map_or(0, |s| s.fault_statistics.total_count)
    }

    /// Summed response time, zero when no counters were reported
    pub fn total_response_time(&self) -> f64 {
        self.summary_statistics
            .as_ref()
            .map_or(0.0, |s| s.total_response_time)
    }
}

impl ServiceGraph {
    /// Build a graph from a list of nodes
    pub fn from_nodes(nodes: Vec<ServiceGraphNode>) -> Self {
        Self {
            services: Some(nodes),
            ..Self::default()
        }
    }

    /// Read a saved `GetServiceGraph` response
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| Error::config(format!("invalid service graph snapshot {}: {e}", path.display())))
    }

    /// Append another page of the same graph
    pub fn merge_page(&mut self, page: ServiceGraph) {
        if let Some(nodes) = page.services {
            self.services.get_or_insert_with(Vec::new).extend(nodes);
        }
        if self.start_time.is_none() {
            self.start_time = page.start_time;
        }
        if page.end_time.is_some() {
            self.end_time = page.end_time;
        }
        self.next_token = page.next_token;
    }
}

/// Timestamps travel as fractional epoch seconds on the wire
pub(crate) mod epoch_seconds {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(ts: &DateTime<Utc>) -> f64 {
        ts.timestamp_millis() as f64 / 1000.0
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn from_f64(secs: f64) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt((secs * 1000.0).round() as i64).single()
    }

    pub mod option {
        use super::{from_f64, to_f64, DateTime, Deserialize, Deserializer, Serializer, Utc};

        pub fn serialize<S>(ts: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match ts {
                Some(ts) => serializer.serialize_f64(to_f64(ts)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let secs = Option::<f64>::deserialize(deserializer)?;
            Ok(secs.and_then(from_f64))
        }
    }
}
