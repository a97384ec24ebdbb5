//! External service clients
//!
//! The scanner talks to four services: the service graph source, the topic
//! registry that owns SMS/email subscriptions, the event bus and the metric
//! store. Each is a trait so a cycle can run against the HTTP clients or the
//! in-memory backend.

mod cloudwatch;
mod events;
mod http;
mod memory;
mod sigv4;
mod sns;
mod xray;

pub use cloudwatch::CloudWatchMetricSink;
pub use events::EventBridgeBus;
pub use http::AwsHttpClient;
pub use memory::{MemoryBackend, Operation, SubscriptionRecord};
pub use sigv4::{Credentials, Signer};
pub use sns::SnsTopicRegistry;
pub use xray::XRayGraphSource;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::AwsConfig;
use crate::error::{Error, Result};
use crate::models::{AlertNotification, Channel, MetricDatum, ServiceGraph};

/// Source of service graph snapshots
#[async_trait]
pub trait ServiceGraphSource: Send + Sync {
    /// Fetch the graph for `[start, end]`, all pages merged
    async fn get_service_graph(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<ServiceGraph>;
}

/// Notification topics and their subscriptions
#[async_trait]
pub trait TopicRegistry: Send + Sync {
    /// Create a topic, or return the existing one with that name
    async fn create_topic(&self, name: &str) -> Result<String>;

    /// Endpoints currently subscribed to a topic
    async fn list_subscription_endpoints(&self, topic_id: &str) -> Result<Vec<String>>;

    /// Subscribe an endpoint to a topic
    async fn subscribe(&self, topic_id: &str, channel: Channel, endpoint: &str) -> Result<()>;
}

/// Event bus receiving alert notifications
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Put one event, returning its id
    async fn put_event(&self, event: &AlertNotification) -> Result<String>;
}

/// Metric store receiving alert counters
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Record one data point
    async fn put_metric(&self, datum: &MetricDatum) -> Result<()>;
}

/// Client handles for one process, passed into every cycle
#[derive(Clone)]
pub struct Clients {
    /// Service graph source
    pub graph: Arc<dyn ServiceGraphSource>,
    /// Topic registry
    pub topics: Arc<dyn TopicRegistry>,
    /// Event bus
    pub events: Arc<dyn EventBus>,
    /// Metric sink
    pub metrics: Arc<dyn MetricSink>,
}

impl Clients {
    /// HTTP clients for the configured endpoints, signed with resolved credentials
    pub fn http(config: &AwsConfig) -> Result<Self> {
        Self::http_with(config, Credentials::resolve(config).as_ref())
    }

    /// HTTP clients signed with `credentials`.
    ///
    /// Without credentials every endpoint must be overridden (a signing proxy
    /// or a local emulator); unsigned calls to the regional endpoints would
    /// all be rejected.
    pub fn http_with(config: &AwsConfig, credentials: Option<&Credentials>) -> Result<Self> {
        Ok(Self {
            graph: Arc::new(XRayGraphSource::new(aws_client("xray", config, credentials)?)),
            topics: Arc::new(SnsTopicRegistry::new(aws_client("sns", config, credentials)?)),
            events: Arc::new(EventBridgeBus::new(aws_client("events", config, credentials)?)),
            metrics: Arc::new(CloudWatchMetricSink::new(aws_client("monitoring", config, credentials)?)),
        })
    }

    /// Every handle backed by the same in-memory backend
    pub fn in_memory(backend: &MemoryBackend) -> Self {
        Self {
            graph: Arc::new(backend.clone()),
            topics: Arc::new(backend.clone()),
            events: Arc::new(backend.clone()),
            metrics: Arc::new(backend.clone()),
        }
    }

    /// Real or snapshot graph reads, with every write recorded in `backend`.
    ///
    /// With a `snapshot` nothing leaves the process. Without one the graph is
    /// read from the configured service graph endpoint.
    pub fn dry_run(
        config: &AwsConfig,
        credentials: Option<&Credentials>,
        backend: &MemoryBackend,
        snapshot: Option<ServiceGraph>,
    ) -> Result<Self> {
        let graph: Arc<dyn ServiceGraphSource> = match snapshot {
            Some(graph) => {
                backend.set_graph(graph);
                Arc::new(backend.clone())
            }
            None => Arc::new(XRayGraphSource::new(aws_client("xray", config, credentials)?)),
        };

        Ok(Self {
            graph,
            ..Self::in_memory(backend)
        })
    }
}

fn aws_client(service: &'static str, config: &AwsConfig, credentials: Option<&Credentials>) -> Result<AwsHttpClient> {
    let client = AwsHttpClient::new(service, &config.endpoint(service), config)?;

    match credentials {
        Some(credentials) => Ok(client.with_signer(Signer::new(credentials.clone(), &config.region, service))),
        None if config.endpoint_override(service).is_some() => Ok(client),
        None => Err(Error::config(format!(
            "no AWS credentials for {service}: set aws.access_key_id and aws.secret_access_key \
             (or AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY), or point aws.{service}_endpoint \
             at a signing proxy"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServiceGraphNode;

    fn proxied() -> AwsConfig {
        AwsConfig {
            xray_endpoint: Some("http://localhost:4566".to_string()),
            sns_endpoint: Some("http://localhost:4566".to_string()),
            events_endpoint: Some("http://localhost:4566".to_string()),
            monitoring_endpoint: Some("http://localhost:4566".to_string()),
            ..AwsConfig::default()
        }
    }

    #[test]
    fn test_regional_endpoints_require_credentials() {
        let err = Clients::http_with(&AwsConfig::default(), None).err().unwrap();

        assert!(matches!(err, Error::Config(ref m) if m.contains("aws.xray_endpoint")));
    }

    #[test]
    fn test_one_missing_override_is_rejected() {
        let mut config = proxied();
        config.monitoring_endpoint = None;

        let err = Clients::http_with(&config, None).err().unwrap();

        assert!(matches!(err, Error::Config(ref m) if m.contains("aws.monitoring_endpoint")));
    }

    #[test]
    fn test_overridden_endpoints_may_be_unsigned() {
        assert!(Clients::http_with(&proxied(), None).is_ok());
    }

    #[test]
    fn test_credentials_allow_regional_endpoints() {
        let credentials = Credentials::new("AKID", "secret");

        assert!(Clients::http_with(&AwsConfig::default(), Some(&credentials)).is_ok());
    }

    #[test]
    fn test_dry_run_without_snapshot_needs_a_graph_endpoint() {
        let backend = MemoryBackend::new();

        assert!(Clients::dry_run(&AwsConfig::default(), None, &backend, None).is_err());
        assert!(Clients::dry_run(&proxied(), None, &backend, None).is_ok());
    }

    #[tokio::test]
    async fn test_dry_run_reads_snapshot() {
        let backend = MemoryBackend::new();
        let snapshot = ServiceGraph::from_nodes(vec![ServiceGraphNode::new("svc", "AWS::Lambda")]);

        let clients = Clients::dry_run(&AwsConfig::default(), None, &backend, Some(snapshot.clone())).unwrap();
        let graph = clients
            .graph
            .get_service_graph(chrono::Utc::now(), chrono::Utc::now())
            .await
            .unwrap();

        assert_eq!(graph, snapshot);
    }
}
