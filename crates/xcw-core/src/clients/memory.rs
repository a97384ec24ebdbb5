//! In-memory implementation of every client trait
//!
//! Backs `--dry-run` and the test suite. Topics and subscriptions behave like
//! the real registry: creating a topic twice returns the same id.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{AlertNotification, Channel, MetricDatum, ServiceGraph};

use super::{EventBus, MetricSink, ServiceGraphSource, TopicRegistry};

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `get_service_graph`
    GetServiceGraph,
    /// `create_topic`
    CreateTopic,
    /// `list_subscription_endpoints`
    ListSubscriptions,
    /// `subscribe`
    Subscribe,
    /// `put_event`
    PutEvent,
    /// `put_metric`
    PutMetric,
}

/// A recorded subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    /// Delivery channel
    pub channel: Channel,
    /// Subscribed endpoint
    pub endpoint: String,
}

#[derive(Default)]
struct State {
    graph: ServiceGraph,
    topics: HashMap<String, String>,
    subscriptions: HashMap<String, Vec<SubscriptionRecord>>,
    events: Vec<AlertNotification>,
    metrics: Vec<MetricDatum>,
    calls: Vec<Operation>,
    failing: HashSet<Operation>,
    graph_windows: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

/// Shared in-memory stand-in for the external services
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    /// Create an empty backend whose graph has no `Services`
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend serving a fixed graph
    pub fn with_graph(graph: ServiceGraph) -> Self {
        let backend = Self::new();
        backend.set_graph(graph);
        backend
    }

    /// Replace the graph served by `get_service_graph`
    pub fn set_graph(&self, graph: ServiceGraph) {
        self.state.lock().graph = graph;
    }

    /// Make every later call of `operation` fail
    pub fn fail(&self, operation: Operation) {
        self.state.lock().failing.insert(operation);
    }

    /// Events put so far
    pub fn events(&self) -> Vec<AlertNotification> {
        self.state.lock().events.clone()
    }

    /// Metric data points recorded so far
    pub fn metrics(&self) -> Vec<MetricDatum> {
        self.state.lock().metrics.clone()
    }

    /// Topic id registered under a name
    pub fn topic_id(&self, name: &str) -> Option<String> {
        self.state.lock().topics.get(name).cloned()
    }

    /// Subscriptions of a topic
    pub fn subscriptions(&self, topic_id: &str) -> Vec<SubscriptionRecord> {
        self.state
            .lock()
            .subscriptions
            .get(topic_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Pre-register a subscription, as if made by an earlier run
    pub fn add_subscription(&self, topic_id: &str, channel: Channel, endpoint: &str) {
        self.state
            .lock()
            .subscriptions
            .entry(topic_id.to_string())
            .or_default()
            .push(SubscriptionRecord {
                channel,
                endpoint: endpoint.to_string(),
            });
    }

    /// Number of calls made to an operation
    pub fn call_count(&self, operation: Operation) -> usize {
        self.state.lock().calls.iter().filter(|&&op| op == operation).count()
    }

    /// Windows requested from the graph source
    pub fn graph_windows(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.state.lock().graph_windows.clone()
    }
}

fn record(state: &mut State, operation: Operation) -> Result<()> {
    state.calls.push(operation);
    if state.failing.contains(&operation) {
        return Err(Error::upstream(
            format!("memory:{operation:?}"),
            "injected failure",
        ));
    }
    Ok(())
}

#[async_trait]
impl ServiceGraphSource for MemoryBackend {
    async fn get_service_graph(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<ServiceGraph> {
        let mut state = self.state.lock();
        record(&mut state, Operation::GetServiceGraph)?;
        state.graph_windows.push((start, end));
        Ok(state.graph.clone())
    }
}

#[async_trait]
impl TopicRegistry for MemoryBackend {
    async fn create_topic(&self, name: &str) -> Result<String> {
        let mut state = self.state.lock();
        record(&mut state, Operation::CreateTopic)?;
        let id = state
            .topics
            .entry(name.to_string())
            .or_insert_with(|| format!("arn:memory:topic:{name}"))
            .clone();
        Ok(id)
    }

    async fn list_subscription_endpoints(&self, topic_id: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        record(&mut state, Operation::ListSubscriptions)?;
        Ok(state
            .subscriptions
            .get(topic_id)
            .map(|subs| subs.iter().map(|s| s.endpoint.clone()).collect())
            .unwrap_or_default())
    }

    async fn subscribe(&self, topic_id: &str, channel: Channel, endpoint: &str) -> Result<()> {
        let mut state = self.state.lock();
        record(&mut state, Operation::Subscribe)?;
        info!(topic = topic_id, %channel, endpoint, "Recorded subscription");
        state
            .subscriptions
            .entry(topic_id.to_string())
            .or_default()
            .push(SubscriptionRecord {
                channel,
                endpoint: endpoint.to_string(),
            });
        Ok(())
    }
}

#[async_trait]
impl EventBus for MemoryBackend {
    async fn put_event(&self, event: &AlertNotification) -> Result<String> {
        let mut state = self.state.lock();
        record(&mut state, Operation::PutEvent)?;
        info!(source = %event.source, detail = %event.detail, "Recorded event");
        state.events.push(event.clone());
        Ok(Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl MetricSink for MemoryBackend {
    async fn put_metric(&self, datum: &MetricDatum) -> Result<()> {
        let mut state = self.state.lock();
        record(&mut state, Operation::PutMetric)?;
        info!(
            namespace = %datum.namespace,
            metric = %datum.metric_name,
            value = datum.value,
            "Recorded metric"
        );
        state.metrics.push(datum.clone());
        Ok(())
    }
}
