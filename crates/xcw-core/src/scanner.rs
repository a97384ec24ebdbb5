//! Scan cycle orchestration
//!
//! One cycle fetches the service graph for the policy's lookback window,
//! evaluates every node, refreshes subscriptions and, when anything breached,
//! dispatches a single notification. Cycles share nothing; a failing upstream
//! call aborts the cycle that made it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::alerting::{
    AggregateAlertMap, DispatchReceipt, NodeEvaluation, NotificationDispatcher, SkipReason,
    SubscriptionManager, ThresholdEvaluator, TopicIds,
};
use crate::clients::Clients;
use crate::config::AppSection;
use crate::error::{Error, Result};
use crate::models::{Policy, PolicyDocument, ServiceGraphNode};

/// Result of evaluating every node of a graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphEvaluation {
    /// Breaches grouped by category
    pub alerts: AggregateAlertMap,
    /// Nodes that went through threshold tests
    pub evaluated: usize,
    /// Nodes left out (no traffic, not covered, unnamed)
    pub skipped: usize,
}

/// What one cycle did
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Start of the analyzed window
    pub window_start: DateTime<Utc>,
    /// End of the analyzed window
    pub window_end: DateTime<Utc>,
    /// False when the graph source returned no `Services`
    pub had_services: bool,
    /// Evaluation outcome
    pub evaluation: GraphEvaluation,
    /// Topics after the subscription pass
    pub topics: TopicIds,
    /// Emitted notification, if anything breached
    pub dispatch: Option<DispatchReceipt>,
}

/// Evaluate every node against the policy and aggregate the breaches
pub fn evaluate_graph(nodes: &[ServiceGraphNode], policy: &Policy) -> GraphEvaluation {
    let evaluator = ThresholdEvaluator::new(policy);
    let mut result = GraphEvaluation::default();

    for node in nodes {
        if node.name.is_empty() {
            warn!(node_type = %node.node_type, "Service graph node without a name, skipping");
            result.skipped += 1;
            continue;
        }

        debug!(
            service = %node.name,
            node_type = %node.node_type,
            total = node.total_count(),
            errors = node.error_count(),
            throttles = node.throttle_count(),
            faults = node.fault_count(),
            response_time = node.total_response_time(),
            "Summary statistics"
        );

        match evaluator.evaluate_node(node) {
            NodeEvaluation::Skipped(SkipReason::NoTraffic | SkipReason::NotCovered) => {
                result.skipped += 1;
            }
            NodeEvaluation::Evaluated { breaches, .. } => {
                result.evaluated += 1;
                for breach in &breaches {
                    metrics::counter!("xcw_breaches_total", "category" => breach.category.as_str())
                        .increment(1);
                }
                result.alerts.extend(breaches);
            }
        }
    }

    result
}

/// Runs scan cycles against a set of clients
pub struct Scanner {
    clients: Clients,
    subscriptions: SubscriptionManager,
    dispatcher: NotificationDispatcher,
}

impl Scanner {
    /// Create a scanner for an application
    pub fn new(app: &AppSection, clients: Clients) -> Self {
        let subscriptions = SubscriptionManager::new(
            clients.topics.clone(),
            app.event_topic(),
            app.alarm_topic(),
        );
        let dispatcher = NotificationDispatcher::new(
            clients.events.clone(),
            clients.metrics.clone(),
            app.name.clone(),
        );

        Self {
            clients,
            subscriptions,
            dispatcher,
        }
    }

    /// Run one cycle ending now
    pub async fn run_cycle(&self, document: &PolicyDocument) -> Result<CycleReport> {
        self.run_cycle_at(document, Utc::now()).await
    }

    /// Run one cycle whose window ends at `now`
    pub async fn run_cycle_at(&self, document: &PolicyDocument, now: DateTime<Utc>) -> Result<CycleReport> {
        metrics::counter!("xcw_cycles_total").increment(1);

        let window_start = now - chrono::Duration::minutes(i64::from(document.analyze_minutes));
        info!(
            minutes = document.analyze_minutes,
            start = %window_start,
            end = %now,
            "Fetching service graph"
        );

        let graph = self
            .clients
            .graph
            .get_service_graph(window_start, now)
            .await
            .map_err(|e| {
                error!(error = %e, "Cannot continue, error fetching service graph");
                e
            })?;

        let had_services = graph.services.is_some();
        let evaluation = match graph.services.as_deref() {
            Some(nodes) => evaluate_graph(nodes, &document.alerts),
            None => {
                warn!("No 'Services' in service graph response, skipping evaluation");
                GraphEvaluation::default()
            }
        };

        info!(
            evaluated = evaluation.evaluated,
            skipped = evaluation.skipped,
            categories = evaluation.alerts.len(),
            breaches = evaluation.alerts.breach_count(),
            "Evaluated service graph"
        );

        let topics = self.subscriptions.refresh(&document.communications).await?;

        let dispatch = match evaluation.alerts.summarize() {
            Some(summary) => Some(self.dispatcher.dispatch(&summary, &topics).await?),
            None => {
                debug!("No thresholds breached this cycle");
                None
            }
        };

        Ok(CycleReport {
            window_start,
            window_end: now,
            had_services,
            evaluation,
            topics,
            dispatch,
        })
    }

    /// Run cycles until Ctrl+C.
    ///
    /// The policy is re-read before every cycle. A failed cycle is logged and
    /// the loop waits for the next tick. Without `every`, the period is the
    /// policy's lookback window at startup.
    pub async fn run_periodic(&self, policy_path: PathBuf, every: Option<Duration>) -> Result<()> {
        let period = match every {
            Some(period) => period,
            None => {
                let document = PolicyDocument::load(&policy_path)?;
                Duration::from_secs(document.alarm_period_seconds())
            }
        };

        if period.is_zero() {
            return Err(Error::config("scan period must be positive"));
        }

        info!(period = %humantime::format_duration(period), "Starting periodic scan");

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_from_file(&policy_path).await {
                        error!(error = %e, "Scan cycle failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C received, stopping");
                    return Ok(());
                }
            }
        }
    }

    async fn run_from_file(&self, policy_path: &Path) -> Result<CycleReport> {
        let document = PolicyDocument::load(policy_path)?;
        self.run_cycle(&document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{MemoryBackend, Operation};
    use crate::models::{AlertCategory, ServiceGraph, ThresholdRecord, DEFAULT_POLICY_KEY};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn app() -> AppSection {
        AppSection {
            name: "demo".to_string(),
            ..AppSection::default()
        }
    }

    fn document(policy: Policy) -> PolicyDocument {
        PolicyDocument {
            alerts: policy,
            communications: crate::models::CommunicationsTargets {
                sms: vec!["+15555550100".to_string()],
                email: vec!["oncall@example.com".to_string()],
            },
            analyze_minutes: 360,
            alarm_evaluation_periods: 1,
        }
    }

    fn default_policy(record: ThresholdRecord) -> Policy {
        Policy::from_entries([(DEFAULT_POLICY_KEY, record)])
    }

    fn status(report: &CycleReport) -> String {
        let detail: serde_json::Value =
            serde_json::from_str(&report.dispatch.as_ref().unwrap().notification.detail).unwrap();
        detail["status"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_single_error_breach_end_to_end() {
        let backend = MemoryBackend::with_graph(ServiceGraph::from_nodes(vec![
            ServiceGraphNode::new("svc-a", "AWS::Lambda").with_counts(100, 60, 0, 0, 50_000.0),
        ]));
        let scanner = Scanner::new(&app(), Clients::in_memory(&backend));
        let doc = document(default_policy(ThresholdRecord::new(1000.0, 50.0, 50.0, 50.0)));

        let report = scanner.run_cycle(&doc).await.unwrap();

        let expected: AggregateAlertMap = [crate::models::Breach {
            category: AlertCategory::Error,
            service_name: "svc-a".to_string(),
        }]
        .into_iter()
        .collect();
        assert_eq!(report.evaluation.alerts, expected);
        assert!(status(&report).starts_with("Error svc-a at "));
        assert_eq!(backend.events().len(), 1);
        assert_eq!(backend.metrics().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_services_returns_cleanly() {
        let backend = MemoryBackend::new();
        let scanner = Scanner::new(&app(), Clients::in_memory(&backend));
        let doc = document(default_policy(ThresholdRecord::new(0.0, 0.0, 0.0, 0.0)));

        let report = scanner.run_cycle(&doc).await.unwrap();

        assert!(!report.had_services);
        assert!(report.dispatch.is_none());
        assert!(backend.events().is_empty());
        assert!(backend.metrics().is_empty());
        // subscriptions are refreshed regardless
        assert_eq!(backend.subscriptions(&report.topics.sms).len(), 1);
    }

    #[tokio::test]
    async fn test_two_faults_share_one_label() {
        let backend = MemoryBackend::with_graph(ServiceGraph::from_nodes(vec![
            ServiceGraphNode::new("svc-a", "AWS::Lambda").with_counts(10, 0, 0, 5, 10.0),
            ServiceGraphNode::new("svc-b", "AWS::Lambda").with_counts(10, 0, 0, 6, 10.0),
        ]));
        let scanner = Scanner::new(&app(), Clients::in_memory(&backend));
        let doc = document(default_policy(ThresholdRecord::new(1000.0, 100.0, 100.0, 50.0)));

        let report = scanner.run_cycle(&doc).await.unwrap();

        assert_eq!(
            report.evaluation.alerts.services(AlertCategory::Fault).unwrap(),
            &["svc-a".to_string(), "svc-b".to_string()]
        );
        assert!(status(&report).starts_with("Fault svc-a+1 nodes at "));
    }

    #[tokio::test]
    async fn test_many_breaches_emit_one_event() {
        let backend = MemoryBackend::with_graph(ServiceGraph::from_nodes(vec![
            ServiceGraphNode::new("svc-a", "AWS::Lambda").with_counts(10, 9, 0, 0, 10.0),
            ServiceGraphNode::new("svc-b", "AWS::Lambda").with_counts(10, 0, 0, 9, 10.0),
            ServiceGraphNode::new("svc-c", "AWS::Lambda").with_counts(10, 0, 0, 9, 10.0),
        ]));
        let scanner = Scanner::new(&app(), Clients::in_memory(&backend));
        let doc = document(default_policy(ThresholdRecord::new(1000.0, 50.0, 100.0, 50.0)));

        let report = scanner.run_cycle(&doc).await.unwrap();

        assert_eq!(report.evaluation.alerts.len(), 2);
        assert_eq!(backend.call_count(Operation::PutEvent), 1);
        assert_eq!(backend.call_count(Operation::PutMetric), 1);
        assert_eq!(
            status(&report).split(" at ").next().unwrap(),
            "Error and other thresholds have been breached for svc-b+1 nodes"
        );
    }

    #[tokio::test]
    async fn test_no_breach_emits_nothing_but_subscribes() {
        let backend = MemoryBackend::with_graph(ServiceGraph::from_nodes(vec![
            ServiceGraphNode::new("svc-a", "AWS::Lambda").with_counts(100, 1, 0, 0, 10.0),
            ServiceGraphNode::new("idle", "AWS::Lambda"),
        ]));
        let scanner = Scanner::new(&app(), Clients::in_memory(&backend));
        let doc = document(default_policy(ThresholdRecord::new(1000.0, 50.0, 50.0, 50.0)));

        let report = scanner.run_cycle(&doc).await.unwrap();

        assert_eq!(report.evaluation.evaluated, 1);
        assert_eq!(report.evaluation.skipped, 1);
        assert!(report.dispatch.is_none());
        assert_eq!(backend.call_count(Operation::PutEvent), 0);
        assert_eq!(backend.call_count(Operation::Subscribe), 2);
    }

    #[tokio::test]
    async fn test_window_follows_policy_minutes() {
        let backend = MemoryBackend::new();
        let scanner = Scanner::new(&app(), Clients::in_memory(&backend));
        let mut doc = document(Policy::default());
        doc.analyze_minutes = 10;
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        scanner.run_cycle_at(&doc, now).await.unwrap();

        let start = Utc.with_ymd_and_hms(2024, 5, 1, 11, 50, 0).unwrap();
        assert_eq!(backend.graph_windows(), vec![(start, now)]);
    }

    #[tokio::test]
    async fn test_graph_failure_aborts_cycle() {
        let backend = MemoryBackend::new();
        backend.fail(Operation::GetServiceGraph);
        let scanner = Scanner::new(&app(), Clients::in_memory(&backend));
        let doc = document(default_policy(ThresholdRecord::new(0.0, 0.0, 0.0, 0.0)));

        assert!(scanner.run_cycle(&doc).await.is_err());
        assert_eq!(backend.call_count(Operation::CreateTopic), 0);
    }

    #[tokio::test]
    async fn test_subscription_failure_aborts_before_dispatch() {
        let backend = MemoryBackend::with_graph(ServiceGraph::from_nodes(vec![
            ServiceGraphNode::new("svc-a", "AWS::Lambda").with_counts(10, 10, 0, 0, 10.0),
        ]));
        backend.fail(Operation::CreateTopic);
        let scanner = Scanner::new(&app(), Clients::in_memory(&backend));
        let doc = document(default_policy(ThresholdRecord::new(1000.0, 50.0, 50.0, 50.0)));

        assert!(scanner.run_cycle(&doc).await.is_err());
        assert!(backend.events().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_snapshot_records_one_event() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"Services": [
                {{"Name": "svc-a", "Type": "AWS::Lambda",
                  "SummaryStatistics": {{"TotalCount": 10, "TotalResponseTime": 1.0,
                    "ErrorStatistics": {{"TotalCount": 9}}, "FaultStatistics": {{"TotalCount": 0}}}}}}
            ]}}"#
        )
        .unwrap();
        let snapshot = ServiceGraph::load(file.path()).unwrap();
        let backend = MemoryBackend::new();
        let clients =
            Clients::dry_run(&crate::config::AwsConfig::default(), None, &backend, Some(snapshot)).unwrap();
        let scanner = Scanner::new(&app(), clients);
        let doc = document(default_policy(ThresholdRecord::new(1000.0, 50.0, 50.0, 50.0)));

        let report = scanner.run_cycle(&doc).await.unwrap();

        assert_eq!(report.evaluation.evaluated, 1);
        assert_eq!(backend.events().len(), 1);
        assert_eq!(backend.metrics().len(), 1);
        assert!(status(&report).starts_with("Error svc-a at "));
    }

    #[tokio::test]
    async fn test_zero_period_is_rejected() {
        let backend = MemoryBackend::new();
        let scanner = Scanner::new(&app(), Clients::in_memory(&backend));

        let err = scanner
            .run_periodic(PathBuf::from("unused.json"), Some(Duration::ZERO))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert_eq!(backend.call_count(Operation::GetServiceGraph), 0);
    }

    #[tokio::test]
    async fn test_zero_minute_policy_is_rejected_before_scheduling() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"alerts": {}, "analyzeservicemapminutes": 0}"#).unwrap();
        let backend = MemoryBackend::new();
        let scanner = Scanner::new(&app(), Clients::in_memory(&backend));

        let err = scanner
            .run_periodic(file.path().to_path_buf(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Policy(_)));
    }

    #[test]
    fn test_evaluate_graph_skips_unnamed_and_uncovered() {
        let policy = Policy::from_entries([(
            "svc",
            ThresholdRecord::new(0.0, 0.0, 0.0, 0.0).with_type("AWS::Lambda"),
        )]);
        let nodes = vec![
            ServiceGraphNode::new("", "AWS::Lambda").with_counts(1, 1, 1, 1, 1.0),
            ServiceGraphNode::new("svc", "AWS::EC2::Instance").with_counts(1, 1, 1, 1, 1.0),
            ServiceGraphNode::new("svc", "AWS::Lambda").with_counts(1, 0, 0, 0, 1.0),
        ];

        let result = evaluate_graph(&nodes, &policy);

        assert_eq!(result.evaluated, 1);
        assert_eq!(result.skipped, 2);
        assert_eq!(
            result.alerts.categories().collect::<Vec<_>>(),
            AlertCategory::ALL.to_vec()
        );
    }
}
