//! Threshold evaluation for service graph nodes

use tracing::debug;

use crate::models::{AlertCategory, Breach, Policy, ServiceGraphNode, ThresholdRecord};

use super::extractor::ServiceMetrics;

/// Why a node was left out of evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The node reported no requests
    NoTraffic,
    /// Neither a type-matching entry nor a `default` entry covers the node
    NotCovered,
}

/// Outcome of evaluating one node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvaluation {
    /// The node was not evaluated
    Skipped(SkipReason),
    /// The node was evaluated; `breaches` may be empty
    Evaluated {
        /// Derived rates
        metrics: ServiceMetrics,
        /// Breached categories, in evaluation order
        breaches: Vec<Breach>,
    },
}

impl NodeEvaluation {
    /// Breaches of an evaluated node, empty for skipped ones
    pub fn breaches(&self) -> &[Breach] {
        match self {
            NodeEvaluation::Evaluated { breaches, .. } => breaches,
            NodeEvaluation::Skipped(_) => &[],
        }
    }
}

/// Compares node metrics against the policy
pub struct ThresholdEvaluator<'a> {
    policy: &'a Policy,
}

impl<'a> ThresholdEvaluator<'a> {
    /// Create an evaluator over a policy
    pub fn new(policy: &'a Policy) -> Self {
        Self { policy }
    }

    /// Extract, gate and test one node
    pub fn evaluate_node(&self, node: &ServiceGraphNode) -> NodeEvaluation {
        let Some(metrics) = ServiceMetrics::extract(node) else {
            debug!(service = %node.name, "No traffic, skipping");
            return NodeEvaluation::Skipped(SkipReason::NoTraffic);
        };

        if !self.policy.is_eligible(&node.name, &node.node_type) {
            debug!(
                service = %node.name,
                node_type = %node.node_type,
                "Not covered by policy, skipping"
            );
            return NodeEvaluation::Skipped(SkipReason::NotCovered);
        }

        // Eligibility guarantees an own entry or a default
        let Some(record) = self.policy.resolve(&node.name) else {
            return NodeEvaluation::Skipped(SkipReason::NotCovered);
        };

        let breaches = breached_categories(record, &metrics)
            .into_iter()
            .map(|category| Breach {
                category,
                service_name: node.name.clone(),
            })
            .collect();

        NodeEvaluation::Evaluated { metrics, breaches }
    }
}

/// Categories whose metric meets or exceeds the record's threshold
pub fn breached_categories(record: &ThresholdRecord, metrics: &ServiceMetrics) -> Vec<AlertCategory> {
    AlertCategory::ALL
        .into_iter()
        .filter(|&category| {
            let value = metric_value(metrics, category);
            let threshold = threshold_value(record, category);
            let breached = value >= threshold;

            debug!(
                category = %category,
                value,
                threshold,
                breached,
                "Evaluated threshold"
            );

            breached
        })
        .collect()
}

fn metric_value(metrics: &ServiceMetrics, category: AlertCategory) -> f64 {
    match category {
        AlertCategory::Response => metrics.avg_response_time,
        AlertCategory::Error => metrics.error_percent,
        AlertCategory::Throttle => metrics.throttle_percent,
        AlertCategory::Fault => metrics.fault_percent,
    }
}

fn threshold_value(record: &ThresholdRecord, category: AlertCategory) -> f64 {
    match category {
        AlertCategory::Response => record.response_unit_threshold,
        AlertCategory::Error => record.error_percentage_threshold,
        AlertCategory::Throttle => record.throttle_percentage_threshold,
        AlertCategory::Fault => record.fault_percentage_threshold,
    }
}
