//! Per-service rate extraction

use crate::models::ServiceGraphNode;

/// Rates derived from a node's counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceMetrics {
    /// Total response time divided by request count
    pub avg_response_time: f64,
    /// Client errors as a percentage (0-100) of requests
    pub error_percent: f64,
    /// Throttled requests as a percentage (0-100) of requests
    pub throttle_percent: f64,
    /// Server faults as a percentage (0-100) of requests
    pub fault_percent: f64,
}

impl ServiceMetrics {
    /// Derive rates from a node.
    ///
    /// Returns `None` for nodes that reported no requests; those are never
    /// evaluated.
    #[allow(clippy::cast_precision_loss)]
    pub fn extract(node: &ServiceGraphNode) -> Option<Self> {
        let total = node.total_count();
        if total == 0 {
            return None;
        }

        let total = total as f64;
        let percent = |count: u64| count as f64 / total * 100.0;

        Some(Self {
            avg_response_time: node.total_response_time() / total,
            error_percent: percent(node.error_count()),
            throttle_percent: percent(node.throttle_count()),
            fault_percent: percent(node.fault_count()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_traffic_is_excluded() {
        let silent = ServiceGraphNode::new("idle", "AWS::Lambda").with_counts(0, 5, 5, 5, 100.0);
        assert_eq!(ServiceMetrics::extract(&silent), None);

        let no_stats = ServiceGraphNode::new("client", "client");
        assert_eq!(ServiceMetrics::extract(&no_stats), None);
    }

    #[test]
    fn test_rates_on_percent_scale() {
        let node = ServiceGraphNode::new("svc-a", "AWS::Lambda").with_counts(100, 60, 7, 3, 50_000.0);

        let metrics = ServiceMetrics::extract(&node).unwrap();

        assert!((metrics.avg_response_time - 500.0).abs() < 1e-9);
        assert!((metrics.error_percent - 60.0).abs() < 1e-9);
        assert!((metrics.throttle_percent - 7.0).abs() < 1e-9);
        assert!((metrics.fault_percent - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_fractional_percentages_are_kept() {
        let node = ServiceGraphNode::new("svc", "t").with_counts(3, 1, 0, 2, 1.0);

        let metrics = ServiceMetrics::extract(&node).unwrap();

        assert!((metrics.error_percent - 100.0 / 3.0).abs() < 1e-9);
        assert!((metrics.fault_percent - 200.0 / 3.0).abs() < 1e-9);
        assert!((metrics.avg_response_time - 1.0 / 3.0).abs() < 1e-9);
    }
}
