//! Alerting engine for XCW
//!
//! Threshold evaluation of service graph nodes, cycle-wide aggregation,
//! subscription upkeep and notification delivery.

mod aggregator;
mod dispatcher;
mod evaluator;
mod extractor;
mod subscriptions;

pub use aggregator::{headline, service_label, AggregateAlertMap};
pub use dispatcher::{DispatchReceipt, NotificationDispatcher, DETAIL_TYPE};
pub use evaluator::{breached_categories, NodeEvaluation, SkipReason, ThresholdEvaluator};
pub use extractor::ServiceMetrics;
pub use subscriptions::{ChannelSubscriptions, SubscriptionManager, TopicIds};
