//! # XCW
//!
//! Threshold alerting over a distributed-tracing service graph.
//!
//! Each scan cycle pulls the service graph for a lookback window, derives
//! per-service health metrics, compares them against a policy document and
//! collapses every breach into one notification event plus one counter point.
//!
//! ## Architecture
//!
//! - **Models**: Service graph, policy document and alert types
//! - **Alerting**: Evaluation, aggregation, subscriptions and dispatch
//! - **Clients**: Upstream seams with HTTP and in-memory implementations
//! - **Scanner**: One-shot and periodic cycle orchestration
//!
//! ## Quick Start
//!
//! ```bash
//! # Validate a policy document
//! xcw --policy xraycloudwatchevent.json check
//!
//! # Run one cycle against in-memory backends
//! xcw --policy xraycloudwatchevent.json --dry-run scan
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod scanner;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use scanner::{CycleReport, Scanner};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{AggregateAlertMap, NotificationDispatcher, SubscriptionManager, ThresholdEvaluator};
    pub use crate::clients::{Clients, MemoryBackend};
    pub use crate::config::AppConfig;
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::scanner::{CycleReport, Scanner};
}
