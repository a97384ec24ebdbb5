//! Notification delivery for a cycle's alert summary

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use tracing::{error, info};

use crate::clients::{EventBus, MetricSink};
use crate::error::Result;
use crate::models::{AlertNotification, AlertSummary, MetricDatum, MetricUnit};

use super::subscriptions::TopicIds;

/// Detail type of every alert event
pub const DETAIL_TYPE: &str = "XCW Notification for Alerts";

const STATUS_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// What was emitted for a cycle
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReceipt {
    /// Id assigned by the event bus
    pub event_id: String,
    /// The event that was put
    pub notification: AlertNotification,
    /// The metric point that was recorded
    pub metric: MetricDatum,
}

/// Emits one event and one metric point per alerting cycle
pub struct NotificationDispatcher {
    events: Arc<dyn EventBus>,
    metrics: Arc<dyn MetricSink>,
    app_name: String,
}

impl NotificationDispatcher {
    /// Create a dispatcher for an application
    pub fn new(events: Arc<dyn EventBus>, metrics: Arc<dyn MetricSink>, app_name: impl Into<String>) -> Self {
        Self {
            events,
            metrics,
            app_name: app_name.into(),
        }
    }

    /// Event source, `<app>-xcw.alerts`
    pub fn source(&self) -> String {
        format!("{}-xcw.alerts", self.app_name)
    }

    /// Metric namespace, `XCW/<app>`
    pub fn namespace(&self) -> String {
        format!("XCW/{}", self.app_name)
    }

    /// Metric name, `<app>xraycloudwatchmetric`
    pub fn metric_name(&self) -> String {
        format!("{}xraycloudwatchmetric", self.app_name)
    }

    /// Build the event for a summary; the status carries local time
    pub fn build_notification(&self, summary: &AlertSummary, topics: &TopicIds, at: DateTime<Utc>) -> Result<AlertNotification> {
        let local = at.with_timezone(&Local).format(STATUS_TIME_FORMAT).to_string();
        let detail = serde_json::to_string(&serde_json::json!({
            "status": summary.status_message(&local),
        }))?;

        Ok(AlertNotification {
            source: self.source(),
            detail_type: DETAIL_TYPE.to_string(),
            detail,
            time: at,
            resources: topics.to_vec(),
        })
    }

    /// Build the counter point for a cycle
    pub fn build_metric(&self, at: DateTime<Utc>) -> MetricDatum {
        MetricDatum {
            namespace: self.namespace(),
            metric_name: self.metric_name(),
            value: 1.0,
            unit: MetricUnit::Count,
            timestamp: at,
        }
    }

    /// Put the event, then the metric. Either failure aborts.
    pub async fn dispatch(&self, summary: &AlertSummary, topics: &TopicIds) -> Result<DispatchReceipt> {
        let now = Utc::now();
        let notification = self.build_notification(summary, topics, now)?;

        info!(
            headline = %summary.headline,
            services = %summary.service_label,
            "Putting alert event"
        );

        let event_id = self.events.put_event(&notification).await.map_err(|e| {
            error!(error = %e, "Error putting alert event");
            e
        })?;

        let metric = self.build_metric(now);
        self.metrics.put_metric(&metric).await.map_err(|e| {
            error!(error = %e, "Error putting alert metric");
            e
        })?;

        info!(event_id = %event_id, "Alert dispatched");

        Ok(DispatchReceipt {
            event_id,
            notification,
            metric,
        })
    }
}
