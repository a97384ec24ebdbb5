//! Event bus backed by the EventBridge `PutEvents` API

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{epoch_seconds, AlertNotification};

use super::http::AwsHttpClient;
use super::EventBus;

const PUT_EVENTS_TARGET: &str = "AWSEvents.PutEvents";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Puts alert notifications on the event bus over HTTP
pub struct EventBridgeBus {
    http: AwsHttpClient,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutEventsRequest<'a> {
    entries: [PutEventsEntry<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutEventsEntry<'a> {
    time: f64,
    source: &'a str,
    detail_type: &'a str,
    detail: &'a str,
    resources: &'a [String],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PutEventsResponse {
    #[serde(default)]
    failed_entry_count: u32,
    #[serde(default)]
    entries: Vec<PutEventsResultEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PutEventsResultEntry {
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

impl EventBridgeBus {
    /// Create an event bus over an HTTP client
    pub fn new(http: AwsHttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl EventBus for EventBridgeBus {
    async fn put_event(&self, event: &AlertNotification) -> Result<String> {
        let request = PutEventsRequest {
            entries: [PutEventsEntry {
                time: epoch_seconds::to_f64(&event.time),
                source: &event.source,
                detail_type: &event.detail_type,
                detail: &event.detail,
                resources: &event.resources,
            }],
        };

        let response: PutEventsResponse = self
            .http
            .post_target(PUT_EVENTS_TARGET, CONTENT_TYPE, &request)
            .await?;

        let entry = response.entries.into_iter().next().unwrap_or_default();

        if response.failed_entry_count > 0 || entry.error_code.is_some() {
            return Err(Error::upstream(
                format!("{}:PutEvents", self.http.service()),
                format!(
                    "entry rejected: {} {}",
                    entry.error_code.unwrap_or_default(),
                    entry.error_message.unwrap_or_default()
                ),
            ));
        }

        Ok(entry.event_id.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AwsConfig;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notification() -> AlertNotification {
        AlertNotification {
            source: "demo-xcw.alerts".to_string(),
            detail_type: "XCW Notification for Alerts".to_string(),
            detail: r#"{"status":"Error svc-a at 2024-01-01 00:00."}"#.to_string(),
            time: Utc::now(),
            resources: vec!["arn:topic".to_string()],
        }
    }

    async fn bus(server: &MockServer) -> EventBridgeBus {
        let http = AwsHttpClient::new("events", &server.uri(), &AwsConfig::default()).unwrap();
        EventBridgeBus::new(http)
    }

    #[tokio::test]
    async fn test_put_event() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(header("x-amz-target", PUT_EVENTS_TARGET))
            .and(body_partial_json(serde_json::json!({
                "Entries": [{
                    "Source": "demo-xcw.alerts",
                    "DetailType": "XCW Notification for Alerts",
                    "Resources": ["arn:topic"]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "FailedEntryCount": 0,
                "Entries": [{ "EventId": "evt-1" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = bus(&server).await.put_event(&notification()).await.unwrap();
        assert_eq!(id, "evt-1");
    }

    #[tokio::test]
    async fn test_rejected_entry_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "FailedEntryCount": 1,
                "Entries": [{ "ErrorCode": "InternalFailure", "ErrorMessage": "try again" }]
            })))
            .mount(&server)
            .await;

        let err = bus(&server).await.put_event(&notification()).await.unwrap_err();
        assert!(err.to_string().contains("InternalFailure"));
    }
}
