//! Service graph source backed by the X-Ray `GetServiceGraph` API

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{epoch_seconds, ServiceGraph};

use super::http::AwsHttpClient;
use super::ServiceGraphSource;

/// Upper bound on pages followed for one window
const MAX_PAGES: usize = 100;

/// Fetches service graphs over HTTP
pub struct XRayGraphSource {
    http: AwsHttpClient,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetServiceGraphRequest<'a> {
    start_time: f64,
    end_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

impl XRayGraphSource {
    /// Create a graph source over an HTTP client
    pub fn new(http: AwsHttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ServiceGraphSource for XRayGraphSource {
    async fn get_service_graph(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<ServiceGraph> {
        let mut graph = ServiceGraph::default();
        let mut next_token: Option<String> = None;

        for page in 0..MAX_PAGES {
            let request = GetServiceGraphRequest {
                start_time: epoch_seconds::to_f64(&start),
                end_time: epoch_seconds::to_f64(&end),
                next_token: next_token.as_deref(),
            };

            let response: ServiceGraph = self
                .http
                .post_rest("/ServiceGraph", "GetServiceGraph", &request)
                .await?;

            debug!(
                page,
                services = response.services.as_ref().map_or(0, Vec::len),
                "Received service graph page"
            );

            graph.merge_page(response);

            match graph.next_token.take() {
                Some(token) => next_token = Some(token),
                None => return Ok(graph),
            }
        }

        Err(Error::upstream(
            format!("{}:GetServiceGraph", self.http.service()),
            format!("still paginating after {MAX_PAGES} pages"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AwsConfig;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn source(server: &MockServer) -> XRayGraphSource {
        let http = AwsHttpClient::new("xray", &server.uri(), &AwsConfig::default()).unwrap();
        XRayGraphSource::new(http)
    }

    #[tokio::test]
    async fn test_follows_pagination() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/ServiceGraph"))
            .and(body_partial_json(serde_json::json!({ "NextToken": "p2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Services": [{ "Name": "b", "Type": "AWS::Lambda" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/ServiceGraph"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Services": [{ "Name": "a", "Type": "AWS::Lambda" }],
                "NextToken": "p2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
        let graph = source(&server).await.get_service_graph(start, end).await.unwrap();

        let names: Vec<_> = graph.services.unwrap().into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_endless_pagination_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/ServiceGraph"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Services": [],
                "NextToken": "again"
            })))
            .expect(MAX_PAGES as u64)
            .mount(&server)
            .await;

        let err = source(&server)
            .await
            .get_service_graph(Utc::now(), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, crate::Error::Upstream { ref message, .. } if message.contains("paginating")));
    }

    #[tokio::test]
    async fn test_missing_services_is_not_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/ServiceGraph"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let graph = source(&server)
            .await
            .get_service_graph(Utc::now(), Utc::now())
            .await
            .unwrap();

        assert!(graph.services.is_none());
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("ThrottledException"))
            .mount(&server)
            .await;

        let err = source(&server)
            .await
            .get_service_graph(Utc::now(), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, crate::Error::Upstream { ref service, .. } if service == "xray:GetServiceGraph"));
        assert!(err.to_string().contains("ThrottledException"));
    }
}
