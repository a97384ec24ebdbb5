//! Topic registry backed by the SNS Query API

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Channel;

use super::http::AwsHttpClient;
use super::TopicRegistry;

/// Upper bound on subscription pages followed for one topic
const MAX_PAGES: usize = 100;

/// Manages topics and subscriptions over HTTP
pub struct SnsTopicRegistry {
    http: AwsHttpClient,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateTopicEnvelope {
    create_topic_response: CreateTopicResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateTopicResponse {
    create_topic_result: CreateTopicResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateTopicResult {
    topic_arn: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListSubscriptionsEnvelope {
    list_subscriptions_by_topic_response: ListSubscriptionsResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListSubscriptionsResponse {
    list_subscriptions_by_topic_result: ListSubscriptionsResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListSubscriptionsResult {
    #[serde(default)]
    subscriptions: Option<Vec<Subscription>>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Subscription {
    endpoint: String,
}

impl SnsTopicRegistry {
    /// Create a registry over an HTTP client
    pub fn new(http: AwsHttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl TopicRegistry for SnsTopicRegistry {
    async fn create_topic(&self, name: &str) -> Result<String> {
        let envelope: CreateTopicEnvelope = self.http.post_query("CreateTopic", &[("Name", name)]).await?;
        Ok(envelope.create_topic_response.create_topic_result.topic_arn)
    }

    async fn list_subscription_endpoints(&self, topic_id: &str) -> Result<Vec<String>> {
        let mut endpoints = Vec::new();
        let mut next_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut params = vec![("TopicArn", topic_id)];
            if let Some(token) = next_token.as_deref() {
                params.push(("NextToken", token));
            }

            let envelope: ListSubscriptionsEnvelope = self
                .http
                .post_query("ListSubscriptionsByTopic", &params)
                .await?;
            let result = envelope
                .list_subscriptions_by_topic_response
                .list_subscriptions_by_topic_result;

            endpoints.extend(result.subscriptions.unwrap_or_default().into_iter().map(|s| s.endpoint));

            match result.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => {
                    debug!(topic = topic_id, count = endpoints.len(), "Listed subscriptions");
                    return Ok(endpoints);
                }
            }
        }

        // A partial list would re-subscribe endpoints on the unread pages
        Err(Error::upstream(
            format!("{}:ListSubscriptionsByTopic", self.http.service()),
            format!("still paginating after {MAX_PAGES} pages"),
        ))
    }

    async fn subscribe(&self, topic_id: &str, channel: Channel, endpoint: &str) -> Result<()> {
        let _: serde_json::Value = self
            .http
            .post_query(
                "Subscribe",
                &[
                    ("TopicArn", topic_id),
                    ("Protocol", channel.protocol()),
                    ("Endpoint", endpoint),
                ],
            )
            .await?;
        Ok(())
    }
}
