//! Idempotent topic subscription management

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::clients::TopicRegistry;
use crate::error::Result;
use crate::models::{Channel, CommunicationsTargets};

/// Topic ids after a subscription pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicIds {
    /// SMS (event) topic
    pub sms: String,
    /// Email (alarm) topic
    pub email: String,
}

impl TopicIds {
    /// Both ids, SMS first
    pub fn to_vec(&self) -> Vec<String> {
        vec![self.sms.clone(), self.email.clone()]
    }
}

/// Outcome of one channel's pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSubscriptions {
    /// Topic the channel publishes to
    pub topic_id: String,
    /// Endpoints subscribed during this pass
    pub added: Vec<String>,
    /// Endpoints that were already subscribed
    pub existing: usize,
}

/// Keeps SMS and email targets subscribed to their topics
pub struct SubscriptionManager {
    registry: Arc<dyn TopicRegistry>,
    sms_topic: String,
    email_topic: String,
}

impl SubscriptionManager {
    /// Create a manager for the named SMS and email topics
    pub fn new(registry: Arc<dyn TopicRegistry>, sms_topic: impl Into<String>, email_topic: impl Into<String>) -> Self {
        Self {
            registry,
            sms_topic: sms_topic.into(),
            email_topic: email_topic.into(),
        }
    }

    /// Refresh both channels, SMS first
    pub async fn refresh(&self, targets: &CommunicationsTargets) -> Result<TopicIds> {
        let sms = self.ensure(Channel::Sms, &self.sms_topic, &targets.sms).await?;
        let email = self.ensure(Channel::Email, &self.email_topic, &targets.email).await?;

        Ok(TopicIds {
            sms: sms.topic_id,
            email: email.topic_id,
        })
    }

    /// Make sure every endpoint is subscribed to `topic_name`.
    ///
    /// The registry's current subscription list is the only source of truth;
    /// endpoints already on it are skipped, so repeated passes converge.
    pub async fn ensure(&self, channel: Channel, topic_name: &str, endpoints: &[String]) -> Result<ChannelSubscriptions> {
        let topic_id = self.registry.create_topic(topic_name).await.map_err(|e| {
            error!(%channel, topic = topic_name, error = %e, "Error creating topic");
            e
        })?;
        debug!(%channel, topic_id = %topic_id, "Resolved topic");

        let subscribed: HashSet<String> = self
            .registry
            .list_subscription_endpoints(&topic_id)
            .await
            .map_err(|e| {
                error!(%channel, topic_id = %topic_id, error = %e, "Error listing subscriptions");
                e
            })?
            .into_iter()
            .collect();

        let mut seen = HashSet::new();
        let mut added = Vec::new();
        let mut existing = 0;

        for endpoint in endpoints {
            if !seen.insert(endpoint.as_str()) {
                continue;
            }

            if subscribed.contains(endpoint) {
                debug!(%channel, endpoint = %endpoint, "Already subscribed");
                existing += 1;
                continue;
            }

            info!(%channel, endpoint = %endpoint, "Subscribing endpoint");
            self.registry
                .subscribe(&topic_id, channel, endpoint)
                .await
                .map_err(|e| {
                    error!(%channel, endpoint = %endpoint, error = %e, "Error subscribing endpoint");
                    e
                })?;

            metrics::counter!("xcw_subscriptions_created_total", "channel" => channel.protocol())
                .increment(1);
            added.push(endpoint.clone());
        }

        Ok(ChannelSubscriptions {
            topic_id,
            added,
            existing,
        })
    }
}
