//! Pub/sub broker contract.
//!
//! A trigger owns one topic; each of its targets is a subscription on that
//! topic. The rule engine publishes to the topic and the broker fans the
//! message out to every subscription.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::faults::FaultInjector;
use crate::types::{SubscriptionHandle, TopicHandle};

/// A topic as reported by [`Broker::list_topics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInfo {
    /// Name the topic was created with.
    pub name: String,
    /// Broker handle.
    pub handle: TopicHandle,
}

/// Topic and subscription management.
pub trait Broker: Send + Sync + 'static {
    /// Creates a topic, or returns the existing one with the same name.
    fn create_topic(&self, name: &str)
    -> impl Future<Output = ServiceResult<TopicHandle>> + Send;

    /// Deletes a topic and every subscription on it.
    fn delete_topic(&self, topic: &TopicHandle) -> impl Future<Output = ServiceResult<()>> + Send;

    /// Subscribes an endpoint to a topic with a delivery protocol.
    fn subscribe(
        &self,
        topic: &TopicHandle,
        protocol: &str,
        endpoint: &str,
    ) -> impl Future<Output = ServiceResult<SubscriptionHandle>> + Send;

    /// Removes a subscription.
    fn unsubscribe(
        &self,
        subscription: &SubscriptionHandle,
    ) -> impl Future<Output = ServiceResult<()>> + Send;

    /// Lists every topic.
    fn list_topics(&self) -> impl Future<Output = ServiceResult<Vec<TopicInfo>>> + Send;
}

/// Protocols the in-memory broker delivers to.
pub const SUPPORTED_PROTOCOLS: &[&str] = &["email", "sms"];

/// One message delivered to one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Topic the message was published on.
    pub topic: TopicHandle,
    /// Subscription that received it.
    pub subscription: SubscriptionHandle,
    /// Delivery protocol.
    pub protocol: String,
    /// Destination address.
    pub endpoint: String,
    /// Message body.
    pub message: String,
    /// Delivery time.
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Subscription {
    topic: TopicHandle,
    protocol: String,
    endpoint: String,
}

#[derive(Debug, Default)]
struct BrokerData {
    topics: HashMap<TopicHandle, String>,
    subscriptions: HashMap<SubscriptionHandle, Subscription>,
    deliveries: Vec<Delivery>,
}

/// A [`Broker`] kept in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    data: Arc<RwLock<BrokerData>>,
    injector: FaultInjector,
}

impl InMemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty broker sharing a fault injector.
    #[must_use]
    pub fn with_injector(injector: FaultInjector) -> Self {
        Self {
            data: Arc::default(),
            injector,
        }
    }

    /// Returns the fault injector.
    #[must_use]
    pub const fn injector(&self) -> &FaultInjector {
        &self.injector
    }

    /// Returns the number of topics.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.data.read().topics.len()
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.data.read().subscriptions.len()
    }

    /// Returns true if the topic exists.
    #[must_use]
    pub fn has_topic(&self, topic: &TopicHandle) -> bool {
        self.data.read().topics.contains_key(topic)
    }

    /// Returns true if the subscription exists.
    #[must_use]
    pub fn has_subscription(&self, subscription: &SubscriptionHandle) -> bool {
        self.data.read().subscriptions.contains_key(subscription)
    }

    /// Returns the endpoints subscribed to a topic.
    #[must_use]
    pub fn endpoints(&self, topic: &TopicHandle) -> Vec<String> {
        let data = self.data.read();
        let mut endpoints: Vec<String> = data
            .subscriptions
            .values()
            .filter(|s| &s.topic == topic)
            .map(|s| s.endpoint.clone())
            .collect();
        endpoints.sort();
        endpoints
    }

    /// Delivers a message to every subscription on a topic.
    ///
    /// Returns the deliveries made, which are also kept in the delivery log.
    pub fn publish(&self, topic: &TopicHandle, message: &str) -> Vec<Delivery> {
        let mut data = self.data.write();
        if !data.topics.contains_key(topic) {
            debug!(topic = %topic, "publish to unknown topic dropped");
            return Vec::new();
        }

        let now = Utc::now();
        let mut made: Vec<Delivery> = data
            .subscriptions
            .iter()
            .filter(|(_, s)| &s.topic == topic)
            .map(|(handle, s)| Delivery {
                topic: topic.clone(),
                subscription: handle.clone(),
                protocol: s.protocol.clone(),
                endpoint: s.endpoint.clone(),
                message: message.to_string(),
                delivered_at: now,
            })
            .collect();
        made.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));

        data.deliveries.extend(made.iter().cloned());
        made
    }

    /// Returns every delivery made so far.
    #[must_use]
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.data.read().deliveries.clone()
    }
}

impl Broker for InMemoryBroker {
    async fn create_topic(&self, name: &str) -> ServiceResult<TopicHandle> {
        self.injector.check("broker.create_topic").await?;
        let handle = TopicHandle::new(format!("arn:memory:sns:{name}"));
        self.data
            .write()
            .topics
            .insert(handle.clone(), name.to_string());
        Ok(handle)
    }

    async fn delete_topic(&self, topic: &TopicHandle) -> ServiceResult<()> {
        self.injector.check("broker.delete_topic").await?;
        let mut data = self.data.write();
        if data.topics.remove(topic).is_none() {
            return Err(ServiceError::NotFound(format!("topic {topic}")));
        }
        data.subscriptions.retain(|_, s| &s.topic != topic);
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &TopicHandle,
        protocol: &str,
        endpoint: &str,
    ) -> ServiceResult<SubscriptionHandle> {
        self.injector.check("broker.subscribe").await?;
        if !SUPPORTED_PROTOCOLS.contains(&protocol) {
            return Err(ServiceError::Rejected(format!(
                "unsupported protocol '{protocol}'"
            )));
        }

        let mut data = self.data.write();
        if !data.topics.contains_key(topic) {
            return Err(ServiceError::NotFound(format!("topic {topic}")));
        }
        let handle = SubscriptionHandle::new(format!("{topic}:{}", Uuid::new_v4()));
        data.subscriptions.insert(
            handle.clone(),
            Subscription {
                topic: topic.clone(),
                protocol: protocol.to_string(),
                endpoint: endpoint.to_string(),
            },
        );
        Ok(handle)
    }

    async fn unsubscribe(&self, subscription: &SubscriptionHandle) -> ServiceResult<()> {
        self.injector.check("broker.unsubscribe").await?;
        if self.data.write().subscriptions.remove(subscription).is_none() {
            return Err(ServiceError::NotFound(format!(
                "subscription {subscription}"
            )));
        }
        Ok(())
    }

    async fn list_topics(&self) -> ServiceResult<Vec<TopicInfo>> {
        self.injector.check("broker.list_topics").await?;
        let data = self.data.read();
        let mut topics: Vec<TopicInfo> = data
            .topics
            .iter()
            .map(|(handle, name)| TopicInfo {
                name: name.clone(),
                handle: handle.clone(),
            })
            .collect();
        topics.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(topics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_topic_is_idempotent_by_name() {
        let broker = InMemoryBroker::new();
        let a = broker.create_topic("trigger-1").await.expect("create");
        let b = broker.create_topic("trigger-1").await.expect("create");
        assert_eq!(a, b);
        assert_eq!(broker.topic_count(), 1);
    }

    #[tokio::test]
    async fn subscribe_and_publish() {
        let broker = InMemoryBroker::new();
        let topic = broker.create_topic("trigger-1").await.expect("create");
        broker
            .subscribe(&topic, "email", "driver@example.com")
            .await
            .expect("subscribe");
        broker
            .subscribe(&topic, "sms", "+15551234567")
            .await
            .expect("subscribe");

        let deliveries = broker.publish(&topic, "RPM high");
        assert_eq!(deliveries.len(), 2);
        assert!(deliveries.iter().all(|d| d.message == "RPM high"));
        assert_eq!(broker.deliveries().len(), 2);
    }

    #[tokio::test]
    async fn subscribe_rejects_unknown_protocol() {
        let broker = InMemoryBroker::new();
        let topic = broker.create_topic("trigger-1").await.expect("create");
        let result = broker.subscribe(&topic, "pager", "123").await;
        assert!(matches!(result, Err(ServiceError::Rejected(_))));
    }

    #[tokio::test]
    async fn subscribe_to_missing_topic_fails() {
        let broker = InMemoryBroker::new();
        let result = broker
            .subscribe(&TopicHandle::new("nope"), "email", "a@b.c")
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_topic_drops_subscriptions() {
        let broker = InMemoryBroker::new();
        let topic = broker.create_topic("trigger-1").await.expect("create");
        let sub = broker
            .subscribe(&topic, "email", "driver@example.com")
            .await
            .expect("subscribe");

        broker.delete_topic(&topic).await.expect("delete");
        assert!(!broker.has_subscription(&sub));
        assert!(matches!(
            broker.delete_topic(&topic).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn unsubscribe_twice_is_not_found() {
        let broker = InMemoryBroker::new();
        let topic = broker.create_topic("trigger-1").await.expect("create");
        let sub = broker
            .subscribe(&topic, "email", "driver@example.com")
            .await
            .expect("subscribe");

        broker.unsubscribe(&sub).await.expect("unsubscribe");
        assert!(matches!(
            broker.unsubscribe(&sub).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_topics_reports_names() {
        let broker = InMemoryBroker::new();
        broker.create_topic("b").await.expect("create");
        broker.create_topic("a").await.expect("create");
        let names: Vec<String> = broker
            .list_topics()
            .await
            .expect("list")
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
