//! Subscription management for notification targets.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::broker::Broker;
use crate::error::{Result, TriggerError};
use crate::saga::{bounded, tolerate_absent};
use crate::types::{SubscriptionHandle, TargetKind, TopicHandle};

/// Subscribes and unsubscribes notification targets on a trigger's topic.
///
/// Each [`TargetKind`] maps to exactly one broker delivery protocol.
#[derive(Debug)]
pub struct TargetSubscriptionManager<B> {
    broker: Arc<B>,
    timeout: Duration,
}

impl<B: Broker> TargetSubscriptionManager<B> {
    /// Creates a manager bounding every broker call by `timeout`.
    pub const fn new(broker: Arc<B>, timeout: Duration) -> Self {
        Self { broker, timeout }
    }

    /// Returns the underlying broker.
    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Subscribes `address` to `topic`.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::Broker` if the broker rejects the address or
    /// kind, or does not answer in time.
    pub async fn subscribe(
        &self,
        topic: &TopicHandle,
        kind: TargetKind,
        address: &str,
    ) -> Result<SubscriptionHandle> {
        let handle = bounded(
            self.timeout,
            "broker.subscribe",
            self.broker.subscribe(topic, kind.protocol(), address),
        )
        .await
        .map_err(|e| TriggerError::broker(&e))?;

        info!(topic = %topic, kind = %kind, subscription = %handle, "target subscribed");
        Ok(handle)
    }

    /// Removes a subscription. A subscription that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::Broker` for any other broker failure.
    pub async fn unsubscribe(&self, subscription: &SubscriptionHandle) -> Result<()> {
        let result = bounded(
            self.timeout,
            "broker.unsubscribe",
            self.broker.unsubscribe(subscription),
        )
        .await;

        tolerate_absent(result).map_err(|e| TriggerError::broker(&e))?;
        debug!(subscription = %subscription, "target unsubscribed");
        Ok(())
    }
}
