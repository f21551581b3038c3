//! Saga execution context and the compensation stack.
//!
//! Every saga step that creates something pushes the [`Undo`] that removes it.
//! When a later step fails, [`Compensation::unwind`] replays the stack in
//! reverse order. Undo failures are logged and swallowed; "already absent"
//! counts as success.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::broker::Broker;
use crate::config::OrchestratorConfig;
use crate::error::{Result, ServiceError, ServiceResult, TriggerError};
use crate::locks::SagaLocks;
use crate::rules::RuleEngine;
use crate::store::TriggerStore;
use crate::subscriptions::TargetSubscriptionManager;
use crate::types::{RuleHandle, SubscriptionHandle, TargetId, TopicHandle, TriggerId};

/// Runs one collaborator call under a deadline.
///
/// An elapsed deadline is reported as [`ServiceError::Unavailable`].
pub(crate) async fn bounded<T>(
    timeout: Duration,
    op: &'static str,
    call: impl Future<Output = ServiceResult<T>>,
) -> ServiceResult<T> {
    tokio::time::timeout(timeout, call).await.unwrap_or_else(|_| {
        warn!(op, timeout_ms = timeout.as_millis() as u64, "collaborator call timed out");
        Err(ServiceError::Unavailable(format!(
            "{op} timed out after {}ms",
            timeout.as_millis()
        )))
    })
}

/// Treats "already absent" as success.
pub(crate) fn tolerate_absent(result: ServiceResult<()>) -> ServiceResult<()> {
    match result {
        Err(error) if error.is_not_found() => {
            debug!(error = %error, "resource already absent");
            Ok(())
        }
        other => other,
    }
}

/// Everything a saga needs: the collaborators, configuration and lock table.
#[derive(Debug)]
pub struct SagaContext<S, B, R> {
    /// Trigger and target persistence.
    pub store: S,
    /// Topic management.
    pub broker: Arc<B>,
    /// Target subscriptions, sharing `broker`.
    pub subscriptions: TargetSubscriptionManager<B>,
    /// Rule installation.
    pub rules: R,
    /// Orchestrator configuration.
    pub config: OrchestratorConfig,
    /// Per-trigger saga locks.
    pub locks: SagaLocks,
}

impl<S: TriggerStore, B: Broker, R: RuleEngine> SagaContext<S, B, R> {
    /// Builds a context around the three collaborators.
    pub fn new(store: S, broker: B, rules: R, config: OrchestratorConfig) -> Self {
        let broker = Arc::new(broker);
        let subscriptions = TargetSubscriptionManager::new(Arc::clone(&broker), config.call_timeout());
        Self {
            store,
            broker,
            subscriptions,
            rules,
            config,
            locks: SagaLocks::new(),
        }
    }

    /// Runs a store call under the configured deadline.
    pub(crate) async fn store_call<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = ServiceResult<T>>,
    ) -> Result<T> {
        bounded(self.config.call_timeout(), op, call)
            .await
            .map_err(|e| TriggerError::store(&e))
    }

    /// Runs a broker call under the configured deadline.
    pub(crate) async fn broker_call<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = ServiceResult<T>>,
    ) -> Result<T> {
        bounded(self.config.call_timeout(), op, call)
            .await
            .map_err(|e| TriggerError::broker(&e))
    }

    /// Runs a rule engine call under the configured deadline.
    pub(crate) async fn rules_call<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = ServiceResult<T>>,
    ) -> Result<T> {
        bounded(self.config.call_timeout(), op, call)
            .await
            .map_err(|e| TriggerError::rule_engine(&e))
    }
}

/// One compensating action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Undo {
    /// Delete a trigger row.
    DeleteTrigger(TriggerId),
    /// Delete a target row.
    DeleteTarget(TargetId),
    /// Delete a topic.
    DeleteTopic(TopicHandle),
    /// Remove a subscription.
    Unsubscribe(SubscriptionHandle),
    /// Remove an installed rule.
    RemoveRule(RuleHandle),
}

impl fmt::Display for Undo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteTrigger(id) => write!(f, "delete trigger {id}"),
            Self::DeleteTarget(id) => write!(f, "delete target {id}"),
            Self::DeleteTopic(topic) => write!(f, "delete topic {topic}"),
            Self::Unsubscribe(sub) => write!(f, "unsubscribe {sub}"),
            Self::RemoveRule(rule) => write!(f, "remove rule {rule}"),
        }
    }
}

/// LIFO stack of compensating actions for one saga.
#[derive(Debug, Default)]
pub struct Compensation {
    steps: Vec<Undo>,
}

impl Compensation {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the undo for a step that just succeeded.
    pub fn push(&mut self, undo: Undo) {
        self.steps.push(undo);
    }

    /// Returns the number of pending actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if there is nothing to undo.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Replays every pending action, newest first.
    ///
    /// Returns the number of actions that failed.
    pub async fn unwind<S, B, R>(mut self, ctx: &SagaContext<S, B, R>) -> usize
    where
        S: TriggerStore,
        B: Broker,
        R: RuleEngine,
    {
        let timeout = ctx.config.call_timeout();
        let mut failed = 0;

        while let Some(undo) = self.steps.pop() {
            let result = match &undo {
                Undo::DeleteTrigger(id) => {
                    bounded(timeout, "store.delete_trigger", ctx.store.delete_trigger(*id)).await
                }
                Undo::DeleteTarget(id) => {
                    bounded(timeout, "store.delete_target", ctx.store.delete_target(*id)).await
                }
                Undo::DeleteTopic(topic) => {
                    bounded(timeout, "broker.delete_topic", ctx.broker.delete_topic(topic)).await
                }
                Undo::Unsubscribe(sub) => {
                    bounded(timeout, "broker.unsubscribe", ctx.broker.unsubscribe(sub)).await
                }
                Undo::RemoveRule(rule) => {
                    bounded(timeout, "rules.remove_rule", ctx.rules.remove_rule(rule)).await
                }
            };

            match tolerate_absent(result) {
                Ok(()) => debug!(action = %undo, "compensated"),
                Err(error) => {
                    failed += 1;
                    warn!(action = %undo, error = %error, "compensation failed, continuing");
                }
            }
        }

        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::faults::FaultInjector;
    use crate::rules::InMemoryRuleEngine;
    use crate::store::InMemoryStore;

    type MemoryContext = SagaContext<InMemoryStore, InMemoryBroker, InMemoryRuleEngine>;

    fn context(injector: &FaultInjector) -> MemoryContext {
        SagaContext::new(
            InMemoryStore::with_injector(injector.clone()),
            InMemoryBroker::with_injector(injector.clone()),
            InMemoryRuleEngine::with_injector(injector.clone()),
            OrchestratorConfig::default().with_call_timeout(Duration::from_millis(50)),
        )
    }

    #[tokio::test]
    async fn unwind_runs_newest_first() {
        let injector = FaultInjector::new();
        let ctx = context(&injector);
        let topic = ctx.broker.create_topic("t").await.expect("topic");
        let sub = ctx
            .broker
            .subscribe(&topic, "email", "a@example.com")
            .await
            .expect("subscribe");

        let mut undo = Compensation::new();
        undo.push(Undo::DeleteTopic(topic.clone()));
        undo.push(Undo::Unsubscribe(sub));
        assert_eq!(undo.len(), 2);

        let failed = undo.unwind(&ctx).await;
        assert_eq!(failed, 0);
        assert_eq!(ctx.broker.topic_count(), 0);

        let calls = injector.calls();
        let tail: Vec<&str> = calls.iter().rev().take(2).rev().map(String::as_str).collect();
        assert_eq!(tail, vec!["broker.unsubscribe", "broker.delete_topic"]);
    }

    #[tokio::test]
    async fn absent_resources_count_as_undone() {
        let injector = FaultInjector::new();
        let ctx = context(&injector);

        let mut undo = Compensation::new();
        undo.push(Undo::DeleteTrigger(TriggerId::new()));
        undo.push(Undo::RemoveRule(RuleHandle::new("gone")));
        assert_eq!(undo.unwind(&ctx).await, 0);
    }

    #[tokio::test]
    async fn failures_are_counted_and_skipped() {
        let injector = FaultInjector::new();
        let ctx = context(&injector);
        let topic = ctx.broker.create_topic("t").await.expect("topic");
        injector.fail("rules.remove_rule", ServiceError::Unavailable("down".into()));

        let mut undo = Compensation::new();
        undo.push(Undo::DeleteTopic(topic));
        undo.push(Undo::RemoveRule(RuleHandle::new("r")));

        assert_eq!(undo.unwind(&ctx).await, 1);
        assert_eq!(ctx.broker.topic_count(), 0);
    }

    #[tokio::test]
    async fn bounded_times_out() {
        let injector = FaultInjector::new();
        let ctx = context(&injector);
        injector.delay("store.get_trigger", Duration::from_secs(5));

        let result = ctx
            .store_call("store.get_trigger", ctx.store.get_trigger(TriggerId::new()))
            .await;
        assert!(matches!(result, Err(TriggerError::Store(reason)) if reason.contains("timed out")));
    }

    #[test]
    fn undo_display() {
        let undo = Undo::DeleteTopic(TopicHandle::new("arn:topic"));
        assert_eq!(undo.to_string(), "delete topic arn:topic");
    }
}
