//! Rule engine contract.
//!
//! The rule engine evaluates compiled predicates against each device's
//! telemetry stream and publishes the predicate's message to a topic on match.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::broker::{Delivery, InMemoryBroker};
use crate::compiler::Predicate;
use crate::error::{ServiceError, ServiceResult};
use crate::faults::FaultInjector;
use crate::telemetry::ShadowUpdate;
use crate::types::{RuleHandle, TopicHandle};

/// A rule as reported by [`RuleEngine::list_rules`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleInfo {
    /// Name the rule was installed with.
    pub name: String,
    /// Engine handle.
    pub handle: RuleHandle,
    /// SQL dialect version the rule was installed with.
    pub sql_version: String,
}

/// Rule installation and removal.
pub trait RuleEngine: Send + Sync + 'static {
    /// Installs a rule publishing to `topic` whenever `predicate` matches.
    fn install_rule(
        &self,
        name: &str,
        predicate: &Predicate,
        topic: &TopicHandle,
    ) -> impl Future<Output = ServiceResult<RuleHandle>> + Send;

    /// Removes a rule.
    fn remove_rule(&self, rule: &RuleHandle) -> impl Future<Output = ServiceResult<()>> + Send;

    /// Lists every installed rule.
    fn list_rules(&self) -> impl Future<Output = ServiceResult<Vec<RuleInfo>>> + Send;
}

/// A rule selected by a telemetry update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    /// The matching rule.
    pub rule: RuleHandle,
    /// Topic to publish to.
    pub topic: TopicHandle,
    /// Message to publish.
    pub message: String,
}

#[derive(Debug, Clone)]
struct InstalledRule {
    name: String,
    predicate: Predicate,
    topic: TopicHandle,
}

/// A [`RuleEngine`] kept in process memory.
///
/// Installed predicates are evaluated locally by [`InMemoryRuleEngine::evaluate`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryRuleEngine {
    rules: Arc<RwLock<HashMap<RuleHandle, InstalledRule>>>,
    injector: FaultInjector,
}

impl InMemoryRuleEngine {
    /// Creates an empty rule engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty rule engine sharing a fault injector.
    #[must_use]
    pub fn with_injector(injector: FaultInjector) -> Self {
        Self {
            rules: Arc::default(),
            injector,
        }
    }

    /// Returns the fault injector.
    #[must_use]
    pub const fn injector(&self) -> &FaultInjector {
        &self.injector
    }

    /// Returns the number of installed rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    /// Returns true if the rule is installed.
    #[must_use]
    pub fn has_rule(&self, rule: &RuleHandle) -> bool {
        self.rules.read().contains_key(rule)
    }

    /// Returns the predicate text of an installed rule.
    #[must_use]
    pub fn predicate_text(&self, rule: &RuleHandle) -> Option<String> {
        self.rules
            .read()
            .get(rule)
            .map(|r| r.predicate.as_str().to_string())
    }

    /// Evaluates every installed rule against one update.
    #[must_use]
    pub fn evaluate(&self, update: &ShadowUpdate) -> Vec<RuleMatch> {
        let rules = self.rules.read();
        let mut matches: Vec<RuleMatch> = rules
            .iter()
            .filter(|(_, rule)| update.matches(&rule.predicate))
            .map(|(handle, rule)| RuleMatch {
                rule: handle.clone(),
                topic: rule.topic.clone(),
                message: rule.predicate.message().to_string(),
            })
            .collect();
        matches.sort_by(|a, b| a.rule.as_str().cmp(b.rule.as_str()));
        matches
    }

    /// Evaluates an update and publishes every match through `broker`.
    pub fn dispatch(&self, update: &ShadowUpdate, broker: &InMemoryBroker) -> Vec<Delivery> {
        self.evaluate(update)
            .into_iter()
            .flat_map(|m| broker.publish(&m.topic, &m.message))
            .collect()
    }
}

impl RuleEngine for InMemoryRuleEngine {
    async fn install_rule(
        &self,
        name: &str,
        predicate: &Predicate,
        topic: &TopicHandle,
    ) -> ServiceResult<RuleHandle> {
        self.injector.check("rules.install_rule").await?;
        let handle = RuleHandle::new(format!("arn:memory:iot:rule/{name}"));

        let mut rules = self.rules.write();
        if rules.contains_key(&handle) {
            return Err(ServiceError::Rejected(format!("rule {name} already exists")));
        }
        rules.insert(
            handle.clone(),
            InstalledRule {
                name: name.to_string(),
                predicate: predicate.clone(),
                topic: topic.clone(),
            },
        );
        Ok(handle)
    }

    async fn remove_rule(&self, rule: &RuleHandle) -> ServiceResult<()> {
        self.injector.check("rules.remove_rule").await?;
        if self.rules.write().remove(rule).is_none() {
            return Err(ServiceError::NotFound(format!("rule {rule}")));
        }
        Ok(())
    }

    async fn list_rules(&self) -> ServiceResult<Vec<RuleInfo>> {
        self.injector.check("rules.list_rules").await?;
        let rules = self.rules.read();
        let mut listed: Vec<RuleInfo> = rules
            .iter()
            .map(|(handle, rule)| RuleInfo {
                name: rule.name.clone(),
                handle: handle.clone(),
                sql_version: rule.predicate.sql_version().to_string(),
            })
            .collect();
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listed)
    }
}
