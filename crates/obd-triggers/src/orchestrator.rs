//! Trigger lifecycle orchestration.
//!
//! [`TriggerOrchestrator`] provisions and tears down the three resources a
//! trigger needs (the store row, the broker topic with its subscriptions, and
//! the rule engine rule) as one logical unit.
//!
//! Sagas run on their own task: if the caller drops the returned future, the
//! saga still runs to completion and compensates on failure.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::compiler::ConditionCompiler;
use crate::config::OrchestratorConfig;
use crate::error::{Result, TriggerError};
use crate::recovery::{self, RecoveryReport};
use crate::rules::RuleEngine;
use crate::saga::{Compensation, SagaContext, Undo, tolerate_absent};
use crate::store::TriggerStore;
use crate::types::{
    CreateTriggerRequest, TargetId, TargetSpec, Thing, Trigger, TriggerDetails, TriggerHandles,
    TriggerId, TriggerTarget, UserId, ValidTarget, ValidatedTrigger,
};

/// Creates, deletes and inspects triggers.
pub struct TriggerOrchestrator<S, B, R> {
    ctx: Arc<SagaContext<S, B, R>>,
}

impl<S, B, R> Clone for TriggerOrchestrator<S, B, R> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
        }
    }
}

impl<S: TriggerStore, B: Broker, R: RuleEngine> TriggerOrchestrator<S, B, R> {
    /// Creates an orchestrator over the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::Config` if the configuration is invalid.
    pub fn new(store: S, broker: B, rules: R, config: OrchestratorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ctx: Arc::new(SagaContext::new(store, broker, rules, config)),
        })
    }

    /// Returns the configuration in use.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.ctx.config
    }

    /// Returns the store.
    pub fn store(&self) -> &S {
        &self.ctx.store
    }

    /// Returns the broker.
    pub fn broker(&self) -> &B {
        &self.ctx.broker
    }

    /// Returns the rule engine.
    pub fn rules(&self) -> &R {
        &self.ctx.rules
    }

    /// Returns true if a saga is running against `id`.
    pub fn is_busy(&self, id: TriggerId) -> bool {
        self.ctx.locks.is_locked(id)
    }

    /// Creates a trigger with its topic, subscriptions and rule.
    ///
    /// On any failure every resource created so far is removed again before
    /// the error is returned.
    ///
    /// # Errors
    ///
    /// - `Validation` / `InvalidCondition` for bad input (nothing touched)
    /// - `Store`, `Broker` or `RuleEngine` when the failing step's collaborator fails
    /// - `Internal` if the saga task dies
    pub async fn create_trigger(&self, request: CreateTriggerRequest) -> Result<TriggerDetails> {
        let valid = request.validate(self.ctx.config.max_targets_per_trigger)?;
        let id = TriggerId::new();
        let guard = self.ctx.locks.try_acquire(id)?;
        let ctx = Arc::clone(&self.ctx);
        let user = request.user;

        run_detached(async move {
            let _guard = guard;
            create_saga(&ctx, id, user, valid).await
        })
        .await
    }

    /// Deletes a trigger, its rule, its topic and its targets.
    ///
    /// Rule and topic removal failures are fatal and leave the row in place so
    /// the call can be retried.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the trigger does not exist or belongs to another user
    /// - `Conflict` if another saga is running against it
    /// - `RuleEngine`, `Broker` or `Store` when the corresponding removal fails
    pub async fn delete_trigger(&self, user: UserId, id: TriggerId) -> Result<()> {
        let guard = self.ctx.locks.try_acquire(id)?;
        let ctx = Arc::clone(&self.ctx);

        run_detached(async move {
            let _guard = guard;
            delete_saga(&ctx, user, id).await
        })
        .await
    }

    /// Adds a notification target to a provisioned trigger.
    ///
    /// # Errors
    ///
    /// - `Validation` for a bad target or when the target limit is reached
    /// - `NotFound` if the trigger is not visible to `user`
    /// - `Conflict` if another saga is running against the trigger
    /// - `Broker` if subscribing fails (nothing persisted)
    /// - `Store` if the row cannot be written (the subscription is removed again)
    pub async fn add_target(
        &self,
        user: UserId,
        trigger_id: TriggerId,
        spec: TargetSpec,
    ) -> Result<TriggerTarget> {
        let target = spec.validate()?;
        let guard = self.ctx.locks.try_acquire(trigger_id)?;
        let ctx = Arc::clone(&self.ctx);

        run_detached(async move {
            let _guard = guard;
            add_target_saga(&ctx, user, trigger_id, target).await
        })
        .await
    }

    /// Removes a notification target.
    ///
    /// The row is only deleted once the subscription is gone.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the target is not visible to `user`
    /// - `Conflict` if another saga is running against the owning trigger
    /// - `Broker` if unsubscribing fails (row kept)
    /// - `Store` if the row cannot be deleted
    pub async fn remove_target(&self, user: UserId, target_id: TargetId) -> Result<()> {
        let target = self.get_target(user, target_id).await?;
        let guard = self.ctx.locks.try_acquire(target.trigger)?;
        let ctx = Arc::clone(&self.ctx);

        run_detached(async move {
            let _guard = guard;
            remove_target_saga(&ctx, user, target_id).await
        })
        .await
    }

    /// Returns a provisioned trigger with its targets.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the trigger is absent, a draft, or owned by another user.
    pub async fn get_trigger(&self, user: UserId, id: TriggerId) -> Result<TriggerDetails> {
        let trigger = visible_trigger(&self.ctx, user, id).await?;
        let targets = self
            .ctx
            .store_call("store.list_targets", self.ctx.store.list_targets(id))
            .await?;
        Ok(TriggerDetails { trigger, targets })
    }

    /// Lists the provisioned triggers of `user`.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the store cannot be read.
    pub async fn list_triggers(&self, user: UserId) -> Result<Vec<Trigger>> {
        let triggers = self
            .ctx
            .store_call("store.list_triggers", self.ctx.store.list_triggers(user))
            .await?;
        Ok(triggers.into_iter().filter(Trigger::is_provisioned).collect())
    }

    /// Lists the targets of a trigger.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the trigger is not visible to `user`.
    pub async fn list_targets(&self, user: UserId, trigger_id: TriggerId) -> Result<Vec<TriggerTarget>> {
        visible_trigger(&self.ctx, user, trigger_id).await?;
        self.ctx
            .store_call("store.list_targets", self.ctx.store.list_targets(trigger_id))
            .await
    }

    /// Returns one target.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the target or its trigger is not visible to `user`.
    pub async fn get_target(&self, user: UserId, target_id: TargetId) -> Result<TriggerTarget> {
        let target = self
            .ctx
            .store_call("store.get_target", self.ctx.store.get_target(target_id))
            .await?
            .ok_or_else(|| target_not_found(target_id))?;

        visible_trigger(&self.ctx, user, target.trigger)
            .await
            .map_err(|e| match e {
                TriggerError::NotFound { .. } => target_not_found(target_id),
                other => other,
            })?;
        Ok(target)
    }

    /// Reconciles drafts and orphaned topics and rules left by interrupted sagas.
    ///
    /// # Errors
    ///
    /// Returns an error only if a listing call fails; per-item failures are
    /// counted in the report.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let ctx = Arc::clone(&self.ctx);
        run_detached(async move { recovery::sweep(&ctx).await }).await
    }
}

/// Runs a saga on its own task so that dropping the caller cannot interrupt it.
async fn run_detached<T, F>(saga: F) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    tokio::spawn(saga)
        .await
        .map_err(|e| TriggerError::Internal(format!("saga task failed: {e}")))?
}

fn trigger_not_found(id: TriggerId) -> TriggerError {
    TriggerError::NotFound {
        kind: "trigger",
        id: id.to_string(),
    }
}

fn target_not_found(id: TargetId) -> TriggerError {
    TriggerError::NotFound {
        kind: "target",
        id: id.to_string(),
    }
}

/// Fetches a trigger the user may see: present, owned, and provisioned.
async fn visible_trigger<S, B, R>(
    ctx: &SagaContext<S, B, R>,
    user: UserId,
    id: TriggerId,
) -> Result<Trigger>
where
    S: TriggerStore,
    B: Broker,
    R: RuleEngine,
{
    ctx.store_call("store.get_trigger", ctx.store.get_trigger(id))
        .await?
        .filter(|t| t.user == user && t.is_provisioned())
        .ok_or_else(|| trigger_not_found(id))
}

async fn create_saga<S, B, R>(
    ctx: &SagaContext<S, B, R>,
    id: TriggerId,
    user: UserId,
    valid: ValidatedTrigger,
) -> Result<TriggerDetails>
where
    S: TriggerStore,
    B: Broker,
    R: RuleEngine,
{
    let thing = ctx
        .store_call("store.get_thing_by_name", ctx.store.get_thing_by_name(&valid.thing_name))
        .await?
        .filter(|thing| thing.owner == user)
        .ok_or_else(|| {
            TriggerError::validation(format!(
                "thing '{}' is not paired to this account",
                valid.thing_name
            ))
        })?;

    let ValidatedTrigger {
        condition,
        message,
        targets,
        ..
    } = valid;
    let draft = Trigger::draft(id, user, thing.id, condition, message);

    ctx.store_call("store.insert_trigger", ctx.store.insert_trigger(&draft))
        .await?;
    debug!(trigger_id = %id, thing = %thing.name, "draft trigger stored");

    let mut undo = Compensation::new();
    undo.push(Undo::DeleteTrigger(id));

    match provision(ctx, &mut undo, draft, &thing, &targets).await {
        Ok(details) => {
            info!(
                trigger_id = %id,
                thing = %thing.name,
                condition = %details.trigger.condition,
                targets = details.targets.len(),
                "trigger created"
            );
            Ok(details)
        }
        Err(error) => {
            warn!(
                trigger_id = %id,
                error = %error,
                steps = undo.len(),
                "trigger creation failed, compensating"
            );
            let failed = undo.unwind(ctx).await;
            if failed > 0 {
                warn!(trigger_id = %id, failed, "compensation incomplete, recovery sweep required");
            }
            Err(error)
        }
    }
}

/// Creation steps after the draft row: topic, subscriptions, rule, commit.
async fn provision<S, B, R>(
    ctx: &SagaContext<S, B, R>,
    undo: &mut Compensation,
    mut trigger: Trigger,
    thing: &Thing,
    targets: &[ValidTarget],
) -> Result<TriggerDetails>
where
    S: TriggerStore,
    B: Broker,
    R: RuleEngine,
{
    let id = trigger.id;
    let topic_name = ctx.config.naming.topic_name(id);
    let topic = ctx
        .broker_call("broker.create_topic", ctx.broker.create_topic(&topic_name))
        .await?;
    undo.push(Undo::DeleteTopic(topic.clone()));
    debug!(trigger_id = %id, topic = %topic, "topic created");

    let mut rows = Vec::with_capacity(targets.len());
    for target in targets {
        let subscription = ctx
            .subscriptions
            .subscribe(&topic, target.kind, &target.address)
            .await?;
        undo.push(Undo::Unsubscribe(subscription.clone()));

        let row = TriggerTarget {
            id: TargetId::new(),
            trigger: id,
            kind: target.kind,
            address: target.address.clone(),
            subscription,
        };
        ctx.store_call("store.insert_target", ctx.store.insert_target(&row))
            .await?;
        undo.push(Undo::DeleteTarget(row.id));
        rows.push(row);
    }

    let predicate =
        ConditionCompiler::new().compile_condition(&thing.name, &trigger.condition, &trigger.message)?;
    let rule_name = ctx.config.naming.rule_name(id);
    let rule = ctx
        .rules_call(
            "rules.install_rule",
            ctx.rules.install_rule(&rule_name, &predicate, &topic),
        )
        .await?;
    undo.push(Undo::RemoveRule(rule.clone()));
    debug!(trigger_id = %id, rule = %rule, "rule installed");

    let handles = TriggerHandles { topic, rule };
    ctx.store_call(
        "store.update_trigger_handles",
        ctx.store.update_trigger_handles(id, &handles),
    )
    .await?;
    trigger.handles = Some(handles);

    Ok(TriggerDetails {
        trigger,
        targets: rows,
    })
}

async fn delete_saga<S, B, R>(ctx: &SagaContext<S, B, R>, user: UserId, id: TriggerId) -> Result<()>
where
    S: TriggerStore,
    B: Broker,
    R: RuleEngine,
{
    let trigger = ctx
        .store_call("store.get_trigger", ctx.store.get_trigger(id))
        .await?
        .filter(|t| t.user == user)
        .ok_or_else(|| trigger_not_found(id))?;
    let targets = ctx
        .store_call("store.list_targets", ctx.store.list_targets(id))
        .await?;

    if let Some(handles) = &trigger.handles {
        let removed = ctx
            .rules_call("rules.remove_rule", async {
                tolerate_absent(ctx.rules.remove_rule(&handles.rule).await)
            })
            .await;
        if let Err(error) = removed {
            warn!(trigger_id = %id, rule = %handles.rule, error = %error, "rule removal failed");
            return Err(error);
        }

        let deleted = ctx
            .broker_call("broker.delete_topic", async {
                tolerate_absent(ctx.broker.delete_topic(&handles.topic).await)
            })
            .await;
        if let Err(error) = deleted {
            warn!(trigger_id = %id, topic = %handles.topic, error = %error, "topic deletion failed");
            return Err(error);
        }
    } else {
        // A draft records no handles, but an interrupted creation may still
        // have left a rule and a topic under names derived from its id.
        remove_draft_leftovers(ctx, id).await?;
        for target in &targets {
            if let Err(error) = ctx.subscriptions.unsubscribe(&target.subscription).await {
                warn!(target_id = %target.id, error = %error, "draft target unsubscribe failed");
            }
        }
    }

    for target in &targets {
        ctx.store_call("store.delete_target", async {
            tolerate_absent(ctx.store.delete_target(target.id).await)
        })
        .await?;
    }
    ctx.store_call("store.delete_trigger", async {
        tolerate_absent(ctx.store.delete_trigger(id).await)
    })
    .await?;

    info!(trigger_id = %id, targets = targets.len(), "trigger deleted");
    Ok(())
}

/// Removes the rule and topic named after a draft's id, if they exist.
async fn remove_draft_leftovers<S, B, R>(ctx: &SagaContext<S, B, R>, id: TriggerId) -> Result<()>
where
    S: TriggerStore,
    B: Broker,
    R: RuleEngine,
{
    let naming = &ctx.config.naming;

    let rules = ctx
        .rules_call("rules.list_rules", ctx.rules.list_rules())
        .await?;
    for rule in rules.iter().filter(|r| naming.trigger_for_rule(&r.name) == Some(id)) {
        let removed = ctx
            .rules_call("rules.remove_rule", async {
                tolerate_absent(ctx.rules.remove_rule(&rule.handle).await)
            })
            .await;
        if let Err(error) = removed {
            warn!(trigger_id = %id, rule = %rule.handle, error = %error, "draft rule removal failed");
            return Err(error);
        }
        debug!(trigger_id = %id, rule = %rule.handle, "draft rule removed");
    }

    let topics = ctx
        .broker_call("broker.list_topics", ctx.broker.list_topics())
        .await?;
    for topic in topics.iter().filter(|t| naming.trigger_for_topic(&t.name) == Some(id)) {
        let deleted = ctx
            .broker_call("broker.delete_topic", async {
                tolerate_absent(ctx.broker.delete_topic(&topic.handle).await)
            })
            .await;
        if let Err(error) = deleted {
            warn!(trigger_id = %id, topic = %topic.handle, error = %error, "draft topic deletion failed");
            return Err(error);
        }
        debug!(trigger_id = %id, topic = %topic.handle, "draft topic deleted");
    }
    Ok(())
}

async fn add_target_saga<S, B, R>(
    ctx: &SagaContext<S, B, R>,
    user: UserId,
    trigger_id: TriggerId,
    target: ValidTarget,
) -> Result<TriggerTarget>
where
    S: TriggerStore,
    B: Broker,
    R: RuleEngine,
{
    let trigger = visible_trigger(ctx, user, trigger_id).await?;
    let Some(topic) = trigger.topic() else {
        return Err(trigger_not_found(trigger_id));
    };

    let existing = ctx
        .store_call("store.list_targets", ctx.store.list_targets(trigger_id))
        .await?;
    let limit = ctx.config.max_targets_per_trigger;
    if existing.len() >= limit {
        return Err(TriggerError::validation(format!(
            "trigger {trigger_id} already has the maximum of {limit} targets"
        )));
    }

    let subscription = ctx
        .subscriptions
        .subscribe(topic, target.kind, &target.address)
        .await?;
    let mut undo = Compensation::new();
    undo.push(Undo::Unsubscribe(subscription.clone()));

    let row = TriggerTarget {
        id: TargetId::new(),
        trigger: trigger_id,
        kind: target.kind,
        address: target.address,
        subscription,
    };
    if let Err(error) = ctx
        .store_call("store.insert_target", ctx.store.insert_target(&row))
        .await
    {
        warn!(trigger_id = %trigger_id, error = %error, "target row insert failed, unsubscribing");
        undo.unwind(ctx).await;
        return Err(error);
    }

    info!(trigger_id = %trigger_id, target_id = %row.id, kind = %row.kind, "target added");
    Ok(row)
}

async fn remove_target_saga<S, B, R>(
    ctx: &SagaContext<S, B, R>,
    user: UserId,
    target_id: TargetId,
) -> Result<()>
where
    S: TriggerStore,
    B: Broker,
    R: RuleEngine,
{
    // Re-read under the lock: a concurrent removal may have won.
    let target = ctx
        .store_call("store.get_target", ctx.store.get_target(target_id))
        .await?
        .ok_or_else(|| target_not_found(target_id))?;
    visible_trigger(ctx, user, target.trigger).await?;

    if let Err(error) = ctx.subscriptions.unsubscribe(&target.subscription).await {
        warn!(target_id = %target_id, error = %error, "unsubscribe failed, keeping target row");
        return Err(error);
    }

    ctx.store_call("store.delete_target", async {
        tolerate_absent(ctx.store.delete_target(target_id).await)
    })
    .await?;

    info!(trigger_id = %target.trigger, target_id = %target_id, "target removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::error::ServiceError;
    use crate::faults::FaultInjector;
    use crate::rules::InMemoryRuleEngine;
    use crate::store::InMemoryStore;
    use crate::types::ThingId;

    type MemoryOrchestrator = TriggerOrchestrator<InMemoryStore, InMemoryBroker, InMemoryRuleEngine>;

    const OWNER: UserId = UserId(1);

    fn orchestrator(injector: &FaultInjector) -> MemoryOrchestrator {
        let store = InMemoryStore::with_injector(injector.clone());
        store.add_thing(Thing::new(ThingId(1), "car1", OWNER));
        TriggerOrchestrator::new(
            store,
            InMemoryBroker::with_injector(injector.clone()),
            InMemoryRuleEngine::with_injector(injector.clone()),
            OrchestratorConfig::default(),
        )
        .expect("valid config")
    }

    fn request() -> CreateTriggerRequest {
        CreateTriggerRequest::new(OWNER, "car1", "RPM", "gt", 3000.0, "Shift up")
            .with_target(TargetSpec::email("driver@example.com"))
    }

    #[tokio::test]
    async fn create_then_read_back() {
        let orch = orchestrator(&FaultInjector::new());
        let created = orch.create_trigger(request()).await.expect("create");

        let fetched = orch
            .get_trigger(OWNER, created.trigger.id)
            .await
            .expect("get");
        assert_eq!(fetched, created);
        assert_eq!(orch.list_triggers(OWNER).await.expect("list").len(), 1);
        assert!(!orch.is_busy(created.trigger.id));
    }

    #[tokio::test]
    async fn invalid_request_touches_nothing() {
        let injector = FaultInjector::new();
        let orch = orchestrator(&injector);
        let bad = CreateTriggerRequest::new(OWNER, "car1", "RPM", "between", 1.0, "x");

        assert!(matches!(
            orch.create_trigger(bad).await,
            Err(TriggerError::InvalidCondition { .. })
        ));
        assert!(injector.calls().is_empty());
    }

    #[tokio::test]
    async fn foreign_thing_is_validation_error() {
        let orch = orchestrator(&FaultInjector::new());
        let mut req = request();
        req.user = UserId(2);

        assert!(matches!(
            orch.create_trigger(req).await,
            Err(TriggerError::Validation { .. })
        ));
        assert_eq!(orch.store().trigger_count(), 0);
    }

    #[tokio::test]
    async fn draft_insert_failure_is_store_error() {
        let injector = FaultInjector::new();
        let orch = orchestrator(&injector);
        injector.fail_once("store.insert_trigger", ServiceError::Unavailable("db".into()));

        assert!(matches!(
            orch.create_trigger(request()).await,
            Err(TriggerError::Store(_))
        ));
        assert_eq!(injector.call_count("broker.create_topic"), 0);
    }

    #[tokio::test]
    async fn topic_failure_deletes_draft() {
        let injector = FaultInjector::new();
        let orch = orchestrator(&injector);
        injector.fail_once("broker.create_topic", ServiceError::Rejected("quota".into()));

        assert!(matches!(
            orch.create_trigger(request()).await,
            Err(TriggerError::Broker(_))
        ));
        assert_eq!(orch.store().trigger_count(), 0);
        assert_eq!(injector.call_count("store.delete_trigger"), 1);
    }

    #[tokio::test]
    async fn commit_failure_removes_rule() {
        let injector = FaultInjector::new();
        let orch = orchestrator(&injector);
        injector.fail_once(
            "store.update_trigger_handles",
            ServiceError::Unavailable("db".into()),
        );

        assert!(matches!(
            orch.create_trigger(request()).await,
            Err(TriggerError::Store(_))
        ));
        assert_eq!(orch.rules().rule_count(), 0);
        assert_eq!(orch.broker().topic_count(), 0);
        assert_eq!(orch.store().trigger_count(), 0);
        assert_eq!(orch.store().target_count(), 0);
    }

    #[tokio::test]
    async fn other_users_cannot_see_or_delete() {
        let orch = orchestrator(&FaultInjector::new());
        let created = orch.create_trigger(request()).await.expect("create");
        let id = created.trigger.id;

        assert!(matches!(
            orch.get_trigger(UserId(2), id).await,
            Err(TriggerError::NotFound { .. })
        ));
        assert!(matches!(
            orch.delete_trigger(UserId(2), id).await,
            Err(TriggerError::NotFound { .. })
        ));
        assert!(matches!(
            orch.get_target(UserId(2), created.targets[0].id).await,
            Err(TriggerError::NotFound { kind: "target", .. })
        ));
        assert!(orch.list_triggers(UserId(2)).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn busy_trigger_conflicts() {
        let orch = orchestrator(&FaultInjector::new());
        let created = orch.create_trigger(request()).await.expect("create");
        let id = created.trigger.id;

        let _held = orch.ctx.locks.try_acquire(id).expect("lock");
        assert!(matches!(
            orch.delete_trigger(OWNER, id).await,
            Err(TriggerError::Conflict { .. })
        ));
        assert!(matches!(
            orch.add_target(OWNER, id, TargetSpec::sms("+15550001111")).await,
            Err(TriggerError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn target_limit_enforced() {
        let injector = FaultInjector::new();
        let store = InMemoryStore::with_injector(injector.clone());
        store.add_thing(Thing::new(ThingId(1), "car1", OWNER));
        let orch = TriggerOrchestrator::new(
            store,
            InMemoryBroker::with_injector(injector.clone()),
            InMemoryRuleEngine::with_injector(injector.clone()),
            OrchestratorConfig::default().with_max_targets(1),
        )
        .expect("valid config");

        let created = orch.create_trigger(request()).await.expect("create");
        let result = orch
            .add_target(OWNER, created.trigger.id, TargetSpec::sms("+15550001111"))
            .await;
        assert!(matches!(result, Err(TriggerError::Validation { .. })));
        assert_eq!(injector.call_count("broker.subscribe"), 1);
    }

    #[tokio::test]
    async fn target_row_failure_unsubscribes() {
        let injector = FaultInjector::new();
        let orch = orchestrator(&injector);
        let created = orch.create_trigger(request()).await.expect("create");
        injector.fail_once("store.insert_target", ServiceError::Unavailable("db".into()));

        let result = orch
            .add_target(OWNER, created.trigger.id, TargetSpec::sms("+15550001111"))
            .await;
        assert!(matches!(result, Err(TriggerError::Store(_))));
        assert_eq!(orch.broker().subscription_count(), 1);
        assert_eq!(orch.store().target_count(), 1);
    }

    #[tokio::test]
    async fn remove_target_keeps_row_when_unsubscribe_fails() {
        let injector = FaultInjector::new();
        let orch = orchestrator(&injector);
        let created = orch.create_trigger(request()).await.expect("create");
        let target = created.targets[0].id;
        injector.fail_once("broker.unsubscribe", ServiceError::Unavailable("sns".into()));

        assert!(matches!(
            orch.remove_target(OWNER, target).await,
            Err(TriggerError::Broker(_))
        ));
        assert!(orch.get_target(OWNER, target).await.is_ok());

        orch.remove_target(OWNER, target).await.expect("retry");
        assert_eq!(orch.broker().subscription_count(), 0);
        assert!(matches!(
            orch.get_target(OWNER, target).await,
            Err(TriggerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn delete_retry_after_topic_failure() {
        let injector = FaultInjector::new();
        let orch = orchestrator(&injector);
        let created = orch.create_trigger(request()).await.expect("create");
        let id = created.trigger.id;
        injector.fail_once("broker.delete_topic", ServiceError::Unavailable("sns".into()));

        assert!(matches!(
            orch.delete_trigger(OWNER, id).await,
            Err(TriggerError::Broker(_))
        ));
        assert_eq!(orch.rules().rule_count(), 0);
        assert!(orch.store().trigger_row(id).is_some());

        orch.delete_trigger(OWNER, id).await.expect("retry");
        assert_eq!(orch.broker().topic_count(), 0);
        assert_eq!(orch.store().trigger_count(), 0);
        assert_eq!(orch.store().target_count(), 0);
    }
}
