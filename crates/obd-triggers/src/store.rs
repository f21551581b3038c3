//! Persistence contract for triggers and targets.
//!
//! The [`TriggerStore`] trait is implemented by the application's database
//! layer. [`InMemoryStore`] is a complete implementation backed by process
//! memory, used by tests and the CLI.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{ServiceError, ServiceResult};
use crate::faults::FaultInjector;
use crate::types::{
    TargetId, Thing, ThingId, Trigger, TriggerHandles, TriggerId, TriggerTarget, UserId,
};

/// Row-level persistence for triggers and their targets.
///
/// Every write either succeeds completely or fails without a partial row.
pub trait TriggerStore: Send + Sync + 'static {
    /// Looks up a paired device by its unique name.
    fn get_thing_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = ServiceResult<Option<Thing>>> + Send;

    /// Inserts a new trigger row.
    fn insert_trigger(&self, trigger: &Trigger) -> impl Future<Output = ServiceResult<()>> + Send;

    /// Writes both handles of a trigger in one statement.
    fn update_trigger_handles(
        &self,
        id: TriggerId,
        handles: &TriggerHandles,
    ) -> impl Future<Output = ServiceResult<()>> + Send;

    /// Deletes a trigger row. Its targets must already be gone.
    fn delete_trigger(&self, id: TriggerId) -> impl Future<Output = ServiceResult<()>> + Send;

    /// Fetches a trigger row.
    fn get_trigger(
        &self,
        id: TriggerId,
    ) -> impl Future<Output = ServiceResult<Option<Trigger>>> + Send;

    /// Lists the triggers of one account, oldest first.
    fn list_triggers(
        &self,
        user: UserId,
    ) -> impl Future<Output = ServiceResult<Vec<Trigger>>> + Send;

    /// Lists every trigger row, drafts included.
    fn list_all_triggers(&self) -> impl Future<Output = ServiceResult<Vec<Trigger>>> + Send;

    /// Inserts a target row.
    fn insert_target(
        &self,
        target: &TriggerTarget,
    ) -> impl Future<Output = ServiceResult<()>> + Send;

    /// Deletes a target row.
    fn delete_target(&self, id: TargetId) -> impl Future<Output = ServiceResult<()>> + Send;

    /// Fetches a target row.
    fn get_target(
        &self,
        id: TargetId,
    ) -> impl Future<Output = ServiceResult<Option<TriggerTarget>>> + Send;

    /// Lists the targets of a trigger in insertion order.
    fn list_targets(
        &self,
        trigger: TriggerId,
    ) -> impl Future<Output = ServiceResult<Vec<TriggerTarget>>> + Send;
}

#[derive(Debug, Default)]
struct StoreData {
    things: HashMap<ThingId, Thing>,
    triggers: Vec<Trigger>,
    targets: Vec<TriggerTarget>,
}

/// A [`TriggerStore`] kept in process memory.
///
/// Enforces the same constraints a relational schema would: unique ids, a
/// target must reference an existing trigger, and a trigger cannot be deleted
/// while targets still reference it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    data: Arc<RwLock<StoreData>>,
    injector: FaultInjector,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store sharing a fault injector.
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

    /// Registers a paired device.
    pub fn add_thing(&self, thing: Thing) {
        self.data.write().things.insert(thing.id, thing);
    }

    /// Returns the number of trigger rows, drafts included.
    #[must_use]
    pub fn trigger_count(&self) -> usize {
        self.data.read().triggers.len()
    }

    /// Returns the number of target rows.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.data.read().targets.len()
    }

    /// Returns a trigger row without going through the fault injector.
    #[must_use]
    pub fn trigger_row(&self, id: TriggerId) -> Option<Trigger> {
        self.data.read().triggers.iter().find(|t| t.id == id).cloned()
    }
}

impl TriggerStore for InMemoryStore {
    async fn get_thing_by_name(&self, name: &str) -> ServiceResult<Option<Thing>> {
        self.injector.check("store.get_thing_by_name").await?;
        let data = self.data.read();
        Ok(data.things.values().find(|t| t.name == name).cloned())
    }

    async fn insert_trigger(&self, trigger: &Trigger) -> ServiceResult<()> {
        self.injector.check("store.insert_trigger").await?;
        let mut data = self.data.write();
        if data.triggers.iter().any(|t| t.id == trigger.id) {
            return Err(ServiceError::Rejected(format!(
                "trigger {} already exists",
                trigger.id
            )));
        }
        data.triggers.push(trigger.clone());
        Ok(())
    }

    async fn update_trigger_handles(
        &self,
        id: TriggerId,
        handles: &TriggerHandles,
    ) -> ServiceResult<()> {
        self.injector.check("store.update_trigger_handles").await?;
        let mut data = self.data.write();
        let trigger = data
            .triggers
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ServiceError::NotFound(format!("trigger {id}")))?;
        if trigger.handles.is_some() {
            return Err(ServiceError::Rejected(format!(
                "trigger {id} is already provisioned"
            )));
        }
        trigger.handles = Some(handles.clone());
        Ok(())
    }

    async fn delete_trigger(&self, id: TriggerId) -> ServiceResult<()> {
        self.injector.check("store.delete_trigger").await?;
        let mut data = self.data.write();
        if data.targets.iter().any(|t| t.trigger == id) {
            return Err(ServiceError::Rejected(format!(
                "trigger {id} still has targets"
            )));
        }
        let before = data.triggers.len();
        data.triggers.retain(|t| t.id != id);
        if data.triggers.len() == before {
            return Err(ServiceError::NotFound(format!("trigger {id}")));
        }
        Ok(())
    }

    async fn get_trigger(&self, id: TriggerId) -> ServiceResult<Option<Trigger>> {
        self.injector.check("store.get_trigger").await?;
        Ok(self.trigger_row(id))
    }

    async fn list_triggers(&self, user: UserId) -> ServiceResult<Vec<Trigger>> {
        self.injector.check("store.list_triggers").await?;
        let data = self.data.read();
        Ok(data
            .triggers
            .iter()
            .filter(|t| t.user == user)
            .cloned()
            .collect())
    }

    async fn list_all_triggers(&self) -> ServiceResult<Vec<Trigger>> {
        self.injector.check("store.list_all_triggers").await?;
        Ok(self.data.read().triggers.clone())
    }

    async fn insert_target(&self, target: &TriggerTarget) -> ServiceResult<()> {
        self.injector.check("store.insert_target").await?;
        let mut data = self.data.write();
        if !data.triggers.iter().any(|t| t.id == target.trigger) {
            return Err(ServiceError::Rejected(format!(
                "trigger {} does not exist",
                target.trigger
            )));
        }
        if data.targets.iter().any(|t| t.id == target.id) {
            return Err(ServiceError::Rejected(format!(
                "target {} already exists",
                target.id
            )));
        }
        data.targets.push(target.clone());
        Ok(())
    }

    async fn delete_target(&self, id: TargetId) -> ServiceResult<()> {
        self.injector.check("store.delete_target").await?;
        let mut data = self.data.write();
        let before = data.targets.len();
        data.targets.retain(|t| t.id != id);
        if data.targets.len() == before {
            return Err(ServiceError::NotFound(format!("target {id}")));
        }
        Ok(())
    }

    async fn get_target(&self, id: TargetId) -> ServiceResult<Option<TriggerTarget>> {
        self.injector.check("store.get_target").await?;
        let data = self.data.read();
        Ok(data.targets.iter().find(|t| t.id == id).cloned())
    }

    async fn list_targets(&self, trigger: TriggerId) -> ServiceResult<Vec<TriggerTarget>> {
        self.injector.check("store.list_targets").await?;
        let data = self.data.read();
        Ok(data
            .targets
            .iter()
            .filter(|t| t.trigger == trigger)
            .cloned()
            .collect())
    }
}
