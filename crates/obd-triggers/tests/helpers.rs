//! Shared setup for the orchestrator integration tests.

#![allow(dead_code)]

use std::time::Duration;

use obd_triggers::{
    CreateTriggerRequest, FaultInjector, InMemoryBroker, InMemoryRuleEngine, InMemoryStore,
    OrchestratorConfig, TargetSpec, Thing, ThingId, TriggerOrchestrator, UserId,
};

/// Orchestrator over the in-memory collaborators.
pub type MemoryOrchestrator = TriggerOrchestrator<InMemoryStore, InMemoryBroker, InMemoryRuleEngine>;

/// Owner of `car1`.
pub const OWNER: UserId = UserId(1);

/// A user with no paired devices.
pub const STRANGER: UserId = UserId(2);

/// Orchestrator plus the fault injector shared by all three collaborators.
pub struct Harness {
    pub injector: FaultInjector,
    pub orchestrator: MemoryOrchestrator,
}

impl Harness {
    /// Default configuration with a short call timeout.
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default().with_call_timeout(Duration::from_millis(200)))
    }

    /// Custom configuration.
    pub fn with_config(config: OrchestratorConfig) -> Self {
        let injector = FaultInjector::new();
        let store = InMemoryStore::with_injector(injector.clone());
        store.add_thing(Thing::new(ThingId(1), "car1", OWNER));
        store.add_thing(Thing::new(ThingId(2), "car2", OWNER));

        let orchestrator = TriggerOrchestrator::new(
            store,
            InMemoryBroker::with_injector(injector.clone()),
            InMemoryRuleEngine::with_injector(injector.clone()),
            config,
        )
        .expect("valid config");

        Self {
            injector,
            orchestrator,
        }
    }

    /// Asserts that no trigger resources exist anywhere.
    pub fn assert_empty(&self) {
        let orch = &self.orchestrator;
        assert_eq!(orch.store().trigger_count(), 0, "trigger rows left behind");
        assert_eq!(orch.store().target_count(), 0, "target rows left behind");
        assert_eq!(orch.broker().topic_count(), 0, "topics left behind");
        assert_eq!(orch.broker().subscription_count(), 0, "subscriptions left behind");
        assert_eq!(orch.rules().rule_count(), 0, "rules left behind");
    }
}

/// car1 / RPM / gt / 3000 with one email target.
pub fn rpm_request() -> CreateTriggerRequest {
    CreateTriggerRequest::new(OWNER, "car1", "RPM", "gt", 3000.0, "Shift up")
        .with_target(TargetSpec::email("driver@example.com"))
}
