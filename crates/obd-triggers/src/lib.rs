//! Threshold triggers for vehicle telemetry.
//!
//! `obd-triggers` lets a user declare "notify me when property P crosses
//! threshold V" on a paired device, compiles that condition into a
//! rule-engine predicate, and provisions everything needed to deliver the
//! notification.
//!
//! # Features
//!
//! - **Condition compiler**: edge-triggered predicates that fire once per crossing
//! - **Lifecycle orchestrator**: create/delete sagas over a store, a pub/sub
//!   broker and a rule engine, with LIFO compensation on partial failure
//! - **Per-trigger serialization**: concurrent sagas on one trigger fail fast with a conflict
//! - **Bounded calls**: every collaborator call runs under a timeout
//! - **Recovery sweep**: removes drafts and orphaned topics and rules after a crash
//! - **In-memory collaborators**: complete fakes with failure injection, for tests and tooling
//!
//! # Example
//!
//! ```rust
//! use obd_triggers::{
//!     CreateTriggerRequest, InMemoryBroker, InMemoryRuleEngine, InMemoryStore,
//!     OrchestratorConfig, ShadowUpdate, TargetSpec, Thing, ThingId, TriggerOrchestrator, UserId,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let runtime = tokio::runtime::Runtime::new()?;
//! # runtime.block_on(async {
//! let store = InMemoryStore::new();
//! store.add_thing(Thing::new(ThingId(1), "car1", UserId(7)));
//!
//! let orchestrator = TriggerOrchestrator::new(
//!     store,
//!     InMemoryBroker::new(),
//!     InMemoryRuleEngine::new(),
//!     OrchestratorConfig::default(),
//! )?;
//!
//! let request = CreateTriggerRequest::new(UserId(7), "car1", "RPM", "gt", 3000.0, "Shift up")
//!     .with_target(TargetSpec::email("driver@example.com"));
//! let created = orchestrator.create_trigger(request).await?;
//! assert!(created.trigger.is_provisioned());
//!
//! // RPM goes from 2800 to 3100: one notification.
//! let update = ShadowUpdate::new("car1").with_transition("RPM", Some(2800.0), 3100.0);
//! let deliveries = orchestrator.rules().dispatch(&update, orchestrator.broker());
//! assert_eq!(deliveries.len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # })
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod broker;
pub mod compiler;
pub mod config;
pub mod error;
pub mod faults;
pub mod locks;
pub mod naming;
pub mod orchestrator;
pub mod recovery;
pub mod rules;
pub mod saga;
pub mod store;
pub mod subscriptions;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use broker::{Broker, Delivery, InMemoryBroker, TopicInfo};
pub use compiler::{ConditionCompiler, Predicate};
pub use config::OrchestratorConfig;
pub use error::{Result, ServiceError, ServiceResult, TriggerError};
pub use faults::FaultInjector;
pub use locks::{SagaGuard, SagaLocks};
pub use naming::ResourceNaming;
pub use orchestrator::TriggerOrchestrator;
pub use recovery::RecoveryReport;
pub use rules::{InMemoryRuleEngine, RuleEngine, RuleInfo, RuleMatch};
pub use saga::{Compensation, SagaContext, Undo};
pub use store::{InMemoryStore, TriggerStore};
pub use subscriptions::TargetSubscriptionManager;
pub use telemetry::ShadowUpdate;
pub use types::{
    Comparator, Condition, CreateTriggerRequest, RuleHandle, SubscriptionHandle, TargetId,
    TargetKind, TargetSpec, Thing, ThingId, TopicHandle, Trigger, TriggerDetails, TriggerHandles,
    TriggerId, TriggerTarget, UserId,
};
