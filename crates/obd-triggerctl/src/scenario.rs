//! JSON scenarios run against the in-memory collaborators.
//!
//! A scenario pairs some devices and then executes a list of steps: trigger
//! and target sagas, telemetry updates, fault injection and recovery sweeps.
//! Steps never abort the run; each one is recorded as a [`StepOutcome`].
//!
//! ```json
//! {
//!   "things": [{ "id": 1, "name": "car1", "owner": 7 }],
//!   "steps": [
//!     { "op": "create", "name": "rpm", "request": {
//!         "user": 7, "thing_name": "car1", "property": "RPM", "comparator": "gt",
//!         "threshold": 3000, "message": "Shift up",
//!         "targets": [{ "kind": "email", "address": "driver@example.com" }] } },
//!     { "op": "ingest", "thing": "car1",
//!       "document": { "state": { "reported": { "prevRPM": 2800, "currRPM": 3100 } } } },
//!     { "op": "delete", "trigger": "rpm", "user": 7 }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use obd_triggers::{
    CreateTriggerRequest, FaultInjector, InMemoryBroker, InMemoryRuleEngine, InMemoryStore,
    OrchestratorConfig, RecoveryReport, ServiceError, ShadowUpdate, TargetSpec, Thing,
    TriggerId, TriggerOrchestrator, UserId,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::CliError;
use crate::output::{ResourceSummary, ScenarioReport, StepOutcome};

/// Orchestrator over the in-memory collaborators.
pub type MemoryOrchestrator = TriggerOrchestrator<InMemoryStore, InMemoryBroker, InMemoryRuleEngine>;

/// A scenario file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Devices paired before the first step.
    #[serde(default)]
    pub things: Vec<Thing>,
    /// Steps, executed in order.
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Parses a scenario from JSON.
    ///
    /// # Errors
    ///
    /// Returns `CliError::Scenario` if the document is malformed.
    pub fn from_json(json: &str) -> Result<Self, CliError> {
        serde_json::from_str(json).map_err(|e| CliError::Scenario(format!("invalid scenario: {e}")))
    }

    /// Reads and parses a scenario file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is malformed.
    pub fn from_file(path: &Path) -> Result<Self, CliError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// One scenario step, tagged by `op`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Runs the creation saga and remembers the trigger under `name`.
    Create {
        /// Scenario-local trigger name.
        name: String,
        /// The creation request.
        request: CreateTriggerRequest,
    },
    /// Runs the deletion saga.
    Delete {
        /// Scenario-local trigger name.
        trigger: String,
        /// Requesting account.
        user: UserId,
    },
    /// Adds a target to a trigger.
    AddTarget {
        /// Scenario-local trigger name.
        trigger: String,
        /// Requesting account.
        user: UserId,
        /// The new target.
        target: TargetSpec,
    },
    /// Removes the target with `address` from a trigger.
    RemoveTarget {
        /// Scenario-local trigger name.
        trigger: String,
        /// Requesting account.
        user: UserId,
        /// Address of the target to remove.
        address: String,
    },
    /// Feeds a reported-state document through the rule engine.
    Ingest {
        /// Reporting device.
        thing: String,
        /// Shadow update document.
        document: Value,
    },
    /// Makes a collaborator operation fail.
    Fail {
        /// Operation name, e.g. `rules.install_rule`.
        operation: String,
        /// Error class returned.
        error: FaultKind,
        /// Error text.
        #[serde(default)]
        reason: Option<String>,
        /// Fail only this many calls.
        #[serde(default)]
        times: Option<usize>,
        /// Let this many calls through first.
        #[serde(default)]
        after: Option<usize>,
    },
    /// Makes a collaborator operation slow.
    Delay {
        /// Operation name.
        operation: String,
        /// Added latency in milliseconds.
        millis: u64,
    },
    /// Removes every injected fault.
    ClearFaults,
    /// Runs a recovery sweep.
    Recover,
}

impl Step {
    /// Returns the step's `op` name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Delete { .. } => "delete",
            Self::AddTarget { .. } => "add_target",
            Self::RemoveTarget { .. } => "remove_target",
            Self::Ingest { .. } => "ingest",
            Self::Fail { .. } => "fail",
            Self::Delay { .. } => "delay",
            Self::ClearFaults => "clear_faults",
            Self::Recover => "recover",
        }
    }
}

/// Error class for an injected failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// The resource does not exist.
    NotFound,
    /// The service refused the request.
    Rejected,
    /// The service could not be reached.
    Unavailable,
}

impl FaultKind {
    fn into_error(self, reason: String) -> ServiceError {
        match self {
            Self::NotFound => ServiceError::NotFound(reason),
            Self::Rejected => ServiceError::Rejected(reason),
            Self::Unavailable => ServiceError::Unavailable(reason),
        }
    }
}

/// Executes scenario steps against one set of in-memory collaborators.
pub struct ScenarioRunner {
    injector: FaultInjector,
    orchestrator: MemoryOrchestrator,
    names: HashMap<String, TriggerId>,
}

impl ScenarioRunner {
    /// Creates a runner with `things` paired.
    ///
    /// # Errors
    ///
    /// Returns `CliError::Config` if the configuration is invalid.
    pub fn new(config: OrchestratorConfig, things: &[Thing]) -> Result<Self, CliError> {
        let injector = FaultInjector::new();
        let store = InMemoryStore::with_injector(injector.clone());
        for thing in things {
            store.add_thing(thing.clone());
        }
        let orchestrator = TriggerOrchestrator::new(
            store,
            InMemoryBroker::with_injector(injector.clone()),
            InMemoryRuleEngine::with_injector(injector.clone()),
            config,
        )?;

        Ok(Self {
            injector,
            orchestrator,
            names: HashMap::new(),
        })
    }

    /// The orchestrator the steps run against.
    #[must_use]
    pub const fn orchestrator(&self) -> &MemoryOrchestrator {
        &self.orchestrator
    }

    /// Executes every step and reports the outcomes.
    pub async fn run(&mut self, steps: &[Step]) -> ScenarioReport {
        let mut outcomes = Vec::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            let index = i + 1;
            debug!(step = index, op = step.name(), "running scenario step");
            let outcome = match self.execute(step).await {
                Ok((detail, recovery)) => StepOutcome {
                    index,
                    op: step.name(),
                    ok: true,
                    detail,
                    recovery,
                },
                Err(error) => StepOutcome {
                    index,
                    op: step.name(),
                    ok: false,
                    detail: error.to_string(),
                    recovery: None,
                },
            };
            outcomes.push(outcome);
        }

        let report = ScenarioReport {
            steps: outcomes,
            resources: self.resources(),
        };
        info!(
            steps = report.steps.len(),
            failed = report.failed(),
            "scenario finished"
        );
        report
    }

    /// Counts what the collaborators currently hold.
    #[must_use]
    pub fn resources(&self) -> ResourceSummary {
        let orch = &self.orchestrator;
        ResourceSummary {
            triggers: orch.store().trigger_count(),
            targets: orch.store().target_count(),
            topics: orch.broker().topic_count(),
            subscriptions: orch.broker().subscription_count(),
            rules: orch.rules().rule_count(),
            deliveries: orch.broker().deliveries().len(),
        }
    }

    fn resolve(&self, name: &str) -> Result<TriggerId, CliError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| CliError::Scenario(format!("unknown trigger '{name}'")))
    }

    async fn execute(&mut self, step: &Step) -> Result<(String, Option<RecoveryReport>), CliError> {
        let orch = &self.orchestrator;
        let detail = match step {
            Step::Create { name, request } => {
                if self.names.contains_key(name) {
                    return Err(CliError::Scenario(format!("trigger '{name}' already defined")));
                }
                let created = orch.create_trigger(request.clone()).await?;
                let id = created.trigger.id;
                self.names.insert(name.clone(), id);
                format!(
                    "{name} created as {id} with {} target(s)",
                    created.targets.len()
                )
            }
            Step::Delete { trigger, user } => {
                let id = self.resolve(trigger)?;
                orch.delete_trigger(*user, id).await?;
                format!("{trigger} deleted")
            }
            Step::AddTarget {
                trigger,
                user,
                target,
            } => {
                let id = self.resolve(trigger)?;
                let added = orch.add_target(*user, id, target.clone()).await?;
                format!("{} {} added to {trigger}", added.kind, added.address)
            }
            Step::RemoveTarget {
                trigger,
                user,
                address,
            } => {
                let id = self.resolve(trigger)?;
                let target = orch
                    .list_targets(*user, id)
                    .await?
                    .into_iter()
                    .find(|t| t.address == *address)
                    .ok_or_else(|| {
                        CliError::Scenario(format!("no target '{address}' on trigger '{trigger}'"))
                    })?;
                orch.remove_target(*user, target.id).await?;
                format!("{address} removed from {trigger}")
            }
            Step::Ingest { thing, document } => {
                let update = ShadowUpdate::from_document(thing.as_str(), document)?;
                let deliveries = orch.rules().dispatch(&update, orch.broker());
                format!("{} notification(s) delivered", deliveries.len())
            }
            Step::Fail {
                operation,
                error,
                reason,
                times,
                after,
            } => {
                let reason = reason.clone().unwrap_or_else(|| "injected".to_string());
                let fault = error.into_error(reason);
                match (times, after) {
                    (Some(_), Some(_)) => {
                        return Err(CliError::Scenario(
                            "fail takes either 'times' or 'after', not both".to_string(),
                        ));
                    }
                    (Some(n), None) => self.injector.fail_times(operation, fault, *n),
                    (None, Some(n)) => self.injector.fail_after(operation, *n, fault),
                    (None, None) => self.injector.fail(operation, fault),
                }
                format!("{operation} will fail")
            }
            Step::Delay { operation, millis } => {
                self.injector
                    .delay(operation, Duration::from_millis(*millis));
                format!("{operation} delayed by {millis}ms")
            }
            Step::ClearFaults => {
                self.injector.clear_all();
                "faults cleared".to_string()
            }
            Step::Recover => {
                let report = orch.recover().await?;
                let detail = format!(
                    "purged {} draft(s), removed {} rule(s) and {} topic(s), {} failure(s)",
                    report.drafts_purged,
                    report.rules_removed,
                    report.topics_removed,
                    report.failures
                );
                return Ok((detail, Some(report)));
            }
        };
        Ok((detail, None))
    }
}
