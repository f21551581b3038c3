//! Orchestrator configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TriggerError};
use crate::naming::ResourceNaming;

/// Default bound on a single store, broker or rule engine call.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 10_000;

/// Default maximum number of targets on one trigger.
pub const DEFAULT_MAX_TARGETS: usize = 10;

/// Configuration for the trigger orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Timeout applied to every collaborator call (in milliseconds).
    pub call_timeout_ms: u64,
    /// Maximum number of targets per trigger.
    pub max_targets_per_trigger: usize,
    /// Resource naming scheme.
    #[serde(flatten)]
    pub naming: ResourceNaming,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            max_targets_per_trigger: DEFAULT_MAX_TARGETS,
            naming: ResourceNaming::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the maximum number of targets per trigger.
    #[must_use]
    pub const fn with_max_targets(mut self, max: usize) -> Self {
        self.max_targets_per_trigger = max;
        self
    }

    /// Sets the resource naming scheme.
    #[must_use]
    pub fn with_naming(mut self, naming: ResourceNaming) -> Self {
        self.naming = naming;
        self
    }

    /// Returns the per-call timeout.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Checks the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.call_timeout_ms == 0 {
            return Err(TriggerError::Config(
                "call timeout must be positive".to_string(),
            ));
        }
        if self.max_targets_per_trigger == 0 {
            return Err(TriggerError::Config(
                "max targets per trigger must be positive".to_string(),
            ));
        }
        self.naming.validate()
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::Config` if the JSON is malformed or invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| TriggerError::Config(format!("malformed config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::Config` if the file cannot be read or is invalid.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TriggerError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }
}
