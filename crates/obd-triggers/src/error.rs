//! Error types for the obd-triggers crate.

use thiserror::Error;

/// Errors surfaced by the orchestrator to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    /// Bad input. Nothing was touched.
    #[error("validation failed: {reason}")]
    Validation {
        /// Why the input was rejected.
        reason: String,
    },

    /// The threshold condition cannot be compiled.
    #[error("invalid condition: {reason}")]
    InvalidCondition {
        /// Why the condition was rejected.
        reason: String,
    },

    /// Persistence was unavailable or rejected the write.
    #[error("store error: {0}")]
    Store(String),

    /// A topic or subscription operation failed.
    #[error("broker error: {0}")]
    Broker(String),

    /// Installing or removing a rule failed.
    #[error("rule engine error: {0}")]
    RuleEngine(String),

    /// The referenced entity does not exist (or is not visible to the caller).
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind, e.g. `trigger` or `target`.
        kind: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// Another saga is already running against this trigger.
    #[error("operation already in flight for trigger {id}")]
    Conflict {
        /// The contended trigger id.
        id: String,
    },

    /// The orchestrator configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// A saga task died before producing a result.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TriggerError {
    /// Builds a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Builds an invalid-condition error.
    pub fn invalid_condition(reason: impl Into<String>) -> Self {
        Self::InvalidCondition {
            reason: reason.into(),
        }
    }

    /// Maps a store failure.
    #[must_use]
    pub fn store(err: &ServiceError) -> Self {
        Self::Store(err.to_string())
    }

    /// Maps a broker failure.
    #[must_use]
    pub fn broker(err: &ServiceError) -> Self {
        Self::Broker(err.to_string())
    }

    /// Maps a rule engine failure.
    #[must_use]
    pub fn rule_engine(err: &ServiceError) -> Self {
        Self::RuleEngine(err.to_string())
    }

    /// Returns true if the caller may retry the same operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Store(_) | Self::Broker(_) | Self::RuleEngine(_) | Self::Conflict { .. }
        )
    }
}

/// Error returned by the store, broker and rule engine collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The resource is already absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// The service refused the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The service could not be reached or did not answer in time.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// Returns true if the error means "already gone".
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, TriggerError>;

/// Result type for collaborator calls.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
