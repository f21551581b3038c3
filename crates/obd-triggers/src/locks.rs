//! Per-trigger saga serialization.
//!
//! At most one saga runs against a given trigger id. A second saga on a busy
//! id fails fast with [`TriggerError::Conflict`] instead of queueing, so the
//! caller decides whether to retry. Different ids never contend.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, TriggerError};
use crate::types::TriggerId;

/// The set of trigger ids with a saga in flight.
#[derive(Debug, Clone, Default)]
pub struct SagaLocks {
    held: Arc<Mutex<HashSet<TriggerId>>>,
}

impl SagaLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `id` for the lifetime of the returned guard.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::Conflict` if another saga holds `id`.
    pub fn try_acquire(&self, id: TriggerId) -> Result<SagaGuard> {
        if !self.held.lock().insert(id) {
            debug!(trigger_id = %id, "saga lock contended");
            return Err(TriggerError::Conflict { id: id.to_string() });
        }
        Ok(SagaGuard {
            id,
            held: Arc::clone(&self.held),
        })
    }

    /// Returns true if a saga currently holds `id`.
    #[must_use]
    pub fn is_locked(&self, id: TriggerId) -> bool {
        self.held.lock().contains(&id)
    }
}

/// Releases its trigger id when dropped.
#[derive(Debug)]
pub struct SagaGuard {
    id: TriggerId,
    held: Arc<Mutex<HashSet<TriggerId>>>,
}

impl SagaGuard {
    /// The locked trigger id.
    #[must_use]
    pub const fn id(&self) -> TriggerId {
        self.id
    }
}

impl Drop for SagaGuard {
    fn drop(&mut self) {
        self.held.lock().remove(&self.id);
    }
}
