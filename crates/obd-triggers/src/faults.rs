//! Failure and latency injection for the in-memory collaborators.
//!
//! Every in-memory service consults a [`FaultInjector`] before doing any
//! work. Several services may share one injector, in which case
//! [`FaultInjector::calls`] is a single ordered log across all of them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{ServiceError, ServiceResult};

/// What happens when an operation is invoked.
#[derive(Debug, Clone)]
enum Fault {
    /// Fail every call.
    Always(ServiceError),
    /// Fail the next `n` calls.
    Times(ServiceError, usize),
    /// Let `n` calls through, then fail every call.
    After(ServiceError, usize),
    /// Sleep before doing the work.
    Delay(Duration),
}

#[derive(Debug, Default)]
struct InjectorState {
    faults: HashMap<String, Fault>,
    calls: Vec<String>,
}

/// Shared fault plan and call log.
///
/// Operations are named `<service>.<method>`, e.g. `broker.subscribe`.
#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    state: Arc<Mutex<InjectorState>>,
}

impl FaultInjector {
    /// Creates an injector with no faults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call to `op` fail with `error`.
    pub fn fail(&self, op: &str, error: ServiceError) {
        self.state
            .lock()
            .faults
            .insert(op.to_string(), Fault::Always(error));
    }

    /// Makes the next call to `op` fail with `error`.
    pub fn fail_once(&self, op: &str, error: ServiceError) {
        self.fail_times(op, error, 1);
    }

    /// Makes the next `times` calls to `op` fail with `error`.
    pub fn fail_times(&self, op: &str, error: ServiceError, times: usize) {
        self.state
            .lock()
            .faults
            .insert(op.to_string(), Fault::Times(error, times));
    }

    /// Lets the next `skip` calls to `op` succeed, then fails every call after.
    pub fn fail_after(&self, op: &str, skip: usize, error: ServiceError) {
        self.state
            .lock()
            .faults
            .insert(op.to_string(), Fault::After(error, skip));
    }

    /// Delays every call to `op`.
    pub fn delay(&self, op: &str, delay: Duration) {
        self.state
            .lock()
            .faults
            .insert(op.to_string(), Fault::Delay(delay));
    }

    /// Removes the fault on `op`.
    pub fn clear(&self, op: &str) {
        self.state.lock().faults.remove(op);
    }

    /// Removes all faults. The call log is kept.
    pub fn clear_all(&self) {
        self.state.lock().faults.clear();
    }

    /// Returns every invoked operation, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Returns how many times `op` was invoked.
    #[must_use]
    pub fn call_count(&self, op: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == op).count()
    }

    /// Records a call to `op` and applies its fault, if any.
    ///
    /// # Errors
    ///
    /// Returns the injected error when `op` is set to fail.
    pub async fn check(&self, op: &str) -> ServiceResult<()> {
        let fault = {
            let mut state = self.state.lock();
            state.calls.push(op.to_string());

            let fault = state.faults.get(op).cloned();
            match &fault {
                Some(Fault::Times(error, remaining)) if *remaining > 1 => {
                    state
                        .faults
                        .insert(op.to_string(), Fault::Times(error.clone(), remaining - 1));
                }
                Some(Fault::Times(..)) => {
                    state.faults.remove(op);
                }
                Some(Fault::After(error, remaining)) if *remaining > 0 => {
                    state
                        .faults
                        .insert(op.to_string(), Fault::After(error.clone(), remaining - 1));
                    return Ok(());
                }
                _ => {}
            }
            fault
        };

        match fault {
            Some(Fault::Always(error) | Fault::Times(error, _) | Fault::After(error, _)) => Err(error),
            Some(Fault::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_fault_passes() {
        let injector = FaultInjector::new();
        assert!(injector.check("broker.subscribe").await.is_ok());
        assert_eq!(injector.calls(), vec!["broker.subscribe".to_string()]);
    }

    #[tokio::test]
    async fn fail_once_then_recovers() {
        let injector = FaultInjector::new();
        injector.fail_once("store.insert_trigger", ServiceError::Unavailable("down".into()));

        assert!(injector.check("store.insert_trigger").await.is_err());
        assert!(injector.check("store.insert_trigger").await.is_ok());
        assert_eq!(injector.call_count("store.insert_trigger"), 2);
    }

    #[tokio::test]
    async fn fail_always_until_cleared() {
        let injector = FaultInjector::new();
        injector.fail("rules.install_rule", ServiceError::Rejected("quota".into()));

        assert!(injector.check("rules.install_rule").await.is_err());
        assert!(injector.check("rules.install_rule").await.is_err());
        injector.clear("rules.install_rule");
        assert!(injector.check("rules.install_rule").await.is_ok());
    }

    #[tokio::test]
    async fn fail_after_skips_then_fails() {
        let injector = FaultInjector::new();
        injector.fail_after("broker.subscribe", 1, ServiceError::Rejected("bad".into()));

        assert!(injector.check("broker.subscribe").await.is_ok());
        assert!(injector.check("broker.subscribe").await.is_err());
        assert!(injector.check("broker.subscribe").await.is_err());
    }

    #[tokio::test]
    async fn delay_sleeps() {
        let injector = FaultInjector::new();
        injector.delay("broker.create_topic", Duration::from_millis(20));

        let start = tokio::time::Instant::now();
        assert!(injector.check("broker.create_topic").await.is_ok());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
