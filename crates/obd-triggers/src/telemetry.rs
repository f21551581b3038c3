//! Reported-state transitions of a device.
//!
//! Devices publish each update with paired `curr<Prop>` / `prev<Prop>` keys
//! under `state.reported`. A [`ShadowUpdate`] is that document split into the
//! previous and current snapshot, which is what compiled predicates are
//! evaluated against.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::compiler::{CURRENT_PREFIX, PREVIOUS_PREFIX, Predicate};
use crate::error::{Result, TriggerError};

/// One reported-state transition of a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShadowUpdate {
    /// Device name.
    pub thing: String,
    /// Values before the update.
    #[serde(default)]
    pub previous: HashMap<String, f64>,
    /// Values after the update.
    #[serde(default)]
    pub current: HashMap<String, f64>,
}

impl ShadowUpdate {
    /// Creates an empty update for a device.
    pub fn new(thing: impl Into<String>) -> Self {
        Self {
            thing: thing.into(),
            ..Self::default()
        }
    }

    /// Records a property transition.
    #[must_use]
    pub fn with_transition(
        mut self,
        property: impl Into<String>,
        previous: Option<f64>,
        current: f64,
    ) -> Self {
        let property = property.into();
        if let Some(prev) = previous {
            self.previous.insert(property.clone(), prev);
        }
        self.current.insert(property, current);
        self
    }

    /// Parses an accepted shadow update document.
    ///
    /// Numeric `curr*` and `prev*` keys under `state.reported` are collected;
    /// everything else is ignored.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::Validation` if the document has no `state.reported` object.
    pub fn from_document(thing: impl Into<String>, document: &Value) -> Result<Self> {
        let reported = document
            .get("state")
            .and_then(|s| s.get("reported"))
            .and_then(Value::as_object)
            .ok_or_else(|| TriggerError::validation("document has no state.reported object"))?;

        let mut update = Self::new(thing);
        for (key, value) in reported {
            let Some(number) = value.as_f64() else {
                continue;
            };
            if let Some(property) = key.strip_prefix(CURRENT_PREFIX) {
                update.current.insert(property.to_string(), number);
            } else if let Some(property) = key.strip_prefix(PREVIOUS_PREFIX) {
                update.previous.insert(property.to_string(), number);
            }
        }
        Ok(update)
    }

    /// Returns true if `predicate` selects this update.
    ///
    /// The update must come from the predicate's device and carry a current
    /// value for the watched property.
    #[must_use]
    pub fn matches(&self, predicate: &Predicate) -> bool {
        if self.thing != predicate.thing() {
            return false;
        }
        let property = &predicate.condition().property;
        self.current
            .get(property)
            .is_some_and(|&current| predicate.fires(self.previous.get(property).copied(), current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ConditionCompiler;

    fn rpm_over_3000() -> Predicate {
        ConditionCompiler::new()
            .compile("car1", "RPM", "gt", 3000.0, "Shift up")
            .expect("valid condition")
    }

    #[test]
    fn matches_crossing_update() {
        let update = ShadowUpdate::new("car1").with_transition("RPM", Some(2500.0), 3200.0);
        assert!(update.matches(&rpm_over_3000()));
    }

    #[test]
    fn ignores_other_things() {
        let update = ShadowUpdate::new("car2").with_transition("RPM", Some(2500.0), 3200.0);
        assert!(!update.matches(&rpm_over_3000()));
    }

    #[test]
    fn ignores_updates_without_the_property() {
        let update = ShadowUpdate::new("car1").with_transition("Speed", Some(1.0), 200.0);
        assert!(!update.matches(&rpm_over_3000()));
    }

    #[test]
    fn parses_reported_document() {
        let doc = serde_json::json!({
            "state": {
                "reported": {
                    "currRPM": 3200,
                    "prevRPM": 2900.5,
                    "currGear": "D",
                    "vin": "1HGCM"
                }
            }
        });
        let update = ShadowUpdate::from_document("car1", &doc).expect("valid document");
        assert_eq!(update.current.get("RPM"), Some(&3200.0));
        assert_eq!(update.previous.get("RPM"), Some(&2900.5));
        assert!(!update.current.contains_key("Gear"));
        assert!(update.matches(&rpm_over_3000()));
    }

    #[test]
    fn rejects_document_without_reported_state() {
        let doc = serde_json::json!({ "state": { "desired": {} } });
        assert!(ShadowUpdate::from_document("car1", &doc).is_err());
    }
}
