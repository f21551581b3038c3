//! Compiles threshold conditions into rule engine predicates.
//!
//! The device publishes every reported-state update with both the current and
//! the previous value of each property (`currRPM`, `prevRPM`). A compiled
//! predicate selects an update only when the current value satisfies the
//! condition and the previous one did not, so a trigger fires once per
//! crossing rather than on every update past the threshold.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Comparator, Condition, validate_thing_name};

/// Rule engine SQL dialect version the predicate text targets.
pub const SQL_VERSION: &str = "2016-03-23";

/// Prefix of the current value of a property in the reported state.
pub const CURRENT_PREFIX: &str = "curr";

/// Prefix of the previous value of a property in the reported state.
pub const PREVIOUS_PREFIX: &str = "prev";

/// A compiled, edge-triggered predicate.
///
/// [`Predicate::as_str`] is the opaque text handed to the rule engine; the
/// typed condition is kept alongside so the predicate can be evaluated locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    thing: String,
    condition: Condition,
    message: String,
    text: String,
}

impl Predicate {
    /// Returns the predicate text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns the device the predicate listens to.
    #[must_use]
    pub fn thing(&self) -> &str {
        &self.thing
    }

    /// Returns the compiled condition.
    #[must_use]
    pub const fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Returns the message published on match.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the rule engine SQL dialect version the text is written in.
    #[must_use]
    pub const fn sql_version(&self) -> &'static str {
        SQL_VERSION
    }

    /// Returns the telemetry topic the predicate selects from.
    #[must_use]
    pub fn source_topic(&self) -> String {
        source_topic(&self.thing)
    }

    /// Evaluates the edge condition for one transition.
    ///
    /// A missing previous value never satisfies the condition, so the first
    /// report past the threshold fires.
    #[must_use]
    pub fn fires(&self, previous: Option<f64>, current: f64) -> bool {
        let was = previous.is_some_and(|v| self.condition.is_satisfied(v));
        self.condition.is_satisfied(current) && !was
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Turns typed conditions into rule engine predicates. Has no side effects.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionCompiler;

impl ConditionCompiler {
    /// Creates a compiler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Compiles a condition given in its raw form.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::InvalidCondition` for an unknown comparator, an
    /// empty or malformed property or a non-finite threshold, and
    /// `TriggerError::Validation` for a thing name that cannot appear in a topic.
    pub fn compile(
        &self,
        thing_name: &str,
        property: &str,
        comparator: &str,
        threshold: f64,
        message: &str,
    ) -> Result<Predicate> {
        let comparator: Comparator = comparator.parse()?;
        let condition = Condition::new(property, comparator, threshold)?;
        self.compile_condition(thing_name, &condition, message)
    }

    /// Compiles an already validated condition.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::Validation` if the thing name is unusable.
    pub fn compile_condition(
        &self,
        thing_name: &str,
        condition: &Condition,
        message: &str,
    ) -> Result<Predicate> {
        validate_thing_name(thing_name)?;

        let op = condition.comparator.as_symbol();
        let value = condition.threshold;
        let property = &condition.property;
        let text = format!(
            "SELECT \"{message}\" AS default FROM '{topic}' \
             WHERE state.reported.{CURRENT_PREFIX}{property} {op} {value} \
             AND NOT (state.reported.{PREVIOUS_PREFIX}{property} {op} {value})",
            message = escape_literal(message),
            topic = source_topic(thing_name),
        );

        Ok(Predicate {
            thing: thing_name.to_string(),
            condition: condition.clone(),
            message: message.to_string(),
            text,
        })
    }
}

/// Returns the accepted-update topic of a device's reported state.
#[must_use]
pub fn source_topic(thing_name: &str) -> String {
    format!("$aws/things/{thing_name}/shadow/update/accepted")
}

fn escape_literal(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}
