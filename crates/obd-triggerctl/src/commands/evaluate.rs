//! Evaluate command implementation.
//!
//! Answers "would this reading transition fire?" without provisioning anything.

use std::io::Write;

use obd_triggers::{Comparator, Condition};

use crate::cli::EvaluateArgs;
use crate::error::CliError;
use crate::output::{EvaluationView, OutputFormat};

/// Evaluate command executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluateCommand;

impl EvaluateCommand {
    /// Create a new evaluate command.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Execute the evaluate command.
    ///
    /// # Errors
    ///
    /// Returns an error if the condition is invalid or output fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &EvaluateArgs,
    ) -> Result<(), CliError> {
        let view = Self::evaluate(args)?;
        format.write(writer, &view)
    }

    /// Evaluates the transition described by `args`.
    ///
    /// # Errors
    ///
    /// Returns an error if the condition is invalid.
    pub fn evaluate(args: &EvaluateArgs) -> Result<EvaluationView, CliError> {
        let comparator: Comparator = args.comparator.parse()?;
        let condition = Condition::new(args.property.as_str(), comparator, args.threshold)?;

        let was = args.previous.is_some_and(|v| condition.is_satisfied(v));
        let fires = condition.is_satisfied(args.current) && !was;

        Ok(EvaluationView {
            property: condition.property,
            comparator: comparator.to_string(),
            threshold: condition.threshold,
            previous: args.previous,
            current: args.current,
            fires,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn args(comparator: &str, previous: Option<f64>, current: f64) -> EvaluateArgs {
        EvaluateArgs {
            property: "RPM".into(),
            comparator: comparator.into(),
            threshold: 3000.0,
            previous,
            current,
        }
    }

    #[test_case("gt", Some(2800.0), 3100.0, true ; "upward crossing fires")]
    #[test_case("gt", Some(3100.0), 3300.0, false ; "staying above does not fire")]
    #[test_case("gt", None, 3100.0, true ; "first report above fires")]
    #[test_case("gt", Some(3100.0), 2900.0, false ; "falling back does not fire")]
    #[test_case("lt", Some(3100.0), 2900.0, true ; "downward crossing fires")]
    #[test_case("eq", Some(2999.0), 3000.0, true ; "hitting the value fires")]
    fn evaluates_transitions(comparator: &str, previous: Option<f64>, current: f64, expected: bool) {
        let view = EvaluateCommand::evaluate(&args(comparator, previous, current)).expect("evaluate");
        assert_eq!(view.fires, expected);
    }

    #[test]
    fn rejects_bad_property() {
        let mut bad = args("gt", None, 1.0);
        bad.property = "RPM; DROP".into();
        assert!(EvaluateCommand::evaluate(&bad).is_err());
    }
}
