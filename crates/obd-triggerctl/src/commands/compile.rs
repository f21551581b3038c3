//! Compile command implementation.

use std::io::Write;

use obd_triggers::ConditionCompiler;
use tracing::debug;

use crate::cli::CompileArgs;
use crate::error::CliError;
use crate::output::{OutputFormat, PredicateView};

/// Compile command executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileCommand {
    compiler: ConditionCompiler,
}

impl CompileCommand {
    /// Create a new compile command.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            compiler: ConditionCompiler::new(),
        }
    }

    /// Execute the compile command.
    ///
    /// # Errors
    ///
    /// Returns an error if the condition is invalid or output fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &CompileArgs,
    ) -> Result<(), CliError> {
        let predicate = self.compiler.compile(
            &args.thing,
            &args.property,
            &args.comparator,
            args.threshold,
            &args.message,
        )?;
        debug!(thing = %args.thing, predicate = %predicate, "compiled condition");
        format.write(writer, &PredicateView::from(&predicate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Format;
    use obd_triggers::TriggerError;

    fn args(comparator: &str) -> CompileArgs {
        CompileArgs {
            thing: "car1".into(),
            property: "RPM".into(),
            comparator: comparator.into(),
            threshold: 3000.0,
            message: "Shift up".into(),
        }
    }

    #[test]
    fn compiles_to_json() {
        let mut out = Vec::new();
        CompileCommand::new()
            .execute(&mut out, &OutputFormat::new(Format::Json), &args("gt"))
            .expect("compile");

        let value: serde_json::Value = serde_json::from_slice(&out).expect("json");
        let text = value["predicate"].as_str().expect("predicate text");
        assert!(text.starts_with("SELECT \"Shift up\" AS default"));
        assert!(text.ends_with("AND NOT (state.reported.prevRPM > 3000)"));
    }

    #[test]
    fn unknown_comparator_fails() {
        let mut out = Vec::new();
        let result = CompileCommand::new().execute(&mut out, &OutputFormat::default(), &args("ge"));

        assert!(matches!(
            result,
            Err(CliError::Trigger(TriggerError::InvalidCondition { .. }))
        ));
        assert!(out.is_empty());
    }
}
