//! Run scenario command implementation.

use std::io::Write;

use obd_triggers::OrchestratorConfig;
use tracing::info;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::OutputFormat;
use crate::scenario::{Scenario, ScenarioRunner};

/// Run command executor.
pub struct RunCommand {
    config: OrchestratorConfig,
}

impl RunCommand {
    /// Create a new run command.
    #[must_use]
    pub const fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    /// Execute the run command.
    ///
    /// # Errors
    ///
    /// Returns an error if the scenario cannot be loaded, output fails, or
    /// `--strict` is set and a step failed.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &RunArgs,
    ) -> Result<(), CliError> {
        let scenario = Scenario::from_file(&args.scenario)?;
        info!(
            scenario = %args.scenario.display(),
            steps = scenario.steps.len(),
            "running scenario"
        );

        let mut runner = ScenarioRunner::new(self.config.clone(), &scenario.things)?;
        let report = runner.run(&scenario.steps).await;
        format.write(writer, &report)?;

        let failed = report.failed();
        if args.strict && failed > 0 {
            return Err(CliError::StepsFailed(failed));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn demo() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios/rpm-shift.json")
    }

    #[tokio::test]
    async fn runs_demo_scenario() {
        let mut out = Vec::new();
        let args = RunArgs {
            scenario: demo(),
            strict: false,
        };
        RunCommand::new(OrchestratorConfig::default())
            .execute(&mut out, &OutputFormat::default(), &args)
            .await
            .expect("run");

        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("create"));
        assert!(text.contains("Deliveries:"));
    }

    #[tokio::test]
    async fn strict_run_fails_on_failed_step() {
        let mut out = Vec::new();
        let args = RunArgs {
            scenario: demo(),
            strict: true,
        };
        let result = RunCommand::new(OrchestratorConfig::default())
            .execute(&mut out, &OutputFormat::default(), &args)
            .await;

        assert!(matches!(result, Err(CliError::StepsFailed(1))));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let mut out = Vec::new();
        let args = RunArgs {
            scenario: PathBuf::from("does/not/exist.json"),
            strict: false,
        };
        let result = RunCommand::new(OrchestratorConfig::default())
            .execute(&mut out, &OutputFormat::default(), &args)
            .await;

        assert!(matches!(result, Err(CliError::Io(_))));
    }
}
