//! obd-triggerctl binary entrypoint.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use obd_triggerctl::cli::{Cli, Commands};
use obd_triggerctl::commands::{CompileCommand, EvaluateCommand, RunCommand};
use obd_triggerctl::output::OutputFormat;
use obd_triggerctl::CliError;
use obd_triggers::OrchestratorConfig;

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<OrchestratorConfig, CliError> {
    match &cli.config {
        Some(path) => Ok(OrchestratorConfig::from_file(path)?),
        None => Ok(OrchestratorConfig::default()),
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    match &cli.command {
        Commands::Compile(args) => {
            CompileCommand::new().execute(&mut stdout, &format, args)?;
        }
        Commands::Evaluate(args) => {
            EvaluateCommand::new().execute(&mut stdout, &format, args)?;
        }
        Commands::Run(args) => {
            let config = load_config(&cli)?;
            RunCommand::new(config)
                .execute(&mut stdout, &format, args)
                .await?;
        }
    }

    Ok(())
}
