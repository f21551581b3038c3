//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// obd-triggerctl - compile, evaluate and exercise telemetry threshold triggers.
#[derive(Parser, Debug, Clone)]
#[command(name = "obd-triggerctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Orchestrator configuration file (JSON).
    #[arg(short, long, env = "OBD_TRIGGERS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Compile a condition into rule-engine predicate text.
    Compile(CompileArgs),

    /// Check whether a reading transition fires a condition.
    Evaluate(EvaluateArgs),

    /// Run a JSON scenario against in-memory collaborators.
    Run(RunArgs),
}

/// Arguments for the `compile` command.
#[derive(Args, Debug, Clone)]
pub struct CompileArgs {
    /// Device name.
    #[arg(long)]
    pub thing: String,

    /// Reported property, e.g. `RPM`.
    #[arg(long)]
    pub property: String,

    /// Comparator: `lt`, `gt` or `eq`.
    #[arg(long)]
    pub comparator: String,

    /// Threshold value.
    #[arg(long, allow_negative_numbers = true)]
    pub threshold: f64,

    /// Notification message.
    #[arg(long)]
    pub message: String,
}

/// Arguments for the `evaluate` command.
#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    /// Reported property, e.g. `RPM`.
    #[arg(long)]
    pub property: String,

    /// Comparator: `lt`, `gt` or `eq`.
    #[arg(long)]
    pub comparator: String,

    /// Threshold value.
    #[arg(long, allow_negative_numbers = true)]
    pub threshold: f64,

    /// Previous reading; omit for the first report.
    #[arg(long, allow_negative_numbers = true)]
    pub previous: Option<f64>,

    /// Current reading.
    #[arg(long, allow_negative_numbers = true)]
    pub current: f64,
}

/// Arguments for the `run` command.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Path to the scenario file.
    pub scenario: PathBuf,

    /// Exit with an error if any step fails.
    #[arg(long)]
    pub strict: bool,
}
