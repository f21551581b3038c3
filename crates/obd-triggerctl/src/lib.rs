//! # obd-triggerctl
//!
//! Operator command-line interface for `obd-triggers`.
//!
//! Provides commands for:
//! - Compiling a threshold condition into predicate text
//! - Checking whether a reading transition fires a condition
//! - Running JSON scenarios against in-memory collaborators, with injected
//!   failures and recovery sweeps
//!
//! Nothing here talks to a real store, broker or rule engine; the scenario
//! runner wires the orchestrator to the in-memory fakes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;
pub mod scenario;

pub use cli::{Cli, Commands, CompileArgs, EvaluateArgs, Format, RunArgs};
pub use error::CliError;
pub use output::OutputFormat;
pub use scenario::{Scenario, ScenarioRunner, Step};
