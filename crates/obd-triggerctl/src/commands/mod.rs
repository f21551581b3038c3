//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`compile`] - Predicate compilation
//! - [`evaluate`] - Edge-trigger evaluation of one transition
//! - [`run`] - Scenario execution against in-memory collaborators

pub mod compile;
pub mod evaluate;
pub mod run;

pub use compile::CompileCommand;
pub use evaluate::EvaluateCommand;
pub use run::RunCommand;
