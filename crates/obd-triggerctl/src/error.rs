//! CLI error types.

use std::fmt;

use obd_triggers::TriggerError;

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// Invalid configuration.
    Config(String),
    /// A trigger operation failed.
    Trigger(TriggerError),
    /// The scenario file is malformed or refers to something unknown.
    Scenario(String),
    /// A strict run had failing steps.
    StepsFailed(usize),
    /// Output formatting error.
    Format(String),
    /// IO error.
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Trigger(e) => write!(f, "{e}"),
            Self::Scenario(msg) => write!(f, "scenario error: {msg}"),
            Self::StepsFailed(n) => write!(f, "{n} scenario step(s) failed"),
            Self::Format(msg) => write!(f, "format error: {msg}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Trigger(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<TriggerError> for CliError {
    fn from(err: TriggerError) -> Self {
        match err {
            TriggerError::Config(msg) => Self::Config(msg),
            other => Self::Trigger(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_scenario() {
        let err = CliError::Scenario("unknown trigger 'rpm'".into());
        assert_eq!(err.to_string(), "scenario error: unknown trigger 'rpm'");
    }

    #[test]
    fn trigger_config_errors_become_config() {
        let err = CliError::from(TriggerError::Config("call_timeout_ms must be positive".into()));
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn trigger_errors_keep_source() {
        let err = CliError::from(TriggerError::invalid_condition("unknown comparator 'ge'"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cli_err = CliError::from(io_err);
        assert!(matches!(cli_err, CliError::Io(_)));
    }
}
