//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use obd_triggers::{Predicate, RecoveryReport};
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// A compiled predicate.
#[derive(Debug, Clone, Serialize)]
pub struct PredicateView {
    /// Device name.
    pub thing: String,
    /// Watched property.
    pub property: String,
    /// Comparator short name.
    pub comparator: String,
    /// Threshold value.
    pub threshold: f64,
    /// Topic the rule listens on.
    pub source_topic: String,
    /// Predicate text.
    pub predicate: String,
}

impl From<&Predicate> for PredicateView {
    fn from(predicate: &Predicate) -> Self {
        let condition = predicate.condition();
        Self {
            thing: predicate.thing().to_string(),
            property: condition.property.clone(),
            comparator: condition.comparator.to_string(),
            threshold: condition.threshold,
            source_topic: predicate.source_topic(),
            predicate: predicate.as_str().to_string(),
        }
    }
}

impl TableDisplay for PredicateView {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Compiled Predicate")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Thing:       {}", self.thing)?;
        writeln!(
            writer,
            "Condition:   {} {} {}",
            self.property, self.comparator, self.threshold
        )?;
        writeln!(writer, "Source:      {}", self.source_topic)?;
        writeln!(writer)?;
        writeln!(writer, "{}", self.predicate)?;
        Ok(())
    }
}

/// Result of evaluating one reading transition.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationView {
    /// Watched property.
    pub property: String,
    /// Comparator short name.
    pub comparator: String,
    /// Threshold value.
    pub threshold: f64,
    /// Previous reading, if any.
    pub previous: Option<f64>,
    /// Current reading.
    pub current: f64,
    /// Whether the transition fires.
    pub fires: bool,
}

impl TableDisplay for EvaluationView {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let previous = self
            .previous
            .map_or_else(|| "-".to_string(), |v| v.to_string());
        writeln!(
            writer,
            "Condition:   {} {} {}",
            self.property, self.comparator, self.threshold
        )?;
        writeln!(writer, "Transition:  {previous} -> {}", self.current)?;
        writeln!(writer, "Fires:       {}", if self.fires { "yes" } else { "no" })?;
        Ok(())
    }
}

/// Outcome of one scenario step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    /// Position in the scenario, starting at 1.
    pub index: usize,
    /// Step operation name.
    pub op: &'static str,
    /// Whether the step succeeded.
    pub ok: bool,
    /// What happened, or the error.
    pub detail: String,
    /// Recovery counters, for `recover` steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryReport>,
}

/// Resources left in the in-memory collaborators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceSummary {
    /// Trigger rows, drafts included.
    pub triggers: usize,
    /// Target rows.
    pub targets: usize,
    /// Broker topics.
    pub topics: usize,
    /// Broker subscriptions.
    pub subscriptions: usize,
    /// Installed rules.
    pub rules: usize,
    /// Notifications delivered so far.
    pub deliveries: usize,
}

/// Full report of a scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Per-step outcomes, in order.
    pub steps: Vec<StepOutcome>,
    /// State after the last step.
    pub resources: ResourceSummary,
}

impl ScenarioReport {
    /// Number of failed steps.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.steps.iter().filter(|s| !s.ok).count()
    }
}

impl TableDisplay for ScenarioReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "{:<4} {:<14} {:<6} DETAIL", "#", "OP", "RESULT")?;
        writeln!(writer, "{}", "─".repeat(72))?;
        for step in &self.steps {
            writeln!(
                writer,
                "{:<4} {:<14} {:<6} {}",
                step.index,
                step.op,
                if step.ok { "ok" } else { "FAILED" },
                step.detail
            )?;
        }
        writeln!(writer)?;

        let r = &self.resources;
        writeln!(writer, "Resources")?;
        writeln!(writer, "  Triggers:       {}", r.triggers)?;
        writeln!(writer, "  Targets:        {}", r.targets)?;
        writeln!(writer, "  Topics:         {}", r.topics)?;
        writeln!(writer, "  Subscriptions:  {}", r.subscriptions)?;
        writeln!(writer, "  Rules:          {}", r.rules)?;
        writeln!(writer, "  Deliveries:     {}", r.deliveries)?;
        writeln!(writer)?;
        writeln!(writer, "{} of {} step(s) failed", self.failed(), self.steps.len())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_triggers::ConditionCompiler;

    fn predicate_view() -> PredicateView {
        let predicate = ConditionCompiler::new()
            .compile("car1", "RPM", "gt", 3000.0, "Shift up")
            .expect("compile");
        PredicateView::from(&predicate)
    }

    #[test]
    fn predicate_table_shows_text() {
        let out = OutputFormat::default()
            .to_string(&predicate_view())
            .expect("render");
        assert!(out.contains("Condition:   RPM gt 3000"));
        assert!(out.contains("$aws/things/car1/shadow/update/accepted"));
        assert!(out.contains("state.reported.currRPM > 3000"));
    }

    #[test]
    fn predicate_json_is_structured() {
        let out = OutputFormat::new(Format::Json)
            .to_string(&predicate_view())
            .expect("render");
        let value: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(value["thing"], "car1");
        assert_eq!(value["comparator"], "gt");
    }

    #[test]
    fn evaluation_table_without_previous() {
        let view = EvaluationView {
            property: "RPM".into(),
            comparator: "gt".into(),
            threshold: 3000.0,
            previous: None,
            current: 3100.0,
            fires: true,
        };
        let out = OutputFormat::default().to_string(&view).expect("render");
        assert!(out.contains("Transition:  - -> 3100"));
        assert!(out.contains("Fires:       yes"));
    }

    #[test]
    fn scenario_report_counts_failures() {
        let report = ScenarioReport {
            steps: vec![
                StepOutcome {
                    index: 1,
                    op: "create",
                    ok: true,
                    detail: "rpm created".into(),
                    recovery: None,
                },
                StepOutcome {
                    index: 2,
                    op: "delete",
                    ok: false,
                    detail: "trigger not found".into(),
                    recovery: None,
                },
            ],
            resources: ResourceSummary::default(),
        };
        assert_eq!(report.failed(), 1);

        let out = OutputFormat::default().to_string(&report).expect("render");
        assert!(out.contains("FAILED"));
        assert!(out.contains("1 of 2 step(s) failed"));

        let json = OutputFormat::new(Format::Json).to_string(&report).expect("render");
        assert!(!json.contains("recovery"));
    }
}
