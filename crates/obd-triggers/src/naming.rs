//! Deterministic names for the external resources of a trigger.
//!
//! Topic and rule names are derived from the trigger id alone, so they are
//! unique without a naming registry and the recovery sweep can map a stray
//! resource back to the trigger that created it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TriggerError};
use crate::types::TriggerId;

/// Default topic name prefix.
pub const DEFAULT_TOPIC_PREFIX: &str = "trigger-";

/// Default rule name prefix.
pub const DEFAULT_RULE_PREFIX: &str = "trigger_";

static TOPIC_PREFIX_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap_or_else(|_| unreachable!()));

static RULE_PREFIX_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]{0,63}$").unwrap_or_else(|_| unreachable!()));

/// Prefixes used to name topics and rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceNaming {
    /// Prefix of topic names. The hyphenated trigger id follows.
    pub topic_prefix: String,
    /// Prefix of rule names. The trigger id without dashes follows, since
    /// rule names only allow alphanumerics and underscores.
    pub rule_prefix: String,
}

impl Default for ResourceNaming {
    fn default() -> Self {
        Self {
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            rule_prefix: DEFAULT_RULE_PREFIX.to_string(),
        }
    }
}

impl ResourceNaming {
    /// Creates a naming scheme from two prefixes.
    pub fn new(topic_prefix: impl Into<String>, rule_prefix: impl Into<String>) -> Self {
        Self {
            topic_prefix: topic_prefix.into(),
            rule_prefix: rule_prefix.into(),
        }
    }

    /// Checks both prefixes produce names the services accept.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::Config` if a prefix has unsupported characters.
    pub fn validate(&self) -> Result<()> {
        if !TOPIC_PREFIX_REGEX.is_match(&self.topic_prefix) {
            return Err(TriggerError::Config(format!(
                "invalid topic prefix '{}'",
                self.topic_prefix
            )));
        }
        if !RULE_PREFIX_REGEX.is_match(&self.rule_prefix) {
            return Err(TriggerError::Config(format!(
                "invalid rule prefix '{}'",
                self.rule_prefix
            )));
        }
        Ok(())
    }

    /// Returns the topic name of a trigger.
    #[must_use]
    pub fn topic_name(&self, id: TriggerId) -> String {
        format!("{}{}", self.topic_prefix, id.as_uuid().hyphenated())
    }

    /// Returns the rule name of a trigger.
    #[must_use]
    pub fn rule_name(&self, id: TriggerId) -> String {
        format!("{}{}", self.rule_prefix, id.as_uuid().simple())
    }

    /// Maps a topic name back to its trigger, if it is one of ours.
    #[must_use]
    pub fn trigger_for_topic(&self, name: &str) -> Option<TriggerId> {
        parse_suffix(name, &self.topic_prefix)
    }

    /// Maps a rule name back to its trigger, if it is one of ours.
    #[must_use]
    pub fn trigger_for_rule(&self, name: &str) -> Option<TriggerId> {
        parse_suffix(name, &self.rule_prefix)
    }
}

fn parse_suffix(name: &str, prefix: &str) -> Option<TriggerId> {
    name.strip_prefix(prefix)
        .and_then(|rest| Uuid::parse_str(rest).ok())
        .map(TriggerId::from_uuid)
}
