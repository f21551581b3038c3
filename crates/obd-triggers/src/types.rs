//! Core types for the trigger system.
//!
//! This module provides the fundamental types used throughout the crate:
//! - Identifiers ([`TriggerId`], [`TargetId`], [`ThingId`], [`UserId`])
//! - External resource handles ([`TopicHandle`], [`RuleHandle`], [`SubscriptionHandle`])
//! - [`Comparator`] and [`Condition`]: the threshold a trigger watches
//! - [`Trigger`] and [`TriggerTarget`]: the persisted entities
//! - [`CreateTriggerRequest`] and [`TargetSpec`]: typed, validated caller input

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TriggerError};

/// Maximum length of a property name.
pub const MAX_PROPERTY_LENGTH: usize = 64;

/// Maximum length of a notification message.
pub const MAX_MESSAGE_LENGTH: usize = 200;

/// Maximum length of a target address.
pub const MAX_ADDRESS_LENGTH: usize = 100;

static PROPERTY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap_or_else(|_| unreachable!())
});

static THING_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9:_-]{1,128}$").unwrap_or_else(|_| unreachable!()));

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap_or_else(|_| unreachable!())
});

static SMS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9]{6,15}$").unwrap_or_else(|_| unreachable!()));

/// Identifier of an account, owned by the account layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a paired device, owned by the pairing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThingId(pub u64);

impl fmt::Display for ThingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = TriggerError;

            fn from_str(s: &str) -> Result<Self> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| TriggerError::validation(format!("invalid {} id: {s}", $kind)))
            }
        }
    };
}

uuid_id!(
    /// Identifier of a trigger.
    TriggerId,
    "trigger"
);

uuid_id!(
    /// Identifier of a notification target.
    TargetId,
    "target"
);

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an opaque handle returned by the owning service.
            pub fn new(handle: impl Into<String>) -> Self {
                Self(handle.into())
            }

            /// Returns the handle as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

handle!(
    /// Broker handle of a topic.
    TopicHandle
);

handle!(
    /// Rule engine handle of an installed rule.
    RuleHandle
);

handle!(
    /// Broker handle of a subscription.
    SubscriptionHandle
);

/// Comparison operators a trigger may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    /// Less than (<).
    #[serde(rename = "lt")]
    LessThan,
    /// Greater than (>).
    #[serde(rename = "gt")]
    GreaterThan,
    /// Equal (=).
    #[serde(rename = "eq")]
    Equal,
}

impl Comparator {
    /// Evaluates `left <op> right`.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn evaluate(&self, left: f64, right: f64) -> bool {
        match self {
            Self::LessThan => left < right,
            Self::GreaterThan => left > right,
            Self::Equal => left == right,
        }
    }

    /// Returns the operator symbol used in compiled predicates.
    #[must_use]
    pub const fn as_symbol(&self) -> &'static str {
        match self {
            Self::LessThan => "<",
            Self::GreaterThan => ">",
            Self::Equal => "=",
        }
    }

    /// Returns the short name stored with a trigger.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LessThan => "lt",
            Self::GreaterThan => "gt",
            Self::Equal => "eq",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparator {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lt" | "<" | "less-than" | "less_than" => Ok(Self::LessThan),
            "gt" | ">" | "greater-than" | "greater_than" => Ok(Self::GreaterThan),
            "eq" | "=" | "==" | "equal" => Ok(Self::Equal),
            "" => Err(TriggerError::invalid_condition("comparator cannot be empty")),
            other => Err(TriggerError::invalid_condition(format!(
                "unknown comparator '{other}'"
            ))),
        }
    }
}

/// A validated threshold condition on one reported property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Key into the device's reported state.
    pub property: String,
    /// The comparison operator.
    pub comparator: Comparator,
    /// The threshold compared against.
    pub threshold: f64,
}

impl Condition {
    /// Creates a condition, rejecting names that cannot be spliced into a predicate.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::InvalidCondition` if the property is empty or
    /// malformed, or the threshold is not finite.
    pub fn new(property: impl Into<String>, comparator: Comparator, threshold: f64) -> Result<Self> {
        let property = property.into();
        if property.is_empty() {
            return Err(TriggerError::invalid_condition("property cannot be empty"));
        }
        if property.len() > MAX_PROPERTY_LENGTH {
            return Err(TriggerError::invalid_condition(format!(
                "property exceeds {MAX_PROPERTY_LENGTH} characters"
            )));
        }
        if !PROPERTY_PATTERN.is_match(&property) {
            return Err(TriggerError::invalid_condition(format!(
                "property '{property}' must be alphanumeric or underscore"
            )));
        }
        if !threshold.is_finite() {
            return Err(TriggerError::invalid_condition("threshold must be finite"));
        }

        Ok(Self {
            property,
            comparator,
            threshold,
        })
    }

    /// Returns true if `value` satisfies the condition.
    #[must_use]
    pub fn is_satisfied(&self, value: f64) -> bool {
        self.comparator.evaluate(value, self.threshold)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.property,
            self.comparator.as_symbol(),
            self.threshold
        )
    }
}

/// Delivery kind of a notification target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Email delivery.
    Email,
    /// Text message delivery.
    Sms,
}

impl TargetKind {
    /// Returns the broker delivery protocol for this kind.
    #[must_use]
    pub const fn protocol(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }

    fn accepts(self, address: &str) -> bool {
        match self {
            Self::Email => EMAIL_PATTERN.is_match(address),
            Self::Sms => SMS_PATTERN.is_match(address),
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.protocol())
    }
}

impl FromStr for TargetKind {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "sms" | "phone" => Ok(Self::Sms),
            other => Err(TriggerError::validation(format!(
                "unknown target kind '{other}'"
            ))),
        }
    }
}

/// A paired device. Read-only to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thing {
    /// Device id.
    pub id: ThingId,
    /// Unique device name.
    pub name: String,
    /// Owning account.
    pub owner: UserId,
}

impl Thing {
    /// Creates a thing record.
    pub fn new(id: ThingId, name: impl Into<String>, owner: UserId) -> Self {
        Self {
            id,
            name: name.into(),
            owner,
        }
    }
}

/// The external handles of a provisioned trigger. Always set together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerHandles {
    /// Topic the rule publishes to.
    pub topic: TopicHandle,
    /// Rule evaluating the condition.
    pub rule: RuleHandle,
}

/// A persisted threshold trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    /// Trigger id.
    pub id: TriggerId,
    /// Owning account.
    pub user: UserId,
    /// Watched device.
    pub thing: ThingId,
    /// The watched condition.
    pub condition: Condition,
    /// Message delivered when the condition is crossed.
    pub message: String,
    /// Handles, `None` while the trigger is a draft.
    pub handles: Option<TriggerHandles>,
    /// When the draft row was written.
    pub created_at: DateTime<Utc>,
}

impl Trigger {
    /// Creates a draft trigger with no handles.
    pub fn draft(
        id: TriggerId,
        user: UserId,
        thing: ThingId,
        condition: Condition,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id,
            user,
            thing,
            condition,
            message: message.into(),
            handles: None,
            created_at: Utc::now(),
        }
    }

    /// Returns true once both handles are committed.
    #[must_use]
    pub const fn is_provisioned(&self) -> bool {
        self.handles.is_some()
    }

    /// Returns the topic handle, if provisioned.
    #[must_use]
    pub fn topic(&self) -> Option<&TopicHandle> {
        self.handles.as_ref().map(|h| &h.topic)
    }

    /// Returns the rule handle, if provisioned.
    #[must_use]
    pub fn rule(&self) -> Option<&RuleHandle> {
        self.handles.as_ref().map(|h| &h.rule)
    }
}

/// A notification destination owned by one trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerTarget {
    /// Target id.
    pub id: TargetId,
    /// Owning trigger.
    pub trigger: TriggerId,
    /// Delivery kind.
    pub kind: TargetKind,
    /// Email address or phone number.
    pub address: String,
    /// Broker subscription delivering to this target.
    pub subscription: SubscriptionHandle,
}

/// A trigger together with its targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDetails {
    /// The trigger row.
    pub trigger: Trigger,
    /// Its targets, in insertion order.
    pub targets: Vec<TriggerTarget>,
}

/// Raw target input as received from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// `email` or `sms`.
    pub kind: String,
    /// Destination address.
    pub address: String,
}

impl TargetSpec {
    /// Creates a target spec.
    pub fn new(kind: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            address: address.into(),
        }
    }

    /// Shorthand for an email target.
    pub fn email(address: impl Into<String>) -> Self {
        Self::new("email", address)
    }

    /// Shorthand for an sms target.
    pub fn sms(address: impl Into<String>) -> Self {
        Self::new("sms", address)
    }

    /// Validates kind and address.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::Validation` on an unknown kind or malformed address.
    pub fn validate(&self) -> Result<ValidTarget> {
        let kind: TargetKind = self.kind.parse()?;
        let address = self.address.trim();
        if address.is_empty() {
            return Err(TriggerError::validation("target address cannot be empty"));
        }
        if address.len() > MAX_ADDRESS_LENGTH {
            return Err(TriggerError::validation(format!(
                "target address exceeds {MAX_ADDRESS_LENGTH} characters"
            )));
        }
        if !kind.accepts(address) {
            return Err(TriggerError::validation(format!(
                "'{address}' is not a valid {kind} address"
            )));
        }

        Ok(ValidTarget {
            kind,
            address: address.to_string(),
        })
    }
}

/// A target that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidTarget {
    /// Delivery kind.
    pub kind: TargetKind,
    /// Normalized address.
    pub address: String,
}

/// Raw input for the creation saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTriggerRequest {
    /// Requesting account.
    pub user: UserId,
    /// Name of the device to watch.
    pub thing_name: String,
    /// Reported property to watch.
    pub property: String,
    /// Comparator spelling, e.g. `gt`.
    pub comparator: String,
    /// Threshold value.
    pub threshold: f64,
    /// Message to deliver.
    pub message: String,
    /// Targets subscribed at creation time, in order.
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
}

impl CreateTriggerRequest {
    /// Creates a request with no targets.
    pub fn new(
        user: UserId,
        thing_name: impl Into<String>,
        property: impl Into<String>,
        comparator: impl Into<String>,
        threshold: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user,
            thing_name: thing_name.into(),
            property: property.into(),
            comparator: comparator.into(),
            threshold,
            message: message.into(),
            targets: Vec::new(),
        }
    }

    /// Appends a target.
    #[must_use]
    pub fn with_target(mut self, target: TargetSpec) -> Self {
        self.targets.push(target);
        self
    }

    /// Validates everything that can be checked without a collaborator.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::InvalidCondition` for a bad comparator, property
    /// or threshold, and `TriggerError::Validation` for everything else.
    pub fn validate(&self, max_targets: usize) -> Result<ValidatedTrigger> {
        validate_thing_name(&self.thing_name)?;
        let comparator: Comparator = self.comparator.parse()?;
        let condition = Condition::new(self.property.trim(), comparator, self.threshold)?;
        let message = validate_message(&self.message)?;

        if self.targets.len() > max_targets {
            return Err(TriggerError::validation(format!(
                "at most {max_targets} targets are allowed, got {}",
                self.targets.len()
            )));
        }
        let targets = self
            .targets
            .iter()
            .map(TargetSpec::validate)
            .collect::<Result<Vec<_>>>()?;

        Ok(ValidatedTrigger {
            thing_name: self.thing_name.clone(),
            condition,
            message,
            targets,
        })
    }
}

/// A creation request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTrigger {
    /// Device name.
    pub thing_name: String,
    /// The condition.
    pub condition: Condition,
    /// Trimmed message.
    pub message: String,
    /// Targets, in order.
    pub targets: Vec<ValidTarget>,
}

/// Checks a device name can be embedded in a telemetry topic.
///
/// # Errors
///
/// Returns `TriggerError::Validation` if the name is empty or has reserved characters.
pub fn validate_thing_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TriggerError::validation("thing name cannot be empty"));
    }
    if !THING_NAME_PATTERN.is_match(name) {
        return Err(TriggerError::validation(format!(
            "thing name '{name}' contains reserved characters"
        )));
    }
    Ok(())
}

fn validate_message(message: &str) -> Result<String> {
    let message = message.trim();
    if message.is_empty() {
        return Err(TriggerError::validation("message cannot be empty"));
    }
    if message.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(TriggerError::validation(format!(
            "message exceeds {MAX_MESSAGE_LENGTH} characters"
        )));
    }
    Ok(message.to_string())
}
