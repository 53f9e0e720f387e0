//! Typed arguments for the send, learn, and delete operations.
//!
//! The host hands these operations free-form arguments (`command` may be a
//! single string or a list, repeat options may be absent).  Everything is
//! normalised here, once, into explicit types with named, defaulted fields.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An operation argument was missing or malformed.
///
/// Validation failures are never fatal: the hub logs them and turns the
/// operation into a no-op.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("a device must be given")]
    MissingDevice,
    #[error("at least one command must be given")]
    MissingCommand,
    #[error("command names must not be empty")]
    EmptyCommandName,
    #[error("unknown command type {0:?}, expected \"ir\" or \"rf\"")]
    UnknownCommandType(String),
    #[error("invalid repeat options: {0}")]
    InvalidRepeat(String),
    #[error("learn timeout must be a positive number of seconds, got {0}")]
    InvalidTimeout(f64),
}

/// Checks that a device identifier is present and non-blank.
pub fn validate_device(device: &str) -> Result<&str, ValidationError> {
    let trimmed = device.trim();
    if trimmed.is_empty() {
        Err(ValidationError::MissingDevice)
    } else {
        Ok(trimmed)
    }
}

/// Converts a caller-supplied learn timeout in seconds to a duration.
pub fn learn_timeout_from_secs(secs: f64) -> Result<Duration, ValidationError> {
    if secs <= 0.0 {
        return Err(ValidationError::InvalidTimeout(secs));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| ValidationError::InvalidTimeout(secs))
}

// ── Command type ──────────────────────────────────────────────────────────────

/// Signal family a learn session captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    #[default]
    Ir,
    Rf,
}

impl CommandType {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandType::Ir => "ir",
            CommandType::Rf => "rf",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ir" => Ok(CommandType::Ir),
            "rf" => Ok(CommandType::Rf),
            _ => Err(ValidationError::UnknownCommandType(s.to_string())),
        }
    }
}

// ── Command list ──────────────────────────────────────────────────────────────

/// The shape the host passes a `command` argument in: `"power"` or
/// `["power", "mute"]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// A non-empty, ordered list of non-empty command names (or raw payloads when
/// sending).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "OneOrMany", into = "Vec<String>")]
pub struct CommandList(Vec<String>);

impl CommandList {
    /// Builds a list, rejecting an empty list or any blank entry.
    pub fn new<I, S>(names: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(ValidationError::MissingCommand);
        }
        if names.iter().any(|name| name.trim().is_empty()) {
            return Err(ValidationError::EmptyCommandName);
        }
        Ok(Self(names))
    }

    /// Convenience constructor for a single name.
    pub fn single(name: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new([name.into()])
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<OneOrMany> for CommandList {
    type Error = ValidationError;

    fn try_from(value: OneOrMany) -> Result<Self, Self::Error> {
        match value {
            OneOrMany::One(name) => Self::single(name),
            OneOrMany::Many(names) => Self::new(names),
        }
    }
}

impl From<CommandList> for Vec<String> {
    fn from(list: CommandList) -> Self {
        list.0
    }
}

impl<'a> IntoIterator for &'a CommandList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ── Repeat options ────────────────────────────────────────────────────────────

fn default_num_repeats() -> u32 {
    1
}

/// Repeat, delay, and hold semantics for sending a command.
///
/// | Field         | Default | Meaning                                              |
/// |---------------|---------|------------------------------------------------------|
/// | `num_repeats` | `1`     | How many times each resolved payload is sent         |
/// | `delay_secs`  | `0.0`   | Pause between repeats (never after the last one)     |
/// | `hold_secs`   | `0.0`   | Firmware backend only: pause after each call to simulate a long press |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepeatOptions {
    #[serde(default = "default_num_repeats")]
    pub num_repeats: u32,
    #[serde(default)]
    pub delay_secs: f64,
    #[serde(default)]
    pub hold_secs: f64,
}

impl Default for RepeatOptions {
    fn default() -> Self {
        Self {
            num_repeats: default_num_repeats(),
            delay_secs: 0.0,
            hold_secs: 0.0,
        }
    }
}

impl RepeatOptions {
    /// Rejects zero repeats and durations that are negative, non-finite, or
    /// too large to represent.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.num_repeats == 0 {
            return Err(ValidationError::InvalidRepeat(
                "num_repeats must be at least 1".to_string(),
            ));
        }
        for (name, secs) in [("delay_secs", self.delay_secs), ("hold_secs", self.hold_secs)] {
            if !secs.is_finite() || secs < 0.0 || Duration::try_from_secs_f64(secs).is_err() {
                return Err(ValidationError::InvalidRepeat(format!(
                    "{name} must be a non-negative number, got {secs}"
                )));
            }
        }
        Ok(())
    }

    /// Pause between consecutive repeats.
    pub fn delay(&self) -> Duration {
        saturating_secs(self.delay_secs)
    }

    /// Long-press hold after each call.
    pub fn hold(&self) -> Duration {
        saturating_secs(self.hold_secs)
    }
}

// NaN and negatives clamp to zero, overflow to `Duration::MAX`.
fn saturating_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}
