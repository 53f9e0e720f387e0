//! The persisted library of learned commands.
//!
//! One [`DeviceCommandLibrary`] is stored per remote entity.  It maps a device
//! identifier to that device's learned commands:
//!
//! ```json
//! {
//!   "livingroom_tv": {
//!     "power": "308,166,20,62,20,21",
//!     "volume_up": { "Protocol": "NEC", "Bits": 32, "Data": "0x20DF40BF" }
//!   }
//! }
//! ```
//!
//! The library is always loaded whole, mutated in memory, and written back
//! whole.  There is no versioning and no partial update; the store that owns
//! the document is responsible for serialising writers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A captured signal payload.
///
/// The firmware backend produces raw timing sequences (`"308,166,20,62"`);
/// the broker backend produces structured protocol records.  Both are stored
/// verbatim and replayed verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LearnedCode {
    /// A delimited timing sequence or any other opaque text code.
    Raw(String),
    /// A structured record such as `{"Protocol": "NEC", "Data": "0x..."}`.
    Structured(Map<String, Value>),
}

impl LearnedCode {
    /// Renders the code as the outbound payload text handed to a backend.
    ///
    /// Raw codes are returned unchanged; structured records are rendered as
    /// compact JSON so the broker backend can re-decode them.
    pub fn to_payload(&self) -> String {
        match self {
            LearnedCode::Raw(code) => code.clone(),
            LearnedCode::Structured(record) => Value::Object(record.clone()).to_string(),
        }
    }
}

impl From<&str> for LearnedCode {
    fn from(code: &str) -> Self {
        LearnedCode::Raw(code.to_string())
    }
}

impl From<String> for LearnedCode {
    fn from(code: String) -> Self {
        LearnedCode::Raw(code)
    }
}

/// Result of removing a batch of command names from one device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    /// Names that were present and have been removed.
    pub removed: Vec<String>,
    /// Names that were not present for the device.
    pub missing: Vec<String>,
}

/// Learned commands grouped by device, then by command name.
///
/// `BTreeMap` keeps the on-disk JSON stable between saves, which makes the
/// document diff-friendly for users who keep it under version control.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceCommandLibrary {
    devices: BTreeMap<String, BTreeMap<String, LearnedCode>>,
}

impl DeviceCommandLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when no device has ever been recorded.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Looks up the stored code for `command` on `device`.
    pub fn get(&self, device: &str, command: &str) -> Option<&LearnedCode> {
        self.devices.get(device)?.get(command)
    }

    /// Returns `true` if `device` has an entry (even an empty one).
    pub fn has_device(&self, device: &str) -> bool {
        self.devices.contains_key(device)
    }

    /// Returns the device identifiers in sorted order.
    pub fn devices(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    /// Returns the command names learned for `device`, sorted.
    pub fn commands(&self, device: &str) -> Vec<&str> {
        self.devices
            .get(device)
            .map(|commands| commands.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Stores `code` under `device`/`command`, creating the device entry on
    /// first use.  Returns the previously stored code, if any.
    pub fn insert(
        &mut self,
        device: &str,
        command: &str,
        code: LearnedCode,
    ) -> Option<LearnedCode> {
        self.devices
            .entry(device.to_string())
            .or_default()
            .insert(command.to_string(), code)
    }

    /// Merges a batch of captured codes into `device`, overwriting same-named
    /// entries and leaving every other entry untouched.
    pub fn merge<I>(&mut self, device: &str, captured: I)
    where
        I: IntoIterator<Item = (String, LearnedCode)>,
    {
        let commands = self.devices.entry(device.to_string()).or_default();
        commands.extend(captured);
    }

    /// Removes each name in `names` from `device`.
    ///
    /// The device entry itself is kept even when its last command is removed.
    pub fn remove(&mut self, device: &str, names: &[String]) -> RemovalReport {
        let mut report = RemovalReport::default();
        let commands = self.devices.get_mut(device);

        match commands {
            Some(commands) => {
                for name in names {
                    if commands.remove(name).is_some() {
                        report.removed.push(name.clone());
                    } else {
                        report.missing.push(name.clone());
                    }
                }
            }
            None => report.missing.extend(names.iter().cloned()),
        }
        report
    }
}
