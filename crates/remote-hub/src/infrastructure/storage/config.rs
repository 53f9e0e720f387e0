//! TOML-based configuration for the remote hub.
//!
//! The default file location is platform-specific:
//! - Windows:  `%APPDATA%\UniversalRemote\config.toml`
//! - Linux:    `~/.config/universal-remote/config.toml`
//! - macOS:    `~/Library/Application Support/UniversalRemote/config.toml`
//!
//! Example:
//!
//! ```toml
//! [hub]
//! storage_dir = "/var/lib/universal-remote"
//! learn_timeout_secs = 60
//!
//! [[remotes]]
//! name = "Living room"
//! backend = "firmware"
//! device = "livingroom_ir"
//!
//! [[remotes]]
//! name = "Garage"
//! backend = "broker"
//! mqtt_topic = "garage_bridge"
//! indicator = "light.garage_bridge_led"
//! ```
//!
//! Fields annotated with `#[serde(default = "some_fn")]` fall back to
//! `some_fn()` when absent, so a missing file or a minimal file both work.
//! Backend parameters are optional at parse time and checked per remote by
//! [`RemoteConfig::validate`]; one bad remote never prevents the others from
//! loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::backend::{broker_identity, BackendKind, FirmwareCapture};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A remote whose backend parameters are incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("remote has an empty name")]
    EmptyName,
    #[error("remote '{remote}': firmware backend requires `device`")]
    MissingDevice { remote: String },
    #[error("remote '{remote}': broker backend requires `mqtt_topic`")]
    MissingTopic { remote: String },
    #[error("remote '{remote}': status capture requires `status_sensor`")]
    MissingStatusSensor { remote: String },
    #[error("remote '{remote}': broker backend configured but no broker connection is available")]
    BrokerUnavailable { remote: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HubConfig {
    #[serde(default)]
    pub hub: HubSettings,
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,
}

/// Settings shared by every remote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HubSettings {
    /// Directory holding one learned-code document per device or topic.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Learn session timeout when the caller does not pass one.
    #[serde(default = "default_learn_timeout_secs")]
    pub learn_timeout_secs: u64,
    /// Service-bus domain the firmware services live under.
    #[serde(default = "default_service_domain")]
    pub service_domain: String,
}

/// Where a firmware remote reports captured codes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CaptureChannel {
    /// A device-scoped bus event.
    #[default]
    Event,
    /// State changes of `status_sensor`.
    Status,
}

/// One configured remote entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteConfig {
    pub name: String,
    pub backend: BackendKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default)]
    pub capture: CaptureChannel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_sensor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mqtt_topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indicator: Option<String>,
}

/// Backend parameters of a remote that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSettings {
    Firmware {
        device: String,
        capture: FirmwareCapture,
    },
    Broker {
        topic: String,
        indicator: Option<String>,
    },
}

impl BackendSettings {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendSettings::Firmware { .. } => BackendKind::Firmware,
            BackendSettings::Broker { .. } => BackendKind::Broker,
        }
    }

    /// Device-or-topic identity naming this remote's store document.
    pub fn identity(&self) -> String {
        match self {
            BackendSettings::Firmware { device, .. } => device.clone(),
            BackendSettings::Broker { topic, .. } => broker_identity(topic),
        }
    }
}

impl RemoteConfig {
    /// Checks that the selected backend has every parameter it needs.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] naming the first missing parameter.
    pub fn validate(&self) -> Result<BackendSettings, ConfigurationError> {
        if self.name.trim().is_empty() {
            return Err(ConfigurationError::EmptyName);
        }

        match self.backend {
            BackendKind::Firmware => {
                let device = required(&self.device).ok_or_else(|| {
                    ConfigurationError::MissingDevice {
                        remote: self.name.clone(),
                    }
                })?;
                let capture = match self.capture {
                    CaptureChannel::Event => FirmwareCapture::Event,
                    CaptureChannel::Status => {
                        let sensor = required(&self.status_sensor).ok_or_else(|| {
                            ConfigurationError::MissingStatusSensor {
                                remote: self.name.clone(),
                            }
                        })?;
                        FirmwareCapture::StatusSensor(sensor)
                    }
                };
                Ok(BackendSettings::Firmware { device, capture })
            }
            BackendKind::Broker => {
                let topic = required(&self.mqtt_topic).ok_or_else(|| {
                    ConfigurationError::MissingTopic {
                        remote: self.name.clone(),
                    }
                })?;
                Ok(BackendSettings::Broker {
                    topic,
                    indicator: required(&self.indicator),
                })
            }
        }
    }
}

fn required(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl HubConfig {
    /// Finds a remote by name (case-insensitive).
    pub fn remote(&self, name: &str) -> Option<&RemoteConfig> {
        self.remotes
            .iter()
            .find(|remote| remote.name.eq_ignore_ascii_case(name.trim()))
    }
}

impl HubSettings {
    pub fn learn_timeout(&self) -> Duration {
        Duration::from_secs(self.learn_timeout_secs)
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_storage_dir() -> PathBuf {
    platform_config_dir()
        .map(|dir| dir.join("codes"))
        .unwrap_or_else(|| PathBuf::from(".universal-remote"))
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_learn_timeout_secs() -> u64 {
    60
}
fn default_service_domain() -> String {
    "esphome".to_string()
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            log_level: default_log_level(),
            learn_timeout_secs: default_learn_timeout_secs(),
            service_domain: default_service_domain(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads `HubConfig` from `path`, returning `HubConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<HubConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HubConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("UniversalRemote"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("universal-remote"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("UniversalRemote")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
