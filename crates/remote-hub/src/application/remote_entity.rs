//! The remote entity exposed to the host.
//!
//! A [`RemoteEntity`] owns one backend and one code store document, and
//! exposes the host-facing operations:
//!
//! | Operation        | Use case                                  |
//! |------------------|-------------------------------------------|
//! | `send_command`   | [`CommandRouter::send`]                   |
//! | `learn_command`  | [`LearnCoordinator::learn`]               |
//! | `delete_command` | [`manage_commands::delete_commands`]      |
//! | `list_commands`  | [`manage_commands::list_commands`]        |
//! | `turn_on` / `turn_off` / `toggle` | decorative on-state only |
//!
//! Requests arrive with loosely typed arguments.  A request with a missing or
//! malformed argument is logged and ignored: the operation returns `Ok` and
//! does nothing.

use std::ops::BitOr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use remote_core::{
    learn_timeout_from_secs, validate_device, CommandList, CommandType, OneOrMany,
    RemovalReport, RepeatOptions, ValidationError,
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::learn_command::{LearnCoordinator, LearnReport};
use super::manage_commands;
use super::send_command::CommandRouter;
use super::RemoteError;
use crate::infrastructure::backend::{
    Backend, BrokerBackend, FirmwareServiceBackend, Indicator,
};
use crate::infrastructure::host::{MessageBroker, Notifier, ServiceBus};
use crate::infrastructure::storage::{
    BackendSettings, CodeStore, ConfigurationError, HubConfig, HubSettings, JsonCodeStore,
    RemoteConfig, StoreLocks,
};

// ── Requests ──────────────────────────────────────────────────────────────────

/// Arguments of a send request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendCommandRequest {
    pub device: Option<String>,
    pub command: Option<OneOrMany>,
    #[serde(flatten)]
    pub repeat: RepeatOptions,
}

/// Arguments of a learn request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LearnCommandRequest {
    pub device: Option<String>,
    pub command: Option<OneOrMany>,
    /// `"ir"` (default) or `"rf"`.
    pub command_type: Option<String>,
    #[serde(alias = "timeout")]
    pub timeout_secs: Option<f64>,
}

/// Arguments of a delete request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteCommandRequest {
    pub device: Option<String>,
    pub command: Option<OneOrMany>,
}

fn required_device(device: &Option<String>) -> Result<String, ValidationError> {
    validate_device(device.as_deref().unwrap_or_default()).map(str::to_string)
}

fn required_commands(command: &Option<OneOrMany>) -> Result<CommandList, ValidationError> {
    command
        .clone()
        .ok_or(ValidationError::MissingCommand)
        .and_then(CommandList::try_from)
}

// ── Features ──────────────────────────────────────────────────────────────────

/// Bit set of the operations an entity supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteFeatures(pub u32);

impl RemoteFeatures {
    pub const LEARN_COMMAND: Self = Self(1);
    pub const DELETE_COMMAND: Self = Self(1 << 1);
    pub const SEND_COMMAND: Self = Self(1 << 2);
    pub const TURN_ON: Self = Self(1 << 3);
    pub const TURN_OFF: Self = Self(1 << 4);
    pub const TOGGLE: Self = Self(1 << 5);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for RemoteFeatures {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ── Host capabilities ─────────────────────────────────────────────────────────

/// Capabilities the host injects into every entity it sets up.
#[derive(Clone)]
pub struct HostCapabilities {
    pub bus: Arc<dyn ServiceBus>,
    /// Absent when the host has no broker connection.
    pub broker: Option<Arc<dyn MessageBroker>>,
    pub notifier: Arc<dyn Notifier>,
}

// ── Entity ────────────────────────────────────────────────────────────────────

pub struct RemoteEntity {
    name: String,
    backend: Arc<Backend>,
    store: Arc<dyn CodeStore>,
    router: CommandRouter,
    learner: LearnCoordinator,
    default_timeout: Duration,
    is_on: AtomicBool,
}

impl RemoteEntity {
    pub fn new(
        name: impl Into<String>,
        backend: Backend,
        store: Arc<dyn CodeStore>,
        notifier: Arc<dyn Notifier>,
        default_timeout: Duration,
    ) -> Self {
        let backend = Arc::new(backend);
        Self {
            name: name.into(),
            router: CommandRouter::new(Arc::clone(&backend), Arc::clone(&store)),
            learner: LearnCoordinator::new(Arc::clone(&backend), Arc::clone(&store), notifier),
            backend,
            store,
            default_timeout,
            is_on: AtomicBool::new(true),
        }
    }

    /// Builds an entity from its configuration, with a JSON store under
    /// `settings.storage_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when a required backend parameter is
    /// missing or the host lacks the capability the backend needs.
    pub fn from_config(
        config: &RemoteConfig,
        settings: &HubSettings,
        host: &HostCapabilities,
        locks: &StoreLocks,
    ) -> Result<Self, ConfigurationError> {
        let backend_settings = config.validate()?;
        let store = JsonCodeStore::new(
            &settings.storage_dir,
            &backend_settings.identity(),
            locks.clone(),
        );
        let backend = build_backend(config, backend_settings, settings, host)?;
        Ok(Self::new(
            config.name.clone(),
            backend,
            Arc::new(store),
            Arc::clone(&host.notifier),
            settings.learn_timeout(),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn store_id(&self) -> String {
        self.store.document_id()
    }

    /// No device query is made; the entity is always available.
    pub fn available(&self) -> bool {
        true
    }

    pub fn supported_features(&self) -> RemoteFeatures {
        RemoteFeatures::LEARN_COMMAND
            | RemoteFeatures::DELETE_COMMAND
            | RemoteFeatures::SEND_COMMAND
            | RemoteFeatures::TURN_ON
            | RemoteFeatures::TURN_OFF
            | RemoteFeatures::TOGGLE
    }

    /// Decorative power state. A new entity starts on.
    pub fn is_on(&self) -> bool {
        self.is_on.load(Ordering::SeqCst)
    }

    pub fn turn_on(&self) {
        self.is_on.store(true, Ordering::SeqCst);
        debug!(remote = %self.name, "turned on");
    }

    pub fn turn_off(&self) {
        self.is_on.store(false, Ordering::SeqCst);
        debug!(remote = %self.name, "turned off");
    }

    pub fn toggle(&self) {
        let was_on = self.is_on.fetch_xor(true, Ordering::SeqCst);
        debug!(remote = %self.name, on = !was_on, "toggled");
    }

    /// Sends one or more commands.
    ///
    /// Returns the number of payloads sent; an invalid request sends nothing.
    ///
    /// # Errors
    ///
    /// Storage and transport failures are returned.
    pub async fn send_command(&self, request: &SendCommandRequest) -> Result<usize, RemoteError> {
        let validated = required_device(&request.device).and_then(|device| {
            let commands = required_commands(&request.command)?;
            request.repeat.validate()?;
            Ok((device, commands))
        });
        let Some((device, commands)) = self.accept("send_command", validated) else {
            return Ok(0);
        };

        self.router.send(&device, &commands, &request.repeat).await
    }

    /// Learns one or more commands.
    ///
    /// # Errors
    ///
    /// Only storage failures are returned; see [`LearnCoordinator::learn`].
    pub async fn learn_command(
        &self,
        request: &LearnCommandRequest,
    ) -> Result<LearnReport, RemoteError> {
        let validated = required_device(&request.device).and_then(|device| {
            let commands = required_commands(&request.command)?;
            let command_type = match request.command_type.as_deref() {
                Some(text) => text.parse::<CommandType>()?,
                None => CommandType::default(),
            };
            let timeout = match request.timeout_secs {
                Some(secs) => learn_timeout_from_secs(secs)?,
                None => self.default_timeout,
            };
            Ok((device, commands, command_type, timeout))
        });
        let Some((device, commands, command_type, timeout)) =
            self.accept("learn_command", validated)
        else {
            return Ok(LearnReport::default());
        };

        info!(
            remote = %self.name,
            device = %device,
            commands = commands.len(),
            command_type = %command_type,
            "learning commands"
        );
        Ok(self
            .learner
            .learn(&device, &commands, command_type, timeout)
            .await?)
    }

    /// Deletes one or more learned commands.
    ///
    /// # Errors
    ///
    /// Storage failures are returned.
    pub async fn delete_command(
        &self,
        request: &DeleteCommandRequest,
    ) -> Result<RemovalReport, RemoteError> {
        let validated = required_device(&request.device)
            .and_then(|device| Ok((device, required_commands(&request.command)?)));
        let Some((device, commands)) = self.accept("delete_command", validated) else {
            return Ok(RemovalReport::default());
        };

        Ok(manage_commands::delete_commands(self.store.as_ref(), &device, &commands).await?)
    }

    /// Learned command names for `device`, sorted.
    ///
    /// # Errors
    ///
    /// Storage failures are returned.
    pub async fn list_commands(&self, device: &str) -> Result<Vec<String>, RemoteError> {
        let Some(device) = self.accept("list_commands", validate_device(device)) else {
            return Ok(Vec::new());
        };
        Ok(manage_commands::list_commands(self.store.as_ref(), device).await?)
    }

    fn accept<T>(&self, operation: &str, validated: Result<T, ValidationError>) -> Option<T> {
        validated
            .map_err(|e| warn!(remote = %self.name, operation, error = %e, "ignoring invalid request"))
            .ok()
    }
}

fn build_backend(
    config: &RemoteConfig,
    backend_settings: BackendSettings,
    settings: &HubSettings,
    host: &HostCapabilities,
) -> Result<Backend, ConfigurationError> {
    match backend_settings {
        BackendSettings::Firmware { device, capture } => {
            Ok(Backend::Firmware(FirmwareServiceBackend::new(
                Arc::clone(&host.bus),
                settings.service_domain.clone(),
                device,
                capture,
            )))
        }
        BackendSettings::Broker { topic, indicator } => {
            let broker = host.broker.as_ref().ok_or_else(|| {
                ConfigurationError::BrokerUnavailable {
                    remote: config.name.clone(),
                }
            })?;
            let indicator =
                indicator.map(|entity_id| Indicator::new(Arc::clone(&host.bus), entity_id));
            Ok(Backend::Broker(BrokerBackend::new(
                Arc::clone(broker),
                topic,
                indicator,
            )))
        }
    }
}

/// Builds an entity for every valid remote in `config`.
///
/// A remote with an invalid configuration is logged and skipped; the others
/// are still set up.
pub fn setup_platform(
    config: &HubConfig,
    host: &HostCapabilities,
    locks: &StoreLocks,
) -> Vec<RemoteEntity> {
    config
        .remotes
        .iter()
        .filter_map(|remote| {
            match RemoteEntity::from_config(remote, &config.hub, host, locks) {
                Ok(entity) => {
                    info!(
                        remote = %entity.name(),
                        backend = %entity.backend().kind(),
                        identity = %entity.backend().identity(),
                        store = %entity.store_id(),
                        "remote set up"
                    );
                    Some(entity)
                }
                Err(e) => {
                    error!(remote = %remote.name, error = %e, "skipping remote with invalid configuration");
                    None
                }
            }
        })
        .collect()
}

/// Opens a remote's code store without building its backend.  Used by tooling
/// that has the configuration but no host connection.
pub fn store_for(
    config: &RemoteConfig,
    storage_dir: &Path,
    locks: &StoreLocks,
) -> Result<JsonCodeStore, ConfigurationError> {
    let settings = config.validate()?;
    Ok(JsonCodeStore::new(storage_dir, &settings.identity(), locks.clone()))
}
