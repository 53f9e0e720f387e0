//! Command router.
//!
//! Each requested name is looked up in the device's library.  A hit sends the
//! stored code; a miss sends the name itself as a raw payload, which is how
//! ad-hoc codes are sent without learning them first.  Payloads go out one
//! after another, each with the full repeat policy, and every backend call is
//! awaited before the next one starts.

use std::sync::Arc;

use remote_core::{CommandList, DeviceCommandLibrary, RepeatOptions};
use tracing::{debug, info};

use super::RemoteError;
use crate::infrastructure::backend::Backend;
use crate::infrastructure::storage::CodeStore;

pub struct CommandRouter {
    backend: Arc<Backend>,
    store: Arc<dyn CodeStore>,
}

impl CommandRouter {
    pub fn new(backend: Arc<Backend>, store: Arc<dyn CodeStore>) -> Self {
        Self { backend, store }
    }

    /// Sends every command in `commands` to `device`.
    ///
    /// Returns the number of payloads sent (repeats not counted).
    ///
    /// # Errors
    ///
    /// Options that fail [`RepeatOptions::validate`] return
    /// [`RemoteError::Validation`] before anything is sent.  A failed `load`
    /// returns [`RemoteError::Storage`]; the first failed backend call stops
    /// the batch and returns [`RemoteError::Transport`].
    pub async fn send(
        &self,
        device: &str,
        commands: &CommandList,
        options: &RepeatOptions,
    ) -> Result<usize, RemoteError> {
        options.validate()?;
        let library = self.store.load().await?;

        for command in commands {
            let payload = resolve(&library, device, command);
            debug!(device, command = %command, stored = payload.is_stored, "sending command");
            self.backend.send_raw(&payload.text, options).await?;
        }

        info!(
            device,
            commands = commands.len(),
            repeats = options.num_repeats,
            backend = %self.backend.kind(),
            "commands sent"
        );
        Ok(commands.len())
    }
}

/// The payload a command name resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPayload {
    pub text: String,
    /// `true` when the text came from the library rather than the request.
    pub is_stored: bool,
}

/// Resolves `command` for `device`: the stored code if learned, otherwise the
/// literal string.
pub fn resolve(library: &DeviceCommandLibrary, device: &str, command: &str) -> ResolvedPayload {
    match library.get(device, command) {
        Some(code) => ResolvedPayload {
            text: code.to_payload(),
            is_stored: true,
        },
        None => ResolvedPayload {
            text: command.to_string(),
            is_stored: false,
        },
    }
}
