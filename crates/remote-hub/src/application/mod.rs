//! Application layer use cases for the remote hub.
//!
//! Use cases orchestrate the `remote_core` domain types over the
//! infrastructure ports (backends, code store, notifier).  They contain no
//! direct file or network access.
//!
//! # Sub-modules
//!
//! - **`learn_command`** – The learning coordinator: one bounded capture
//!   session per command name, with guaranteed cleanup, and a single save
//!   per batch under the document lock.
//!
//! - **`send_command`** – The command router: resolves names against the
//!   library (falling back to the literal payload) and drives the backend
//!   with repeat/delay/hold semantics.
//!
//! - **`manage_commands`** – Delete and list learned commands.
//!
//! - **`remote_entity`** – The entity the host talks to; validates request
//!   arguments and dispatches to the use cases above.

use remote_core::ValidationError;
use thiserror::Error;

use crate::infrastructure::host::TransportError;
use crate::infrastructure::storage::StorageError;

pub mod learn_command;
pub mod manage_commands;
pub mod remote_entity;
pub mod send_command;

/// Error type returned by entity operations.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
