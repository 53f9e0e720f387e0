//! Durable storage of learned codes.
//!
//! One JSON document per device-or-topic identity:
//!
//! ```text
//! {storage_dir}/universal_remote_{identity}.json
//!
//! {
//!   "livingroom_tv": { "power": "308,166,...", "mute": "..." },
//!   "soundbar":      { "power": { "Protocol": "NEC", "Data": "0x..." } }
//! }
//! ```
//!
//! `load` of a missing document yields an empty library.  `save` writes a
//! temporary file next to the target and renames it into place, so a later
//! `load` sees either the old document or the new one, never a partial write.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use remote_core::DeviceCommandLibrary;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;
use uuid::Uuid;

use super::locks::StoreLocks;

/// Error type for code store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error accessing code store at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("code store at {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Persistence of one [`DeviceCommandLibrary`] document.
///
/// Callers that mutate the document hold [`CodeStore::lock`] across the whole
/// load-mutate-save cycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Identifier of the underlying document, used in logs.
    fn document_id(&self) -> String;

    /// Waits for exclusive access to the document.
    async fn lock(&self) -> OwnedMutexGuard<()>;

    /// Loads the whole document; an absent document is an empty library.
    async fn load(&self) -> Result<DeviceCommandLibrary, StorageError>;

    /// Replaces the whole document.
    async fn save(&self, library: &DeviceCommandLibrary) -> Result<(), StorageError>;
}

/// File name of the document for a device-or-topic identity.
pub fn document_file_name(identity: &str) -> String {
    format!("universal_remote_{identity}.json")
}

/// A [`CodeStore`] backed by one JSON file.
#[derive(Debug, Clone)]
pub struct JsonCodeStore {
    path: PathBuf,
    locks: StoreLocks,
}

impl JsonCodeStore {
    /// Store for `identity` under `dir`, sharing `locks` with every other
    /// store built from the same registry.
    pub fn new(dir: &Path, identity: &str, locks: StoreLocks) -> Self {
        Self {
            path: dir.join(document_file_name(identity)),
            locks,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.path
            .with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()))
    }
}

#[async_trait]
impl CodeStore for JsonCodeStore {
    fn document_id(&self) -> String {
        self.path.display().to_string()
    }

    async fn lock(&self) -> OwnedMutexGuard<()> {
        self.locks.acquire(&self.document_id()).await
    }

    async fn load(&self) -> Result<DeviceCommandLibrary, StorageError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no code store yet, starting empty");
                return Ok(DeviceCommandLibrary::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        if content.trim().is_empty() {
            return Ok(DeviceCommandLibrary::new());
        }
        serde_json::from_str(&content).map_err(|source| StorageError::Json {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, library: &DeviceCommandLibrary) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| StorageError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        let content = serde_json::to_string_pretty(library).map_err(|source| {
            StorageError::Json {
                path: self.path.clone(),
                source,
            }
        })?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, content)
            .await
            .map_err(|e| self.io_error(e))?;
        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            tokio::fs::remove_file(&temp).await.ok();
            return Err(self.io_error(e));
        }

        debug!(path = %self.path.display(), devices = library.devices().count(), "code store saved");
        Ok(())
    }
}
