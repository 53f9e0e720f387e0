//! In-memory [`CodeStore`] for tests and dry runs.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex, PoisonError,
};

use async_trait::async_trait;
use remote_core::DeviceCommandLibrary;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::code_store::{CodeStore, StorageError};

/// A [`CodeStore`] that keeps the document in memory.
#[derive(Debug, Default)]
pub struct MemoryCodeStore {
    name: String,
    document: Mutex<DeviceCommandLibrary>,
    lock: Arc<AsyncMutex<()>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryCodeStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A store that already holds `library`.
    pub fn with_library(name: impl Into<String>, library: DeviceCommandLibrary) -> Self {
        let store = Self::new(name);
        *store.document.lock().unwrap_or_else(PoisonError::into_inner) = library;
        store
    }

    /// The current document, as a later `load` would return it.
    pub fn snapshot(&self) -> DeviceCommandLibrary {
        self.document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Makes every later `save` fail with an I/O error.
    pub fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CodeStore for MemoryCodeStore {
    fn document_id(&self) -> String {
        format!("memory:{}", self.name)
    }

    async fn lock(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.lock).lock_owned().await
    }

    async fn load(&self) -> Result<DeviceCommandLibrary, StorageError> {
        Ok(self.snapshot())
    }

    async fn save(&self, library: &DeviceCommandLibrary) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Io {
                path: self.document_id().into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "simulated save failure"),
            });
        }
        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = library.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
