//! Per-document mutual exclusion for load-mutate-save cycles.
//!
//! A learn batch or delete loads the whole document, changes it in memory and
//! writes it back.  Two such cycles on the same document would lose the
//! earlier write, so every cycle holds the document's lock from `load` until
//! `save` returns.  Documents are keyed by id (for files, the path), so
//! distinct documents never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Shared registry of document locks.  Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct StoreLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl StoreLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for `document_id`, creating it on first use.
    pub fn handle(&self, document_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(document_id.to_string()).or_default())
    }

    /// Waits for exclusive access to `document_id`.
    pub async fn acquire(&self, document_id: &str) -> OwnedMutexGuard<()> {
        self.handle(document_id).lock_owned().await
    }

    /// Number of documents that have been locked at least once.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
