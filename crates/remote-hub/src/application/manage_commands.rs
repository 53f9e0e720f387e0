//! Delete and list learned commands.
//!
//! Delete follows the same load-mutate-save shape as learning, under the same
//! document lock, so a delete can never interleave with a learn batch on the
//! same document.

use remote_core::{CommandList, RemovalReport};
use tracing::{info, warn};

use crate::infrastructure::storage::{CodeStore, StorageError};

/// Removes `commands` from `device`.
///
/// Names that are not present are logged as warnings and reported in
/// [`RemovalReport::missing`]; they are not an error.  The document is only
/// written when something was actually removed.
///
/// # Errors
///
/// Returns [`StorageError`] if the document cannot be loaded or saved.
pub async fn delete_commands(
    store: &dyn CodeStore,
    device: &str,
    commands: &CommandList,
) -> Result<RemovalReport, StorageError> {
    let _document = store.lock().await;
    let mut library = store.load().await?;

    let report = library.remove(device, commands.as_slice());
    for name in &report.missing {
        warn!(device, command = %name, "cannot delete unknown command");
    }

    if !report.removed.is_empty() {
        store.save(&library).await?;
        info!(device, removed = ?report.removed, "commands deleted");
    }
    Ok(report)
}

/// Learned command names for `device`, sorted.
///
/// # Errors
///
/// Returns [`StorageError`] if the document cannot be loaded.
pub async fn list_commands(store: &dyn CodeStore, device: &str) -> Result<Vec<String>, StorageError> {
    let library = store.load().await?;
    Ok(library
        .commands(device)
        .into_iter()
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::MemoryCodeStore;
    use remote_core::{DeviceCommandLibrary, LearnedCode};

    fn store() -> MemoryCodeStore {
        let mut library = DeviceCommandLibrary::new();
        library.insert("tv", "power", LearnedCode::from("1,2"));
        library.insert("tv", "mute", LearnedCode::from("3,4"));
        MemoryCodeStore::with_library("tv", library)
    }

    #[tokio::test]
    async fn test_delete_removes_present_and_reports_missing() {
        // Arrange
        let store = store();
        let commands = CommandList::new(["power", "input"]).unwrap();

        // Act
        let report = delete_commands(&store, "tv", &commands).await.expect("delete");

        // Assert
        assert_eq!(report.removed, vec!["power"]);
        assert_eq!(report.missing, vec!["input"]);
        assert_eq!(store.snapshot().commands("tv"), vec!["mute"]);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_of_absent_name_leaves_document_unwritten() {
        let store = store();
        let before = store.snapshot();

        let report = delete_commands(&store, "tv", &CommandList::single("input").unwrap())
            .await
            .expect("delete");

        assert!(report.removed.is_empty());
        assert_eq!(store.snapshot(), before);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_list_commands_is_sorted_and_device_scoped() {
        let store = store();

        assert_eq!(list_commands(&store, "tv").await.unwrap(), vec!["mute", "power"]);
        assert!(list_commands(&store, "soundbar").await.unwrap().is_empty());
    }
}
