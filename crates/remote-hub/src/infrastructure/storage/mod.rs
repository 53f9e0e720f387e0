//! Storage infrastructure: learned-code documents and configuration.
//!
//! - **`code_store`** – the [`CodeStore`] port and its JSON-file adapter.
//! - **`locks`** – per-document locks held across load-mutate-save.
//! - **`memory`** – an in-memory store for tests.
//! - **`config`** – the TOML hub configuration.

pub mod code_store;
pub mod config;
pub mod locks;
pub mod memory;

pub use code_store::{document_file_name, CodeStore, JsonCodeStore, StorageError};
pub use config::{
    default_config_path, load_config, BackendSettings, CaptureChannel, ConfigError,
    ConfigurationError, HubConfig, HubSettings, RemoteConfig,
};
pub use locks::StoreLocks;
pub use memory::MemoryCodeStore;
