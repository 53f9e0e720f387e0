//! Infrastructure layer for the remote hub.
//!
//! Contains the adapters the use cases run on: host capability ports and
//! their fakes, the two remote-control backends, and file-system storage.
//!
//! **Dependency rule**: this layer may depend on `remote_core`, but MUST NOT
//! import the `application` layer.

pub mod backend;
pub mod host;
pub mod storage;
