//! Domain entities for the universal remote.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies: nothing here performs I/O, talks to the host, or reads the
//! clock.  Code in outer layers (the hub's application and infrastructure
//! layers) depends on these types, but they never depend on it.

/// Persisted mapping of device → command name → learned code.
pub mod library;

/// Typed request options shared by the send, learn, and delete operations.
pub mod command;

/// Learn-session state and the single-resolution capture slot.
pub mod session;
