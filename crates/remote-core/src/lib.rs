//! # remote-core
//!
//! Shared library for the universal remote containing the learned-code
//! library, the learn-session primitives, and the wire-format helpers used by
//! both remote-control backends.
//!
//! It has zero dependencies on the host platform, the service bus, the
//! message broker, or the file system.
//!
//! # Architecture overview
//!
//! A universal remote sits in front of two kinds of IR/RF transmitters:
//!
//! - a **firmware backend** reached through named service calls on the host's
//!   local service bus, and
//! - a **broker backend** (a small microcontroller firmware) reached by
//!   publishing JSON to publish/subscribe topics.
//!
//! Both can *send* a stored or ad-hoc code and both can *learn* a new code by
//! capturing a signal from a physical remote.  This crate defines:
//!
//! - **`domain`** – The persisted [`DeviceCommandLibrary`], typed request
//!   options ([`RepeatOptions`], [`CommandType`], [`CommandList`]), and the
//!   single-resolution [`CaptureSlot`] that a learn session waits on.
//!
//! - **`protocol`** – Pure functions over payload text: routing a raw payload
//!   to the IR or RF send channel, and decoding the bodies that the capture
//!   channels deliver.

pub mod domain;
pub mod protocol;

pub use domain::command::{
    learn_timeout_from_secs, validate_device, CommandList, CommandType, OneOrMany, RepeatOptions,
    ValidationError,
};
pub use domain::library::{DeviceCommandLibrary, LearnedCode, RemovalReport};
pub use domain::session::{
    notification_id, CaptureSlot, LearnSession, LearnState, SessionOutcome,
};
pub use protocol::capture::{
    decode_broker_capture, decode_firmware_event, decode_status_change, normalize_raw_code,
};
pub use protocol::classify::{classify_payload, OutboundPayload, PayloadFamily};
