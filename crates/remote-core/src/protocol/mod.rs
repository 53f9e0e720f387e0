//! Wire-format helpers shared by both backends.
//!
//! - **`classify`** – decides whether a payload goes to the IR or RF send
//!   channel and what JSON body is published.
//! - **`capture`** – decodes the bodies delivered by the capture channels
//!   (broker result topic, firmware learn event, entity-state change).

pub mod capture;
pub mod classify;

pub use capture::{
    decode_broker_capture, decode_firmware_event, decode_status_change, normalize_raw_code,
};
pub use classify::{classify_payload, OutboundPayload, PayloadFamily};
