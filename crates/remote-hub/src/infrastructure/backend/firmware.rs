//! Backend for device firmware reached through service calls on the bus.
//!
//! | Operation         | Bus interaction                                         |
//! |-------------------|---------------------------------------------------------|
//! | send              | `{domain}.{device}_send {"command": <code>}` per repeat |
//! | trigger learn     | `{device}_learning_started`, then `{device}_learn`      |
//! | end learn         | `{device}_learning_ended`                               |
//! | capture (event)   | bus event `{domain}.{device}_learned_{ir,rf}`           |
//! | capture (status)  | state changes of the configured status entity           |

use std::sync::Arc;

use remote_core::{
    decode_firmware_event, decode_status_change, CommandType, RepeatOptions,
};
use serde_json::json;
use tracing::debug;

use super::{repeat_send, ArmedCapture};
use crate::infrastructure::host::{ServiceBus, TransportError};

/// Where the firmware reports a captured code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareCapture {
    /// A one-shot bus event scoped to this device and command family.
    Event,
    /// A status entity whose state changes to the captured raw code.
    StatusSensor(String),
}

pub struct FirmwareServiceBackend {
    bus: Arc<dyn ServiceBus>,
    domain: String,
    device: String,
    capture: FirmwareCapture,
}

impl FirmwareServiceBackend {
    pub fn new(
        bus: Arc<dyn ServiceBus>,
        domain: impl Into<String>,
        device: impl Into<String>,
        capture: FirmwareCapture,
    ) -> Self {
        Self {
            bus,
            domain: domain.into(),
            device: device.into(),
            capture,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    fn service(&self, action: &str) -> String {
        format!("{}_{action}", self.device)
    }

    /// Event type the firmware fires when a code of `command_type` is learned.
    pub fn learned_event_type(&self, command_type: CommandType) -> String {
        format!("{}.{}_learned_{}", self.domain, self.device, command_type)
    }

    pub async fn send_raw(
        &self,
        payload: &str,
        options: &RepeatOptions,
    ) -> Result<(), TransportError> {
        let service = self.service("send");
        repeat_send(options, options.hold(), || {
            debug!(device = %self.device, service = %service, "sending firmware command");
            self.bus
                .call(&self.domain, &service, json!({ "command": payload }))
        })
        .await
    }

    pub async fn arm_capture(
        &self,
        command_type: CommandType,
    ) -> Result<ArmedCapture, TransportError> {
        match &self.capture {
            FirmwareCapture::Event => {
                let event_type = self.learned_event_type(command_type);
                let subscription = self.bus.subscribe_event(&event_type).await?;
                Ok(ArmedCapture::spawn(subscription, move |body| {
                    decode_firmware_event(body, command_type)
                }))
            }
            FirmwareCapture::StatusSensor(entity_id) => {
                let subscription = self.bus.watch_state(entity_id).await?;
                Ok(ArmedCapture::spawn(subscription, decode_status_change))
            }
        }
    }

    pub async fn trigger_learn_mode(&self, command_type: CommandType) -> Result<(), TransportError> {
        self.bus
            .call(&self.domain, &self.service("learning_started"), json!({}))
            .await?;
        self.bus
            .call(
                &self.domain,
                &self.service("learn"),
                json!({ "command_type": command_type.as_str() }),
            )
            .await
    }

    pub async fn end_learn_mode(&self) -> Result<(), TransportError> {
        self.bus
            .call(&self.domain, &self.service("learning_ended"), json!({}))
            .await
    }
}
