//! Backend for microcontroller firmware reached through broker topics.
//!
//! There is no explicit trigger call: the receiver reports every signal it
//! sees on `tele/{topic}/RESULT`, so capture is armed purely by subscribing.
//! An optional indicator actuator (an entity on the service bus) is switched
//! on for the duration of the learn window.

use std::sync::Arc;
use std::time::Duration;

use remote_core::{classify_payload, decode_broker_capture, CommandType, RepeatOptions};
use serde_json::json;
use tracing::debug;

use super::{repeat_send, ArmedCapture};
use crate::infrastructure::host::{MessageBroker, ServiceBus, TransportError};

/// An indicator entity toggled around the learn window.
pub struct Indicator {
    bus: Arc<dyn ServiceBus>,
    entity_id: String,
}

impl Indicator {
    pub fn new(bus: Arc<dyn ServiceBus>, entity_id: impl Into<String>) -> Self {
        Self {
            bus,
            entity_id: entity_id.into(),
        }
    }

    async fn switch(&self, service: &str) -> Result<(), TransportError> {
        let domain = self
            .entity_id
            .split_once('.')
            .map_or("homeassistant", |(domain, _)| domain);
        self.bus
            .call(domain, service, json!({ "entity_id": self.entity_id }))
            .await
    }
}

pub struct BrokerBackend {
    broker: Arc<dyn MessageBroker>,
    topic: String,
    indicator: Option<Indicator>,
}

impl BrokerBackend {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        topic: impl Into<String>,
        indicator: Option<Indicator>,
    ) -> Self {
        Self {
            broker,
            topic: topic.into(),
            indicator,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn result_topic(&self) -> String {
        format!("tele/{}/RESULT", self.topic)
    }

    /// Classifies `payload` and publishes it to `cmnd/{topic}/IRSend` or
    /// `cmnd/{topic}/RfSend`.  Hold is a firmware-backend feature and is
    /// ignored here.
    pub async fn send_raw(
        &self,
        payload: &str,
        options: &RepeatOptions,
    ) -> Result<(), TransportError> {
        let outbound = classify_payload(payload);
        let topic = format!("cmnd/{}/{}", self.topic, outbound.family.topic_suffix());
        let body = outbound.to_json();

        if options.hold_secs > 0.0 {
            debug!(topic = %self.topic, "hold is not supported by the broker backend, ignoring");
        }

        repeat_send(options, Duration::ZERO, || {
            debug!(topic = %topic, family = ?outbound.family, "publishing command");
            self.broker.publish(&topic, &body)
        })
        .await
    }

    pub async fn arm_capture(
        &self,
        command_type: CommandType,
    ) -> Result<ArmedCapture, TransportError> {
        let subscription = self.broker.subscribe(&self.result_topic()).await?;
        Ok(ArmedCapture::spawn(subscription, move |body| {
            decode_broker_capture(body, command_type)
        }))
    }

    pub async fn trigger_learn_mode(&self, _command_type: CommandType) -> Result<(), TransportError> {
        match &self.indicator {
            Some(indicator) => indicator.switch("turn_on").await,
            None => Ok(()),
        }
    }

    pub async fn end_learn_mode(&self) -> Result<(), TransportError> {
        match &self.indicator {
            Some(indicator) => indicator.switch("turn_off").await,
            None => Ok(()),
        }
    }
}
