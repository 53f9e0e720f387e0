//! Remote-control backends.
//!
//! A remote entity drives exactly one of two transmitter styles:
//!
//! - [`FirmwareServiceBackend`] – device firmware exposing named services on
//!   the host's service bus (`{device}_send`, `{device}_learn`, …).
//! - [`BrokerBackend`] – microcontroller firmware listening on broker topics
//!   (`cmnd/{topic}/IRSend`, `cmnd/{topic}/RfSend`, `tele/{topic}/RESULT`).
//!
//! [`Backend`] is a closed enum over the two, so callers never branch on a
//! backend name.  Every variant offers the same four operations:
//!
//! ```text
//! send_raw(payload, repeat)     one or more outbound calls
//! arm_capture(command_type)     subscribe BEFORE triggering → ArmedCapture
//! trigger_learn_mode(type)      put the receiver into capture mode
//! end_learn_mode()              leave capture mode (always called in cleanup)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use remote_core::{CaptureSlot, CommandType, LearnedCode, RepeatOptions};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::infrastructure::host::{ListenerGuard, Subscription, TransportError};

pub mod broker;
pub mod firmware;

pub use broker::{BrokerBackend, Indicator};
pub use firmware::{FirmwareCapture, FirmwareServiceBackend};

/// The two backend styles, used in configuration and logs.
///
/// The integration's historical names (`esphome`, `tasmota`) are accepted as
/// aliases in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[serde(alias = "esphome")]
    Firmware,
    #[serde(alias = "tasmota")]
    Broker,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            BackendKind::Firmware => "firmware",
            BackendKind::Broker => "broker",
        })
    }
}

/// A configured backend.
pub enum Backend {
    Firmware(FirmwareServiceBackend),
    Broker(BrokerBackend),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Firmware(_) => BackendKind::Firmware,
            Backend::Broker(_) => BackendKind::Broker,
        }
    }

    /// Device-or-topic identity; names the backend's store document.
    pub fn identity(&self) -> String {
        match self {
            Backend::Firmware(fw) => fw.device().to_string(),
            Backend::Broker(broker) => broker_identity(broker.topic()),
        }
    }

    /// Sends `payload` with the given repeat/delay/hold policy.
    pub async fn send_raw(
        &self,
        payload: &str,
        options: &RepeatOptions,
    ) -> Result<(), TransportError> {
        match self {
            Backend::Firmware(fw) => fw.send_raw(payload, options).await,
            Backend::Broker(broker) => broker.send_raw(payload, options).await,
        }
    }

    /// Arms the capture listener for `command_type`.
    pub async fn arm_capture(
        &self,
        command_type: CommandType,
    ) -> Result<ArmedCapture, TransportError> {
        match self {
            Backend::Firmware(fw) => fw.arm_capture(command_type).await,
            Backend::Broker(broker) => broker.arm_capture(command_type).await,
        }
    }

    pub async fn trigger_learn_mode(&self, command_type: CommandType) -> Result<(), TransportError> {
        match self {
            Backend::Firmware(fw) => fw.trigger_learn_mode(command_type).await,
            Backend::Broker(broker) => broker.trigger_learn_mode(command_type).await,
        }
    }

    pub async fn end_learn_mode(&self) -> Result<(), TransportError> {
        match self {
            Backend::Firmware(fw) => fw.end_learn_mode().await,
            Backend::Broker(broker) => broker.end_learn_mode().await,
        }
    }
}

/// Store identity for a broker topic (`/` is not allowed in file names).
pub fn broker_identity(topic: &str) -> String {
    topic.replace('/', "_")
}

/// Sends one payload `options.num_repeats` times through `send_once`, pausing
/// `hold` after each call and `delay` between repeats (never after the last).
pub(crate) async fn repeat_send<F, Fut>(
    options: &RepeatOptions,
    hold: Duration,
    mut send_once: F,
) -> Result<(), TransportError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), TransportError>>,
{
    let delay = options.delay();
    for repeat in 0..options.num_repeats {
        send_once().await?;
        if !hold.is_zero() {
            tokio::time::sleep(hold).await;
        }
        let is_last = repeat + 1 == options.num_repeats;
        if !is_last && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    Ok(())
}

// ── Armed capture ─────────────────────────────────────────────────────────────

/// An armed capture listener bound to one learn session.
///
/// A background pump reads the subscription, decodes each body, and resolves
/// the session's [`CaptureSlot`] with the first match.  Malformed or
/// non-matching bodies are skipped.  [`ArmedCapture::disarm`] closes the slot,
/// stops the pump, and unregisters the host listener; it is idempotent and
/// also runs on drop.
pub struct ArmedCapture {
    channel: String,
    slot: Arc<CaptureSlot>,
    receiver: Option<oneshot::Receiver<LearnedCode>>,
    pump: JoinHandle<()>,
    guard: ListenerGuard,
}

impl ArmedCapture {
    /// Starts pumping `subscription` through `decode`.
    pub fn spawn<D>(subscription: Subscription, decode: D) -> Self
    where
        D: Fn(&str) -> Option<LearnedCode> + Send + 'static,
    {
        let channel = subscription.channel().to_string();
        let (mut messages, guard) = subscription.into_parts();
        let (slot, receiver) = CaptureSlot::new();

        let pump_slot = Arc::clone(&slot);
        let pump_channel = channel.clone();
        let pump = tokio::spawn(async move {
            while let Some(message) = messages.recv().await {
                let Some(code) = decode(&message.body) else {
                    trace!(channel = %pump_channel, "ignoring non-matching capture message");
                    continue;
                };
                if !pump_slot.resolve(code) {
                    debug!(channel = %pump_channel, "capture arrived after session settled, dropped");
                }
                break;
            }
        });

        Self {
            channel,
            slot,
            receiver: Some(receiver),
            pump,
            guard,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Waits up to `timeout` for the first matching capture.
    ///
    /// Returns `None` on timeout, and on any call after the first.
    pub async fn wait(&mut self, timeout: Duration) -> Option<LearnedCode> {
        let receiver = self.receiver.take()?;
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(code)) => Some(code),
            Ok(Err(_)) | Err(_) => {
                self.slot.close();
                None
            }
        }
    }

    /// Releases the listener.  Returns `true` only on the first call.
    pub fn disarm(&mut self) -> bool {
        self.slot.close();
        self.pump.abort();
        self.guard.disarm()
    }

    pub fn is_disarmed(&self) -> bool {
        self.guard.is_disarmed()
    }
}

impl Drop for ArmedCapture {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::host::mock::MockBroker;
    use crate::infrastructure::host::MessageBroker;
    use remote_core::decode_broker_capture;

    async fn armed_on(broker: &MockBroker, topic: &str) -> ArmedCapture {
        let sub = broker.subscribe(topic).await.expect("subscribe");
        ArmedCapture::spawn(sub, |body| decode_broker_capture(body, CommandType::Ir))
    }

    #[tokio::test]
    async fn test_armed_capture_skips_malformed_and_resolves_on_match() {
        // Arrange
        let broker = MockBroker::new();
        let mut armed = armed_on(&broker, "tele/ir/RESULT").await;

        // Act
        broker.inject("tele/ir/RESULT", "{broken");
        broker.inject("tele/ir/RESULT", r#"{"IRSend":"Done"}"#);
        broker.inject("tele/ir/RESULT", r#"{"IrReceived":{"Protocol":"NEC","Data":"0x1"}}"#);
        let code = armed.wait(Duration::from_secs(1)).await;

        // Assert
        let code = code.expect("matching capture resolves the wait");
        assert!(code.to_payload().contains("NEC"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_armed_capture_times_out_without_match() {
        let broker = MockBroker::new();
        let mut armed = armed_on(&broker, "tele/ir/RESULT").await;

        broker.inject("tele/ir/RESULT", r#"{"RfReceived":{"Data":"0x1","Protocol":1}}"#);
        let code = armed.wait(Duration::from_secs(5)).await;

        assert_eq!(code, None);
    }

    #[tokio::test]
    async fn test_disarm_is_idempotent_and_unsubscribes() {
        let broker = MockBroker::new();
        let mut armed = armed_on(&broker, "tele/ir/RESULT").await;
        assert_eq!(broker.active_subscribers("tele/ir/RESULT"), 1);

        assert!(armed.disarm());
        assert!(!armed.disarm());
        assert!(armed.is_disarmed());
        drop(armed);

        assert_eq!(broker.active_subscribers("tele/ir/RESULT"), 0);
        assert_eq!(broker.disarm_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_send_pauses_between_repeats_only() {
        // Arrange
        let options = RepeatOptions {
            num_repeats: 3,
            delay_secs: 2.0,
            hold_secs: 0.0,
        };
        let start = tokio::time::Instant::now();
        let stamps = std::sync::Mutex::new(Vec::new());

        // Act
        repeat_send(&options, Duration::ZERO, || {
            stamps.lock().unwrap().push(start.elapsed());
            async { Ok(()) }
        })
        .await
        .expect("send");

        // Assert
        let stamps = stamps.into_inner().unwrap();
        assert_eq!(
            stamps,
            vec![Duration::ZERO, Duration::from_secs(2), Duration::from_secs(4)]
        );
        assert_eq!(start.elapsed(), Duration::from_secs(4), "no delay after the last repeat");
    }

    #[test]
    fn test_broker_identity_replaces_slashes() {
        assert_eq!(broker_identity("home/ir_bridge"), "home_ir_bridge");
    }
}
