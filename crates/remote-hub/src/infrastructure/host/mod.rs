//! Capabilities the hub borrows from its host platform.
//!
//! The learning coordinator and the command router never talk to a concrete
//! service bus, MQTT client, or notification service.  They receive these
//! trait objects at construction time instead:
//!
//! - [`ServiceBus`]   – named service calls, one-shot events, and entity-state
//!   changes on the host's local bus.
//! - [`MessageBroker`] – publish/subscribe on broker topics.
//! - [`Notifier`]     – user-facing prompts identified by a stable id.
//!
//! # Subscriptions
//!
//! Every subscription is delivered as a [`Subscription`]: a stream of
//! [`Notification`]s plus a [`ListenerGuard`] that unregisters the listener on
//! the host.  Disarming is idempotent and also happens on drop, so a listener
//! can never outlive the session that armed it.
//!
//! # Testability
//!
//! [`mock`] provides in-memory fakes for all three traits so the application
//! layer can be exercised without any host runtime.

use std::fmt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, PoisonError,
};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod mock;

/// Error type for calls into the host platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("service call {domain}.{service} failed: {reason}")]
    ServiceCall {
        domain: String,
        service: String,
        reason: String,
    },
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
    #[error("subscribing to {channel} failed: {reason}")]
    Subscribe { channel: String, reason: String },
    #[error("notification {id} failed: {reason}")]
    Notify { id: String, reason: String },
}

/// One message delivered on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Event type, topic, or watched entity the message arrived on.
    pub channel: String,
    /// The message body, normally JSON text.
    pub body: String,
}

impl Notification {
    pub fn new(channel: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            body: body.into(),
        }
    }
}

// ── Listener guard ────────────────────────────────────────────────────────────

type DisarmFn = Box<dyn FnOnce() + Send>;

/// Unregisters a host listener exactly once.
pub struct ListenerGuard {
    disarm: Mutex<Option<DisarmFn>>,
    disarmed: AtomicBool,
}

impl ListenerGuard {
    /// Wraps the host's unsubscribe action.
    pub fn new(disarm: impl FnOnce() + Send + 'static) -> Self {
        Self {
            disarm: Mutex::new(Some(Box::new(disarm))),
            disarmed: AtomicBool::new(false),
        }
    }

    /// A guard with nothing to release.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Runs the unsubscribe action if it has not run yet.
    ///
    /// Returns `true` only for the call that actually disarmed the listener;
    /// every later call is a harmless no-op.
    pub fn disarm(&self) -> bool {
        let action = self
            .disarm
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match action {
            Some(action) => {
                action();
                self.disarmed.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn is_disarmed(&self) -> bool {
        self.disarmed.load(Ordering::SeqCst)
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.disarm();
    }
}

impl fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("disarmed", &self.is_disarmed())
            .finish()
    }
}

// ── Subscription ──────────────────────────────────────────────────────────────

/// An armed listener on one host channel.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    receiver: mpsc::UnboundedReceiver<Notification>,
    guard: ListenerGuard,
}

impl Subscription {
    pub fn new(
        channel: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<Notification>,
        guard: ListenerGuard,
    ) -> Self {
        Self {
            channel: channel.into(),
            receiver,
            guard,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Waits for the next message; `None` once the host closes the channel.
    pub async fn next(&mut self) -> Option<Notification> {
        self.receiver.recv().await
    }

    /// Splits the message stream from the guard so they can live in
    /// different tasks.
    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<Notification>, ListenerGuard) {
        (self.receiver, self.guard)
    }
}

// ── Capability traits ─────────────────────────────────────────────────────────

/// The host's local service bus.
#[async_trait]
pub trait ServiceBus: Send + Sync {
    /// Invokes `domain.service` with `data` and waits for it to complete.
    async fn call(&self, domain: &str, service: &str, data: Value) -> Result<(), TransportError>;

    /// Subscribes to bus events of `event_type`.
    async fn subscribe_event(&self, event_type: &str) -> Result<Subscription, TransportError>;

    /// Watches `entity_id` for state changes.
    ///
    /// Each message body is `{"entity_id": ..., "old_state": ..., "new_state": ...}`.
    async fn watch_state(&self, entity_id: &str) -> Result<Subscription, TransportError>;
}

/// A publish/subscribe message broker client.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError>;

    async fn subscribe(&self, topic: &str) -> Result<Subscription, TransportError>;
}

/// User-facing prompts.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Shows a prompt, replacing any prompt already shown under `id`.
    async fn show(&self, id: &str, title: &str, message: &str) -> Result<(), TransportError>;

    /// Removes the prompt shown under `id`, if any.
    async fn dismiss(&self, id: &str) -> Result<(), TransportError>;
}
