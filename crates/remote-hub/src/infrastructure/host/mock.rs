//! In-memory host capabilities for unit and integration testing.
//!
//! Allows tests to observe every outbound call and to inject notifications on
//! any channel, as if they came from a real device, without a host runtime.

use std::collections::{HashMap, HashSet};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{
    ListenerGuard, MessageBroker, Notification, Notifier, ServiceBus, Subscription,
    TransportError,
};

// ── Shared channel fan-out ────────────────────────────────────────────────────

struct Listener {
    tx: mpsc::UnboundedSender<Notification>,
    active: Arc<AtomicBool>,
}

/// Fan-out of injected messages to armed listeners, keyed by channel.
#[derive(Default)]
struct ChannelHub {
    listeners: Mutex<HashMap<String, Vec<Listener>>>,
    disarms: Arc<AtomicUsize>,
}

impl ChannelHub {
    fn register(&self, key: &str, channel: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicBool::new(true));
        self.listeners
            .lock()
            .expect("lock poisoned")
            .entry(key.to_string())
            .or_default()
            .push(Listener {
                tx,
                active: Arc::clone(&active),
            });

        let disarms = Arc::clone(&self.disarms);
        let guard = ListenerGuard::new(move || {
            active.store(false, Ordering::SeqCst);
            disarms.fetch_add(1, Ordering::SeqCst);
        });
        Subscription::new(channel, rx, guard)
    }

    fn deliver(&self, key: &str, channel: &str, body: &str) -> usize {
        let guard = self.listeners.lock().expect("lock poisoned");
        guard
            .get(key)
            .map(|listeners| {
                listeners
                    .iter()
                    .filter(|l| l.active.load(Ordering::SeqCst))
                    .filter(|l| l.tx.send(Notification::new(channel, body)).is_ok())
                    .count()
            })
            .unwrap_or(0)
    }

    fn active(&self, key: &str) -> usize {
        let guard = self.listeners.lock().expect("lock poisoned");
        guard
            .get(key)
            .map(|listeners| {
                listeners
                    .iter()
                    .filter(|l| l.active.load(Ordering::SeqCst))
                    .count()
            })
            .unwrap_or(0)
    }

    fn disarm_count(&self) -> usize {
        self.disarms.load(Ordering::SeqCst)
    }
}

fn state_key(entity_id: &str) -> String {
    format!("state_changed/{entity_id}")
}

// ── Service bus ───────────────────────────────────────────────────────────────

/// One recorded service call.
#[derive(Debug, Clone)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub data: Value,
    pub at: Instant,
}

impl ServiceCall {
    /// `domain.service`, e.g. `"esphome.tv_send"`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }
}

/// A mock implementation of [`ServiceBus`].
#[derive(Default)]
pub struct MockServiceBus {
    calls: Mutex<Vec<ServiceCall>>,
    failing_services: Mutex<HashSet<String>>,
    fail_subscriptions: AtomicBool,
    hub: ChannelHub,
}

impl MockServiceBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers a bus event to every armed listener of `event_type`.
    ///
    /// Returns the number of listeners that received it.
    pub fn emit_event(&self, event_type: &str, body: &str) -> usize {
        self.hub.deliver(event_type, event_type, body)
    }

    /// Delivers a state change of `entity_id` to every armed watcher.
    pub fn change_state(&self, entity_id: &str, old_state: &str, new_state: &str) -> usize {
        let body = json!({
            "entity_id": entity_id,
            "old_state": old_state,
            "new_state": new_state,
        })
        .to_string();
        self.hub.deliver(&state_key(entity_id), entity_id, &body)
    }

    /// Makes every later call to `service` fail.
    pub fn fail_service(&self, service: &str) {
        self.failing_services
            .lock()
            .expect("lock poisoned")
            .insert(service.to_string());
    }

    /// Makes every later subscription attempt fail.
    pub fn fail_subscriptions(&self) {
        self.fail_subscriptions.store(true, Ordering::SeqCst);
    }

    /// Returns a snapshot of all recorded calls, oldest first.
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().expect("lock poisoned").clone()
    }

    /// Returns the `domain.service` names of all recorded calls.
    pub fn call_names(&self) -> Vec<String> {
        self.calls().iter().map(ServiceCall::name).collect()
    }

    /// Number of armed listeners for a bus event type.
    pub fn active_event_listeners(&self, event_type: &str) -> usize {
        self.hub.active(event_type)
    }

    /// Number of armed watchers for an entity.
    pub fn active_state_watchers(&self, entity_id: &str) -> usize {
        self.hub.active(&state_key(entity_id))
    }

    /// Total number of listeners disarmed so far.
    pub fn disarm_count(&self) -> usize {
        self.hub.disarm_count()
    }

    fn subscription_failure(&self, channel: &str) -> Option<TransportError> {
        self.fail_subscriptions
            .load(Ordering::SeqCst)
            .then(|| TransportError::Subscribe {
                channel: channel.to_string(),
                reason: "mock subscription failure".to_string(),
            })
    }
}

#[async_trait]
impl ServiceBus for MockServiceBus {
    async fn call(&self, domain: &str, service: &str, data: Value) -> Result<(), TransportError> {
        self.calls.lock().expect("lock poisoned").push(ServiceCall {
            domain: domain.to_string(),
            service: service.to_string(),
            data,
            at: Instant::now(),
        });

        if self
            .failing_services
            .lock()
            .expect("lock poisoned")
            .contains(service)
        {
            return Err(TransportError::ServiceCall {
                domain: domain.to_string(),
                service: service.to_string(),
                reason: "mock service failure".to_string(),
            });
        }
        Ok(())
    }

    async fn subscribe_event(&self, event_type: &str) -> Result<Subscription, TransportError> {
        if let Some(err) = self.subscription_failure(event_type) {
            return Err(err);
        }
        Ok(self.hub.register(event_type, event_type))
    }

    async fn watch_state(&self, entity_id: &str) -> Result<Subscription, TransportError> {
        if let Some(err) = self.subscription_failure(entity_id) {
            return Err(err);
        }
        Ok(self.hub.register(&state_key(entity_id), entity_id))
    }
}

// ── Message broker ────────────────────────────────────────────────────────────

/// One recorded publish.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: String,
    pub at: Instant,
}

impl PublishedMessage {
    /// Decodes the payload as JSON, panicking if it is not.
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.payload).expect("published payload is JSON")
    }
}

/// A mock implementation of [`MessageBroker`].
#[derive(Default)]
pub struct MockBroker {
    published: Mutex<Vec<PublishedMessage>>,
    fail_publish: AtomicBool,
    hub: ChannelHub,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `body` on `topic` to every armed subscriber.
    pub fn inject(&self, topic: &str, body: &str) -> usize {
        self.hub.deliver(topic, topic, body)
    }

    /// Makes every later publish fail.
    pub fn fail_publishes(&self) {
        self.fail_publish.store(true, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().expect("lock poisoned").clone()
    }

    pub fn active_subscribers(&self, topic: &str) -> usize {
        self.hub.active(topic)
    }

    pub fn disarm_count(&self) -> usize {
        self.hub.disarm_count()
    }
}

#[async_trait]
impl MessageBroker for MockBroker {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::Publish {
                topic: topic.to_string(),
                reason: "mock publish failure".to_string(),
            });
        }
        self.published
            .lock()
            .expect("lock poisoned")
            .push(PublishedMessage {
                topic: topic.to_string(),
                payload: payload.to_string(),
                at: Instant::now(),
            });
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, TransportError> {
        Ok(self.hub.register(topic, topic))
    }
}

// ── Notifier ──────────────────────────────────────────────────────────────────

/// One recorded prompt operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptEvent {
    Show {
        id: String,
        title: String,
        message: String,
    },
    Dismiss {
        id: String,
    },
}

/// A mock implementation of [`Notifier`].
#[derive(Default)]
pub struct MockNotifier {
    events: Mutex<Vec<PromptEvent>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PromptEvent> {
        self.events.lock().expect("lock poisoned").clone()
    }

    /// Messages shown under `id`, oldest first.
    pub fn messages_for(&self, id: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PromptEvent::Show {
                    id: shown, message, ..
                } if shown == id => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Number of times `id` was dismissed.
    pub fn dismiss_count(&self, id: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, PromptEvent::Dismiss { id: d } if d == id))
            .count()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn show(&self, id: &str, title: &str, message: &str) -> Result<(), TransportError> {
        self.events
            .lock()
            .expect("lock poisoned")
            .push(PromptEvent::Show {
                id: id.to_string(),
                title: title.to_string(),
                message: message.to_string(),
            });
        Ok(())
    }

    async fn dismiss(&self, id: &str) -> Result<(), TransportError> {
        self.events
            .lock()
            .expect("lock poisoned")
            .push(PromptEvent::Dismiss { id: id.to_string() });
        Ok(())
    }
}
