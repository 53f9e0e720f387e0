//! Integration tests for the learn pipeline.
//!
//! These tests exercise `RemoteEntity` end-to-end over the mock host
//! capabilities and a real JSON code store in a temporary directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use remote_core::{notification_id, LearnedCode, OneOrMany};
use remote_hub::application::learn_command::LearnReport;
use remote_hub::application::remote_entity::{HostCapabilities, LearnCommandRequest, RemoteEntity};
use remote_hub::application::RemoteError;
use remote_hub::infrastructure::backend::{
    Backend, BackendKind, FirmwareCapture, FirmwareServiceBackend,
};
use remote_hub::infrastructure::host::mock::{MockBroker, MockNotifier, MockServiceBus};
use remote_hub::infrastructure::storage::{
    CaptureChannel, CodeStore, HubSettings, JsonCodeStore, MemoryCodeStore, RemoteConfig,
    StoreLocks,
};
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

// ── Helpers ───────────────────────────────────────────────────────────────────

const TV_EVENT: &str = "esphome.livingroom_tv_learned_ir";

struct Hub {
    bus: Arc<MockServiceBus>,
    broker: Arc<MockBroker>,
    notifier: Arc<MockNotifier>,
    settings: HubSettings,
    locks: StoreLocks,
}

impl Hub {
    fn new() -> Self {
        let settings = HubSettings {
            storage_dir: std::env::temp_dir().join(format!("remote_hub_it_{}", Uuid::new_v4())),
            ..HubSettings::default()
        };
        Self {
            bus: Arc::new(MockServiceBus::new()),
            broker: Arc::new(MockBroker::new()),
            notifier: Arc::new(MockNotifier::new()),
            settings,
            locks: StoreLocks::new(),
        }
    }

    fn caps(&self) -> HostCapabilities {
        HostCapabilities {
            bus: self.bus.clone(),
            broker: Some(self.broker.clone()),
            notifier: self.notifier.clone(),
        }
    }

    fn firmware_remote(&self, name: &str, device: &str) -> RemoteEntity {
        let config = RemoteConfig {
            name: name.to_string(),
            backend: BackendKind::Firmware,
            device: Some(device.to_string()),
            capture: CaptureChannel::Event,
            status_sensor: None,
            mqtt_topic: None,
            indicator: None,
        };
        RemoteEntity::from_config(&config, &self.settings, &self.caps(), &self.locks)
            .expect("valid remote")
    }

    fn store(&self, identity: &str) -> JsonCodeStore {
        JsonCodeStore::new(&self.settings.storage_dir, identity, self.locks.clone())
    }

    fn storage_dir(&self) -> PathBuf {
        self.settings.storage_dir.clone()
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        std::fs::remove_dir_all(self.storage_dir()).ok();
    }
}

fn learn_request(device: &str, commands: &[&str], timeout_secs: f64) -> LearnCommandRequest {
    let command = match commands {
        [single] => OneOrMany::One(single.to_string()),
        many => OneOrMany::Many(many.iter().map(|c| c.to_string()).collect()),
    };
    LearnCommandRequest {
        device: Some(device.to_string()),
        command: Some(command),
        command_type: Some("ir".to_string()),
        timeout_secs: Some(timeout_secs),
    }
}

/// For each body in turn: waits until a listener is armed for `event`, waits
/// `after`, emits the body, then waits for that listener to be released.
fn answer_each_session(
    bus: Arc<MockServiceBus>,
    event: &'static str,
    after: Duration,
    bodies: Vec<&'static str>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        for body in bodies {
            while bus.active_event_listeners(event) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            tokio::time::sleep(after).await;
            bus.emit_event(event, body);
            while bus.active_event_listeners(event) > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    })
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_learn_stores_normalised_code_captured_after_two_seconds() {
    // Arrange
    let hub = Hub::new();
    let remote = hub.firmware_remote("Living room", "livingroom_tv");
    answer_each_session(
        hub.bus.clone(),
        TV_EVENT,
        Duration::from_secs(2),
        vec![r#"{"code":"308,166,...ः"}"#],
    );

    // Act
    let report = remote
        .learn_command(&learn_request("livingroom_tv", &["power"], 5.0))
        .await;

    // Assert
    let report = assert_ok!(report);
    assert_eq!(report.learned, vec!["power"]);
    let library = assert_ok!(hub.store("livingroom_tv").load().await);
    assert_eq!(
        library.get("livingroom_tv", "power"),
        Some(&LearnedCode::from("308,166,..."))
    );
}

#[tokio::test(start_paused = true)]
async fn test_learn_timeout_leaves_no_entry_and_shows_timeout_message() {
    // Arrange
    let hub = Hub::new();
    let remote = hub.firmware_remote("Living room", "livingroom_tv");

    // Act
    let report = remote
        .learn_command(&learn_request("livingroom_tv", &["power"], 5.0))
        .await
        .expect("timeouts are not errors");

    // Assert
    assert_eq!(report.timed_out, vec!["power"]);
    let library = hub.store("livingroom_tv").load().await.expect("load");
    assert_eq!(library.get("livingroom_tv", "power"), None);
    assert!(!library.has_device("livingroom_tv"), "no partial entry is written");

    let id = notification_id("livingroom_tv", "power");
    let messages = hub.notifier.messages_for(&id);
    assert_eq!(messages.len(), 2);
    assert!(messages[1].contains("No signal received"));
}

#[tokio::test(start_paused = true)]
async fn test_learn_batch_merges_with_existing_entries() {
    // Arrange
    let hub = Hub::new();
    let store = hub.store("livingroom_tv");
    let mut existing = remote_core::DeviceCommandLibrary::new();
    existing.insert("livingroom_tv", "input", LearnedCode::from("7,7,7"));
    existing.insert("soundbar", "power", LearnedCode::from("8,8,8"));
    store.save(&existing).await.expect("seed");

    let remote = hub.firmware_remote("Living room", "livingroom_tv");
    answer_each_session(
        hub.bus.clone(),
        TV_EVENT,
        Duration::from_millis(100),
        vec![r#"{"code":"1,1"}"#, r#"{"code":"2,2"}"#],
    );

    // Act
    let report = remote
        .learn_command(&learn_request("livingroom_tv", &["power", "mute"], 5.0))
        .await
        .expect("learn");

    // Assert
    assert_eq!(report.learned, vec!["power", "mute"]);
    let library = store.load().await.expect("load");
    assert_eq!(library.commands("livingroom_tv"), vec!["input", "mute", "power"]);
    assert_eq!(library.get("livingroom_tv", "power"), Some(&LearnedCode::from("1,1")));
    assert_eq!(library.get("livingroom_tv", "mute"), Some(&LearnedCode::from("2,2")));
    assert_eq!(library.get("soundbar", "power"), Some(&LearnedCode::from("8,8,8")));
}

#[tokio::test(start_paused = true)]
async fn test_partial_batch_saves_only_captured_names() {
    let hub = Hub::new();
    let remote = hub.firmware_remote("Living room", "livingroom_tv");
    // Only the first session gets an answer.
    answer_each_session(
        hub.bus.clone(),
        TV_EVENT,
        Duration::from_millis(100),
        vec![r#"{"code":"1,1"}"#],
    );

    let report = remote
        .learn_command(&learn_request("livingroom_tv", &["power", "mute"], 3.0))
        .await
        .expect("learn");

    assert_eq!(
        report,
        LearnReport {
            learned: vec!["power".into()],
            timed_out: vec!["mute".into()],
            failed: vec![],
        }
    );
    let library = hub.store("livingroom_tv").load().await.expect("load");
    assert_eq!(library.commands("livingroom_tv"), vec!["power"]);
}

// ── Cleanup and listener hygiene ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_cleanup_runs_once_per_session_on_both_paths() {
    // Arrange
    let hub = Hub::new();
    let remote = hub.firmware_remote("Living room", "livingroom_tv");
    answer_each_session(
        hub.bus.clone(),
        TV_EVENT,
        Duration::from_millis(100),
        vec![r#"{"code":"1,1"}"#],
    );

    // Act: first name is captured, second times out.
    remote
        .learn_command(&learn_request("livingroom_tv", &["power", "mute"], 2.0))
        .await
        .expect("learn");

    // Assert
    assert_eq!(hub.bus.disarm_count(), 2);
    assert_eq!(hub.bus.active_event_listeners(TV_EVENT), 0);
    for command in ["power", "mute"] {
        assert_eq!(
            hub.notifier.dismiss_count(&notification_id("livingroom_tv", command)),
            1,
            "prompt for {command} dismissed exactly once"
        );
    }
    let names = hub.bus.call_names();
    let count = |service: &str| names.iter().filter(|n| n.ends_with(service)).count();
    assert_eq!(count("_learning_started"), 2);
    assert_eq!(count("_learning_ended"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_and_malformed_notifications_are_harmless() {
    // Arrange
    let hub = Hub::new();
    let remote = hub.firmware_remote("Living room", "livingroom_tv");
    let bus = hub.bus.clone();
    tokio::spawn(async move {
        while bus.active_event_listeners(TV_EVENT) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        bus.emit_event(TV_EVENT, "not json at all");
        bus.emit_event(TV_EVENT, r#"{"code":"1,2","command_type":"rf"}"#);
        bus.emit_event(TV_EVENT, r#"{"code":"first"}"#);
        bus.emit_event(TV_EVENT, r#"{"code":"second"}"#);
    });

    // Act
    let report = remote
        .learn_command(&learn_request("livingroom_tv", &["power"], 5.0))
        .await
        .expect("learn");

    // Assert
    assert_eq!(report.learned, vec!["power"]);
    let library = hub.store("livingroom_tv").load().await.expect("load");
    assert_eq!(library.get("livingroom_tv", "power"), Some(&LearnedCode::from("first")));
    assert_eq!(
        hub.bus.emit_event(TV_EVENT, r#"{"code":"late"}"#),
        0,
        "no listener survives the session"
    );
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_learn_releases_listener_and_leaves_learn_mode() {
    // Arrange
    let hub = Hub::new();
    let remote = hub.firmware_remote("Living room", "livingroom_tv");

    // Act
    let abandoned = tokio::time::timeout(
        Duration::from_secs(1),
        remote.learn_command(&learn_request("livingroom_tv", &["power"], 30.0)),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Assert
    assert_err!(abandoned);
    assert_eq!(hub.bus.active_event_listeners(TV_EVENT), 0);
    let ended = hub
        .bus
        .call_names()
        .into_iter()
        .filter(|name| name == "esphome.livingroom_tv_learning_ended")
        .count();
    assert_eq!(ended, 1);
    assert_eq!(
        hub.notifier
            .dismiss_count(&notification_id("livingroom_tv", "power")),
        1
    );
}

// ── Status-sensor capture ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_status_sensor_capture_ignores_unchanged_and_unavailable_states() {
    // Arrange
    let hub = Hub::new();
    let config = RemoteConfig {
        name: "Bedroom".to_string(),
        backend: BackendKind::Firmware,
        device: Some("bedroom_ir".to_string()),
        capture: CaptureChannel::Status,
        status_sensor: Some("sensor.bedroom_ir_code".to_string()),
        mqtt_topic: None,
        indicator: None,
    };
    let remote = RemoteEntity::from_config(&config, &hub.settings, &hub.caps(), &hub.locks)
        .expect("valid remote");
    let bus = hub.bus.clone();
    tokio::spawn(async move {
        while bus.active_state_watchers("sensor.bedroom_ir_code") == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        bus.change_state("sensor.bedroom_ir_code", "9,9", "9,9");
        bus.change_state("sensor.bedroom_ir_code", "9,9", "unavailable");
        bus.change_state("sensor.bedroom_ir_code", "unavailable", "4,5,6 ");
    });

    // Act
    let report = remote
        .learn_command(&learn_request("bedroom_ir", &["light"], 5.0))
        .await
        .expect("learn");

    // Assert
    assert_eq!(report.learned, vec!["light"]);
    let library = hub.store("bedroom_ir").load().await.expect("load");
    assert_eq!(library.get("bedroom_ir", "light"), Some(&LearnedCode::from("4,5,6")));
}

// ── Concurrency ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_batches_on_same_document_do_not_lose_updates() {
    // Arrange: two entities backed by the same device document.
    let hub = Hub::new();
    let first = Arc::new(hub.firmware_remote("Living room A", "livingroom_tv"));
    let second = Arc::new(hub.firmware_remote("Living room B", "livingroom_tv"));
    answer_each_session(
        hub.bus.clone(),
        TV_EVENT,
        Duration::from_millis(20),
        vec![r#"{"code":"1,1"}"#, r#"{"code":"2,2"}"#],
    );

    // Act
    let a = tokio::spawn({
        let remote = Arc::clone(&first);
        async move {
            remote
                .learn_command(&learn_request("livingroom_tv", &["power"], 5.0))
                .await
        }
    });
    let b = tokio::spawn({
        let remote = Arc::clone(&second);
        async move {
            remote
                .learn_command(&learn_request("livingroom_tv", &["mute"], 5.0))
                .await
        }
    });
    let (a, b) = (a.await.expect("join"), b.await.expect("join"));

    // Assert
    assert_eq!(a.expect("learn").learned.len(), 1);
    assert_eq!(b.expect("learn").learned.len(), 1);
    let library = hub.store("livingroom_tv").load().await.expect("load");
    assert_eq!(library.commands("livingroom_tv"), vec!["mute", "power"]);
}

// ── Failures ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_save_failure_surfaces_as_storage_error() {
    // Arrange
    let bus = Arc::new(MockServiceBus::new());
    let store = Arc::new(MemoryCodeStore::new("livingroom_tv"));
    store.fail_saves();
    let backend = Backend::Firmware(FirmwareServiceBackend::new(
        bus.clone(),
        "esphome",
        "livingroom_tv",
        FirmwareCapture::Event,
    ));
    let remote = RemoteEntity::new(
        "Living room",
        backend,
        store.clone(),
        Arc::new(MockNotifier::new()),
        Duration::from_secs(60),
    );
    answer_each_session(bus, TV_EVENT, Duration::ZERO, vec![r#"{"code":"1,1"}"#]);

    // Act
    let result = remote
        .learn_command(&learn_request("livingroom_tv", &["power"], 5.0))
        .await;

    // Assert
    assert!(matches!(result, Err(RemoteError::Storage(_))));
    assert!(store.snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_device_is_logged_no_op() {
    let hub = Hub::new();
    let remote = hub.firmware_remote("Living room", "livingroom_tv");
    let request = LearnCommandRequest {
        device: None,
        ..learn_request("livingroom_tv", &["power"], 5.0)
    };

    let report = remote.learn_command(&request).await.expect("no-op");

    assert_eq!(report, LearnReport::default());
    assert!(hub.bus.calls().is_empty());
    assert!(hub.notifier.events().is_empty());
}
