//! Learn-session primitives.
//!
//! A learn session is one attempt to capture one command name for one device.
//! It walks a fixed state machine:
//!
//! ```text
//! Idle ──► Prompting ──► Armed ──► Captured ──┐
//!                          │                  ├──► Cleanup ──► Idle
//!                          └─────► TimedOut ──┘
//! ```
//!
//! The captured code is delivered through a [`CaptureSlot`]: a promise that
//! resolves at most once.  Capture channels can deliver duplicates, and a
//! listener can fire after its session has already given up; the slot's
//! "already resolved" guard makes both harmless.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use super::command::CommandType;
use super::library::LearnedCode;

/// States of a single learn session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnState {
    /// No session in progress.
    Idle,
    /// The user-facing prompt has been shown.
    Prompting,
    /// The capture listener is armed and the device is in capture mode.
    Armed,
    /// A matching signal arrived.
    Captured,
    /// No matching signal arrived within the session timeout.
    TimedOut,
    /// Listener disarmed, capture mode ended, prompt dismissed.
    Cleanup,
}

impl LearnState {
    /// Returns `true` if the state machine allows moving from `self` to `next`.
    ///
    /// `Prompting`/`Armed → Cleanup` covers sessions that fail before a
    /// result (for example, the trigger call is rejected by the device).
    pub fn can_transition_to(self, next: LearnState) -> bool {
        use LearnState::{Armed, Captured, Cleanup, Idle, Prompting, TimedOut};
        matches!(
            (self, next),
            (Idle, Prompting)
                | (Prompting, Armed)
                | (Prompting, Cleanup)
                | (Armed, Captured)
                | (Armed, TimedOut)
                | (Armed, Cleanup)
                | (Captured, Cleanup)
                | (TimedOut, Cleanup)
                | (Cleanup, Idle)
        )
    }
}

/// How a learn session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Captured(LearnedCode),
    TimedOut,
    /// The session could not be armed or triggered.
    Failed(String),
}

/// Per-session parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnSession {
    pub device: String,
    pub command: String,
    pub command_type: CommandType,
    pub timeout: Duration,
    state: LearnState,
}

impl LearnSession {
    pub fn new(device: &str, command: &str, command_type: CommandType, timeout: Duration) -> Self {
        Self {
            device: device.to_string(),
            command: command.to_string(),
            command_type,
            timeout,
            state: LearnState::Idle,
        }
    }

    pub fn state(&self) -> LearnState {
        self.state
    }

    /// Moves to `next`, returning `false` (and staying put) if the move is not
    /// allowed.
    pub fn advance(&mut self, next: LearnState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }

    /// Stable prompt identifier for this session's device/command pair.
    pub fn notification_id(&self) -> String {
        notification_id(&self.device, &self.command)
    }
}

/// Builds the prompt identifier for a device/command pair.
///
/// The id is stable so a second prompt for the same pair replaces the first
/// rather than stacking next to it.
pub fn notification_id(device: &str, command: &str) -> String {
    format!("universal_remote_learn_{}_{}", slug(device), slug(command))
}

fn slug(text: &str) -> String {
    text.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

// ── Capture slot ──────────────────────────────────────────────────────────────

/// A promise that resolves at most once.
///
/// The listener side calls [`CaptureSlot::resolve`]; the session side awaits
/// the receiver returned by [`CaptureSlot::new`].  Once resolved or closed,
/// every further `resolve` is rejected and returns `false`.
#[derive(Debug)]
pub struct CaptureSlot<T = LearnedCode> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> CaptureSlot<T> {
    /// Creates a slot and the receiver the session waits on.
    pub fn new() -> (Arc<Self>, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Self {
            sender: Mutex::new(Some(tx)),
        });
        (slot, rx)
    }

    /// Delivers `value` if the slot is still open.
    ///
    /// Returns `true` only for the first accepted value.
    pub fn resolve(&self, value: T) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    /// Closes the slot without a value; later `resolve` calls are rejected.
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Returns `true` once the slot has been resolved or closed.
    pub fn is_settled(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions_are_allowed() {
        let path = [
            LearnState::Idle,
            LearnState::Prompting,
            LearnState::Armed,
            LearnState::Captured,
            LearnState::Cleanup,
            LearnState::Idle,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_timeout_path_transitions_are_allowed() {
        assert!(LearnState::Armed.can_transition_to(LearnState::TimedOut));
        assert!(LearnState::TimedOut.can_transition_to(LearnState::Cleanup));
    }

    #[test]
    fn test_skipping_cleanup_is_rejected() {
        assert!(!LearnState::Captured.can_transition_to(LearnState::Idle));
        assert!(!LearnState::TimedOut.can_transition_to(LearnState::Idle));
        assert!(!LearnState::Idle.can_transition_to(LearnState::Armed));
    }

    #[test]
    fn test_session_advance_refuses_invalid_move() {
        let mut session = LearnSession::new("tv", "power", CommandType::Ir, Duration::from_secs(5));

        assert!(!session.advance(LearnState::Captured));
        assert_eq!(session.state(), LearnState::Idle);
        assert!(session.advance(LearnState::Prompting));
        assert_eq!(session.state(), LearnState::Prompting);
    }

    #[test]
    fn test_notification_id_is_stable_and_slugged() {
        assert_eq!(
            notification_id("Living Room TV", "Vol+"),
            "universal_remote_learn_living_room_tv_vol_"
        );
        assert_eq!(notification_id("tv", "power"), notification_id("tv", "power"));
        assert_ne!(notification_id("tv", "power"), notification_id("tv", "mute"));
    }

    #[tokio::test]
    async fn test_capture_slot_first_result_wins() {
        // Arrange
        let (slot, rx) = CaptureSlot::<u32>::new();

        // Act
        let first = slot.resolve(1);
        let second = slot.resolve(2);

        // Assert
        assert!(first);
        assert!(!second, "duplicate delivery must be rejected");
        assert_eq!(rx.await.expect("value delivered"), 1);
    }

    #[test]
    fn test_capture_slot_receiver_pending_until_resolved() {
        let (slot, rx) = CaptureSlot::<&str>::new();
        let mut rx = tokio_test::task::spawn(rx);

        tokio_test::assert_pending!(rx.poll());
        assert!(slot.resolve("1,2,3"));

        assert!(rx.is_woken());
        assert_eq!(tokio_test::assert_ready_ok!(rx.poll()), "1,2,3");
    }

    #[tokio::test]
    async fn test_capture_slot_rejects_after_close() {
        let (slot, rx) = CaptureSlot::<u32>::new();

        slot.close();

        assert!(slot.is_settled());
        assert!(!slot.resolve(7));
        assert!(rx.await.is_err(), "closed slot delivers nothing");
    }

    #[test]
    fn test_capture_slot_rejects_when_receiver_dropped() {
        let (slot, rx) = CaptureSlot::<u32>::new();
        drop(rx);

        assert!(!slot.resolve(3));
        assert!(slot.is_settled());
    }
}
