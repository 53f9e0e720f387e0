//! Learning coordinator.
//!
//! Learns a batch of command names for one device, strictly one session at a
//! time.  Each session walks
//!
//! ```text
//! Idle → Prompting → Armed → (Captured | TimedOut) → Cleanup → Idle
//! ```
//!
//! 1. **Prompting** – show a prompt under a stable id derived from
//!    device + command, so a retry replaces the previous prompt.
//! 2. **Armed** – subscribe to the backend's capture channel, *then* put the
//!    receiver into capture mode.  Arming first closes the race where a fast
//!    receiver reports before anyone is listening.
//! 3. **Captured / TimedOut** – the first matching capture wins; otherwise the
//!    session gives up after its timeout and the batch moves on.
//! 4. **Cleanup** – runs exactly once per session on every path: disarm the
//!    listener, leave capture mode, dismiss the prompt.
//!
//! Each session runs on its own task.  Dropping the `learn` future abandons
//! the wait but not the cleanup: the session task notices and still releases
//! the listener, leaves capture mode and dismisses the prompt.
//!
//! The whole batch holds the store's document lock.  Captured codes are kept
//! in memory and merged into the library snapshot in a single `save` at the
//! end, so a timed-out name never leaves an entry behind.

use std::sync::Arc;
use std::time::Duration;

use remote_core::{
    CommandList, CommandType, LearnSession, LearnState, LearnedCode, SessionOutcome,
};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::infrastructure::backend::{ArmedCapture, Backend};
use crate::infrastructure::host::Notifier;
use crate::infrastructure::storage::{CodeStore, StorageError};

/// Session timeout when the caller does not supply one.
pub const DEFAULT_LEARN_TIMEOUT: Duration = Duration::from_secs(60);

const PROMPT_TITLE: &str = "Learn command";

const ABANDONED: &str = "learn abandoned";

/// What happened to each name in a learn batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LearnReport {
    pub learned: Vec<String>,
    pub timed_out: Vec<String>,
    /// Names whose session could not be armed or triggered, with the reason.
    pub failed: Vec<(String, String)>,
}

impl LearnReport {
    pub fn is_complete(&self) -> bool {
        self.timed_out.is_empty() && self.failed.is_empty()
    }
}

pub struct LearnCoordinator {
    runner: SessionRunner,
    store: Arc<dyn CodeStore>,
}

impl LearnCoordinator {
    pub fn new(
        backend: Arc<Backend>,
        store: Arc<dyn CodeStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            runner: SessionRunner { backend, notifier },
            store,
        }
    }

    /// Learns every name in `commands` for `device`, in order.
    ///
    /// # Errors
    ///
    /// Only storage failures are returned.  Timeouts and per-session transport
    /// failures are recorded in the [`LearnReport`] and the batch continues.
    /// When `save` fails, the codes captured by this batch are lost.
    pub async fn learn(
        &self,
        device: &str,
        commands: &CommandList,
        command_type: CommandType,
        timeout: Duration,
    ) -> Result<LearnReport, StorageError> {
        let _document = self.store.lock().await;
        let mut library = self.store.load().await?;

        let mut report = LearnReport::default();
        let mut captured: Vec<(String, LearnedCode)> = Vec::new();

        for command in commands {
            let session = LearnSession::new(device, command, command_type, timeout);
            match self.spawn_session(session).await {
                SessionOutcome::Captured(code) => {
                    info!(device, command = %command, "command learned");
                    report.learned.push(command.clone());
                    captured.push((command.clone(), code));
                }
                SessionOutcome::TimedOut => {
                    warn!(device, command = %command, timeout_secs = timeout.as_secs_f64(), "timed out waiting for a signal");
                    report.timed_out.push(command.clone());
                }
                SessionOutcome::Failed(reason) => {
                    warn!(device, command = %command, %reason, "learn session failed");
                    report.failed.push((command.clone(), reason));
                }
            }
        }

        if captured.is_empty() {
            debug!(device, store = %self.store.document_id(), "nothing captured, store left untouched");
            return Ok(report);
        }

        library.merge(device, captured);
        self.store.save(&library).await?;
        info!(
            device,
            learned = report.learned.len(),
            store = %self.store.document_id(),
            "learned commands saved"
        );
        Ok(report)
    }

    /// Runs one session on its own task and waits for it.
    ///
    /// The task holds the receiving half of `abandon`; if this future is
    /// dropped the sender goes with it and the session skips straight to
    /// cleanup.
    async fn spawn_session(&self, session: LearnSession) -> SessionOutcome {
        let (_abandon, abandoned) = oneshot::channel::<()>();
        let runner = self.runner.clone();
        match tokio::spawn(async move { runner.run(session, abandoned).await }).await {
            Ok(outcome) => outcome,
            Err(e) => SessionOutcome::Failed(format!("learn session aborted: {e}")),
        }
    }
}

/// What a single session needs, detached from the store so it can outlive
/// the batch that started it.
#[derive(Clone)]
struct SessionRunner {
    backend: Arc<Backend>,
    notifier: Arc<dyn Notifier>,
}

impl SessionRunner {
    async fn run(
        &self,
        mut session: LearnSession,
        mut abandoned: oneshot::Receiver<()>,
    ) -> SessionOutcome {
        let prompt_id = session.notification_id();
        session.advance(LearnState::Prompting);
        self.show_prompt(&prompt_id, &start_message(&session)).await;

        let mut armed: Option<ArmedCapture> = None;
        let outcome = tokio::select! {
            biased;
            _ = &mut abandoned => SessionOutcome::Failed(ABANDONED.to_string()),
            outcome = self.capture(&mut session, &mut armed) => outcome,
        };
        if matches!(&outcome, SessionOutcome::Failed(reason) if reason == ABANDONED) {
            debug!(device = %session.device, command = %session.command, "learn abandoned by caller");
        }

        session.advance(LearnState::Cleanup);
        self.cleanup(&session, &prompt_id, armed.as_mut()).await;
        if outcome == SessionOutcome::TimedOut {
            self.show_prompt(&prompt_id, &timeout_message(&session)).await;
        }
        session.advance(LearnState::Idle);

        outcome
    }

    async fn capture(
        &self,
        session: &mut LearnSession,
        armed: &mut Option<ArmedCapture>,
    ) -> SessionOutcome {
        let listener = match self.backend.arm_capture(session.command_type).await {
            Ok(listener) => armed.insert(listener),
            Err(e) => return SessionOutcome::Failed(e.to_string()),
        };
        session.advance(LearnState::Armed);
        debug!(
            device = %session.device,
            command = %session.command,
            channel = listener.channel(),
            "capture listener armed"
        );

        if let Err(e) = self.backend.trigger_learn_mode(session.command_type).await {
            return SessionOutcome::Failed(e.to_string());
        }

        match listener.wait(session.timeout).await {
            Some(code) => {
                session.advance(LearnState::Captured);
                SessionOutcome::Captured(code)
            }
            None => {
                session.advance(LearnState::TimedOut);
                SessionOutcome::TimedOut
            }
        }
    }

    /// Releases everything the session acquired.  Never fails; problems are
    /// logged.
    async fn cleanup(
        &self,
        session: &LearnSession,
        prompt_id: &str,
        armed: Option<&mut ArmedCapture>,
    ) {
        if let Some(listener) = armed {
            listener.disarm();
        }
        if let Err(e) = self.backend.end_learn_mode().await {
            warn!(device = %session.device, error = %e, "failed to leave learn mode");
        }
        if let Err(e) = self.notifier.dismiss(prompt_id).await {
            warn!(id = prompt_id, error = %e, "failed to dismiss learn prompt");
        }
    }

    async fn show_prompt(&self, id: &str, message: &str) {
        if let Err(e) = self.notifier.show(id, PROMPT_TITLE, message).await {
            warn!(id, error = %e, "failed to show learn prompt");
        }
    }
}

fn start_message(session: &LearnSession) -> String {
    format!(
        "Press the '{}' button for '{}' now. Waiting {} seconds for the {} signal.",
        session.command,
        session.device,
        session.timeout.as_secs(),
        session.command_type.as_str().to_uppercase()
    )
}

fn timeout_message(session: &LearnSession) -> String {
    format!(
        "No signal received for '{}' on '{}' within {} seconds.",
        session.command,
        session.device,
        session.timeout.as_secs()
    )
}
