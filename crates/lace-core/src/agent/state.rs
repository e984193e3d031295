//! Per-thread Agent state machine (spec.md §4.7). States: `idle`,
//! `thinking`, `streaming`, `tool-waiting`, `tool-running`, `terminated`.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Idle,
    Thinking,
    Streaming,
    ToolWaiting,
    ToolRunning,
    Terminated,
}

/// A running Agent bound to one thread. Holds only in-process state; the
/// durable record of the conversation lives entirely in the event log.
pub struct Agent {
    pub thread_id: String,
    pub session_id: Option<String>,
    pub project_id: Option<String>,
    pub(super) status: Mutex<AgentStatus>,
    pub(super) inbox: Mutex<VecDeque<String>>,
    pub(super) current_turn: Mutex<Option<CancellationToken>>,
}

impl Agent {
    pub fn new(
        thread_id: impl Into<String>,
        session_id: Option<String>,
        project_id: Option<String>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            session_id,
            project_id,
            status: Mutex::new(AgentStatus::Idle),
            inbox: Mutex::new(VecDeque::new()),
            current_turn: Mutex::new(None),
        }
    }

    pub fn status(&self) -> AgentStatus {
        *self.status.lock()
    }

    pub fn is_idle(&self) -> bool {
        self.status() == AgentStatus::Idle
    }

    pub(super) fn set_status(&self, status: AgentStatus) {
        *self.status.lock() = status;
    }

    /// Queues a notification for delivery once this Agent next reaches
    /// `idle` (spec.md §4.8 "Notification delivery"). Ordering within the
    /// queue is FIFO.
    pub fn enqueue_notification(&self, text: impl Into<String>) {
        self.inbox.lock().push_back(text.into());
    }

    pub(super) fn pop_notification(&self) -> Option<String> {
        self.inbox.lock().pop_front()
    }

    /// Requests cancellation of the in-flight turn, if any. A no-op when
    /// the Agent is idle.
    pub fn cancel(&self) {
        if let Some(token) = self.current_turn.lock().as_ref() {
            token.cancel();
        }
    }

    pub fn terminate(&self) {
        self.cancel();
        self.set_status(AgentStatus::Terminated);
    }
}
