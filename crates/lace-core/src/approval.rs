//! Approval coordinator (spec.md §4.6): gates tool execution on an external
//! decision. Grounded on `krusty-server::routes::chat`'s `pending_approvals`
//! oneshot-channel map, pulled out of the server crate into core so both the
//! HTTP layer and any in-process caller can resolve a pending approval.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::model::{ApprovalDecision, EventPayload};
use crate::storage::{Database, EventStore};

const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(30);

struct PendingRequest {
    tx: oneshot::Sender<ApprovalDecision>,
    session_id: Option<String>,
    tool_name: String,
}

pub struct ApprovalCoordinator {
    db: Arc<Database>,
    pending: Mutex<HashMap<String, PendingRequest>>,
    /// Session-scoped auto-approval, process-local and never persisted
    /// (spec.md §9 Open Question 3, DESIGN.md).
    session_auto_approved: Mutex<HashMap<String, HashSet<String>>>,
    timeout: Duration,
}

impl ApprovalCoordinator {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            pending: Mutex::new(HashMap::new()),
            session_auto_approved: Mutex::new(HashMap::new()),
            timeout: DEFAULT_APPROVAL_TIMEOUT,
        }
    }

    pub fn with_timeout(db: Arc<Database>, timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::new(db)
        }
    }

    /// Runs the full request/wait protocol for one tool call. Always
    /// appends a TOOL_APPROVAL_REQUEST event first. If `tool_name` is
    /// already session-auto-approved, resolves immediately without
    /// waiting. Otherwise waits for a response, a timeout, or cancellation,
    /// whichever comes first — each collapses to `deny` except an explicit
    /// allow response.
    pub async fn request_approval(
        &self,
        thread_id: &str,
        session_id: Option<&str>,
        tool_name: &str,
        call_id: &str,
        cancel: CancellationToken,
    ) -> ApprovalDecision {
        let events = EventStore::new(&self.db);
        if let Err(err) = events.save_event(
            thread_id,
            EventPayload::ToolApprovalRequest {
                call_id: call_id.to_string(),
            },
        ) {
            tracing::error!(thread_id, call_id, error = %err, "failed to persist approval request");
        }

        if let Some(session_id) = session_id {
            if self.is_session_auto_approved(session_id, tool_name) {
                self.respond(thread_id, call_id, ApprovalDecision::AllowSession, None);
                return ApprovalDecision::AllowSession;
            }
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            call_id.to_string(),
            PendingRequest {
                tx,
                session_id: session_id.map(str::to_string),
                tool_name: tool_name.to_string(),
            },
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                self.respond(thread_id, call_id, ApprovalDecision::Deny, Some("cancelled"));
                ApprovalDecision::Deny
            }
            _ = tokio::time::sleep(self.timeout) => {
                self.respond(thread_id, call_id, ApprovalDecision::Deny, Some("timeout"));
                ApprovalDecision::Deny
            }
            result = rx => {
                result.unwrap_or(ApprovalDecision::Deny)
            }
        }
    }

    /// Called by a UI, human operator, or policy to answer a pending
    /// approval. Persists the decision via the unique-index defense
    /// (spec.md §4.1, §4.6); a duplicate write is a silent no-op, matching
    /// `addEvent`'s null-sentinel semantics.
    pub fn respond(
        &self,
        thread_id: &str,
        call_id: &str,
        decision: ApprovalDecision,
        reason: Option<&str>,
    ) -> Option<()> {
        let events = EventStore::new(&self.db);
        let written = events
            .save_event(
                thread_id,
                EventPayload::ToolApprovalResponse {
                    call_id: call_id.to_string(),
                    decision,
                    reason: reason.map(str::to_string),
                },
            )
            .ok()??;
        let _ = written;

        let pending = self.pending.lock().remove(call_id);
        if let Some(pending) = pending {
            if decision == ApprovalDecision::AllowSession {
                if let Some(session_id) = &pending.session_id {
                    self.session_auto_approved
                        .lock()
                        .entry(session_id.clone())
                        .or_default()
                        .insert(pending.tool_name.clone());
                }
            }
            let _ = pending.tx.send(decision);
        }
        Some(())
    }

    fn is_session_auto_approved(&self, session_id: &str, tool_name: &str) -> bool {
        self.session_auto_approved
            .lock()
            .get(session_id)
            .map(|tools| tools.contains(tool_name))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ThreadStore;
    use chrono::Utc;
    use tempfile::TempDir;

    fn setup() -> (Arc<Database>, TempDir, String) {
        let dir = TempDir::new().expect("tempdir");
        let db = Arc::new(Database::new(dir.path().join("lace.db")).expect("open db"));
        let thread_id = "lace_20250731_app001".to_string();
        ThreadStore::new(&db)
            .save_thread(&crate::model::Thread {
                id: thread_id.clone(),
                session_id: Some("sess_1".into()),
                project_id: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                metadata: None,
            })
            .expect("save thread");
        (db, dir, thread_id)
    }

    #[tokio::test]
    async fn allow_once_unblocks_waiter() {
        let (db, _dir, thread_id) = setup();
        let coordinator = Arc::new(ApprovalCoordinator::new(db));

        let waiter = {
            let coordinator = coordinator.clone();
            let thread_id = thread_id.clone();
            tokio::spawn(async move {
                coordinator
                    .request_approval(&thread_id, None, "shell", "call_1", CancellationToken::new())
                    .await
            })
        };

        // Give the waiter a moment to register before responding.
        tokio::task::yield_now().await;
        coordinator.respond(&thread_id, "call_1", ApprovalDecision::AllowOnce, None);

        let decision = waiter.await.expect("join");
        assert_eq!(decision, ApprovalDecision::AllowOnce);
    }

    #[tokio::test]
    async fn duplicate_response_is_noop() {
        let (db, _dir, thread_id) = setup();
        let coordinator = ApprovalCoordinator::new(db);
        let events = EventStore::new(&coordinator.db);
        events
            .save_event(
                &thread_id,
                EventPayload::ToolApprovalRequest {
                    call_id: "call_3".into(),
                },
            )
            .expect("save request");

        let first = coordinator.respond(&thread_id, "call_3", ApprovalDecision::Deny, None);
        assert!(first.is_some());
        let second = coordinator.respond(&thread_id, "call_3", ApprovalDecision::AllowOnce, None);
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn session_auto_approval_shortcuts_subsequent_waits() {
        let (db, _dir, thread_id) = setup();
        let coordinator = Arc::new(ApprovalCoordinator::new(db));

        let waiter = {
            let coordinator = coordinator.clone();
            let thread_id = thread_id.clone();
            tokio::spawn(async move {
                coordinator
                    .request_approval(
                        &thread_id,
                        Some("sess_1"),
                        "shell",
                        "call_4",
                        CancellationToken::new(),
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;
        coordinator.respond(&thread_id, "call_4", ApprovalDecision::AllowSession, None);
        assert_eq!(waiter.await.expect("join"), ApprovalDecision::AllowSession);

        // A second call for the same tool name in the same session should
        // shortcut without needing a response.
        let decision = coordinator
            .request_approval(
                &thread_id,
                Some("sess_1"),
                "shell",
                "call_5",
                CancellationToken::new(),
            )
            .await;
        assert_eq!(decision, ApprovalDecision::AllowSession);
    }
}
