//! Exercises the approval gate through a real turn: a destructive tool call
//! blocks the turn loop until `ApprovalCoordinator::respond` is called from
//! outside the turn, matching how an HTTP client resolves a pending
//! approval while the agent's turn is in flight.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use lace_core::compaction::CompactionRegistry;
use lace_core::config::RuntimeConfig;
use lace_core::model::{ApprovalDecision, EventPayload, Thread, ToolStatus};
use lace_core::storage::{Database, EventStore, ThreadStore};
use lace_core::tools::builtin::ShellTool;
use lace_core::{
    Agent, ApprovalCoordinator, EventBus, ModelMessage, ProviderAdapter, ProviderResponse,
    RequestedToolCall, StreamDelta, TokenUsage, ToolAdvertisement, ToolRegistry, TurnDeps,
};

struct ShellOnceProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl ProviderAdapter for ShellOnceProvider {
    fn name(&self) -> &str {
        "shell-once"
    }
    fn default_model(&self) -> &str {
        "shell-once-1"
    }
    fn context_window(&self) -> usize {
        10_000
    }
    fn max_completion_tokens(&self) -> usize {
        1_000
    }

    async fn create_response(
        &self,
        _messages: &[ModelMessage],
        _tools: &[ToolAdvertisement],
        deltas: tokio::sync::mpsc::UnboundedSender<StreamDelta>,
        _cancel: CancellationToken,
    ) -> anyhow::Result<ProviderResponse> {
        let _ = deltas.send(StreamDelta::Text("thinking".into()));
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(ProviderResponse {
                text: "running a command".into(),
                tool_calls: vec![RequestedToolCall {
                    id: "call_shell_1".into(),
                    name: "shell".into(),
                    arguments: serde_json::json!({"command": "echo hi"}),
                }],
                usage: TokenUsage {
                    prompt_tokens: 8,
                    completion_tokens: 4,
                },
            })
        } else {
            Ok(ProviderResponse {
                text: "all done".into(),
                tool_calls: vec![],
                usage: TokenUsage {
                    prompt_tokens: 8,
                    completion_tokens: 4,
                },
            })
        }
    }
}

#[tokio::test]
async fn destructive_tool_call_waits_for_external_approval() {
    let dir = TempDir::new().expect("tempdir");
    let db = Arc::new(Database::new(dir.path().join("lace.db")).expect("open db"));
    let thread_id = "lace_20250731_shl001".to_string();
    ThreadStore::new(&db)
        .save_thread(&Thread {
            id: thread_id.clone(),
            session_id: Some("sess_shell".into()),
            project_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            metadata: None,
        })
        .expect("save thread");

    let tools = Arc::new(ToolRegistry::new());
    tools.register(Arc::new(ShellTool)).await;

    let approval = Arc::new(ApprovalCoordinator::new(db.clone()));
    let deps = Arc::new(TurnDeps {
        db: db.clone(),
        provider: Arc::new(ShellOnceProvider {
            calls: AtomicUsize::new(0),
        }),
        tools,
        approval: approval.clone(),
        compaction: Arc::new(CompactionRegistry::with_builtins()),
        bus: Arc::new(EventBus::default()),
        config: RuntimeConfig::new(dir.path().to_path_buf()),
    });
    let agent = Arc::new(Agent::new(thread_id.clone(), Some("sess_shell".into()), None));

    let turn = {
        let agent = agent.clone();
        let deps = deps.clone();
        tokio::spawn(async move { agent.run_turn(&deps, "please run echo hi".into()).await })
    };

    // The turn is now blocked inside the approval wait; let it register
    // before responding from outside, the way an HTTP approval route would.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    approval.respond(&thread_id, "call_shell_1", ApprovalDecision::AllowOnce, None);

    turn.await.expect("join").expect("turn completes");

    let events = EventStore::new(&db);
    let raw = events.load_events(&thread_id).expect("load");
    let tags: Vec<&str> = raw.iter().map(|e| e.tag()).collect();
    assert_eq!(
        tags,
        vec![
            "USER_MESSAGE",
            "AGENT_MESSAGE",
            "TOOL_CALL",
            "TOOL_APPROVAL_REQUEST",
            "TOOL_APPROVAL_RESPONSE",
            "TOOL_RESULT",
            "AGENT_MESSAGE",
        ]
    );

    let result = raw
        .iter()
        .find_map(|e| match &e.payload {
            EventPayload::ToolResult { status, .. } => Some(*status),
            _ => None,
        })
        .expect("a tool result was recorded");
    assert_eq!(result, ToolStatus::Completed);
}

#[tokio::test]
async fn denied_tool_call_aborts_without_running_the_command() {
    let dir = TempDir::new().expect("tempdir");
    let db = Arc::new(Database::new(dir.path().join("lace.db")).expect("open db"));
    let thread_id = "lace_20250731_shl002".to_string();
    ThreadStore::new(&db)
        .save_thread(&Thread {
            id: thread_id.clone(),
            session_id: Some("sess_shell".into()),
            project_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            metadata: None,
        })
        .expect("save thread");

    let tools = Arc::new(ToolRegistry::new());
    tools.register(Arc::new(ShellTool)).await;

    let approval = Arc::new(ApprovalCoordinator::new(db.clone()));
    let deps = Arc::new(TurnDeps {
        db: db.clone(),
        provider: Arc::new(ShellOnceProvider {
            calls: AtomicUsize::new(0),
        }),
        tools,
        approval: approval.clone(),
        compaction: Arc::new(CompactionRegistry::with_builtins()),
        bus: Arc::new(EventBus::default()),
        config: RuntimeConfig::new(dir.path().to_path_buf()),
    });
    let agent = Arc::new(Agent::new(thread_id.clone(), Some("sess_shell".into()), None));

    let turn = {
        let agent = agent.clone();
        let deps = deps.clone();
        tokio::spawn(async move { agent.run_turn(&deps, "please run echo hi".into()).await })
    };

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    approval.respond(&thread_id, "call_shell_1", ApprovalDecision::Deny, Some("not now"));
    turn.await.expect("join").expect("turn completes");

    let events = EventStore::new(&db);
    let raw = events.load_events(&thread_id).expect("load");
    let result = raw
        .iter()
        .find_map(|e| match &e.payload {
            EventPayload::ToolResult { status, .. } => Some(*status),
            _ => None,
        })
        .expect("a tool result was recorded");
    assert_eq!(result, ToolStatus::Aborted);
}
