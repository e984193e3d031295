//! Exercises a `new:<provider>/<model>` task assignment end to end: the
//! session manager resolves the provider, creates a delegate thread, and
//! actually runs a turn on it, rather than merely calling `spawn_delegate`
//! in isolation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use lace_core::bus::SubscriptionFilter;
use lace_core::compaction::CompactionRegistry;
use lace_core::config::RuntimeConfig;
use lace_core::model::{Session, SessionStatus, TaskPriority, Thread};
use lace_core::storage::{Database, SessionStore, ThreadStore};
use lace_core::tools::ToolRegistry;
use lace_core::{
    ApprovalCoordinator, EventBus, ModelMessage, ProviderAdapter, ProviderResolver,
    ProviderResponse, SessionManager, StreamDelta, TokenUsage, ToolAdvertisement,
};

struct EchoDelegateProvider;

#[async_trait]
impl ProviderAdapter for EchoDelegateProvider {
    fn name(&self) -> &str {
        "delegate-echo"
    }
    fn default_model(&self) -> &str {
        "delegate-echo-1"
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
        let _ = deltas.send(StreamDelta::Text("on it".into()));
        Ok(ProviderResponse {
            text: "delegate finished the task".into(),
            tool_calls: vec![],
            usage: TokenUsage {
                prompt_tokens: 3,
                completion_tokens: 5,
            },
        })
    }
}

struct OneModelResolver {
    resolved: Arc<AtomicUsize>,
}

impl ProviderResolver for OneModelResolver {
    fn resolve(&self, provider: &str, model: &str) -> Option<Arc<dyn ProviderAdapter>> {
        if provider == "delegate" && model == "echo-1" {
            self.resolved.fetch_add(1, Ordering::SeqCst);
            Some(Arc::new(EchoDelegateProvider))
        } else {
            None
        }
    }
}

#[tokio::test]
async fn spawn_assignee_runs_a_real_delegate_turn() {
    let dir = TempDir::new().expect("tempdir");
    let db = Arc::new(Database::new(dir.path().join("lace.db")).expect("open db"));
    SessionStore::new(&db)
        .save_session(&Session {
            id: "sess_delegate".into(),
            project_id: None,
            config: Default::default(),
            status: SessionStatus::Active,
            agent_thread_ids: vec![],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        })
        .expect("save session");
    ThreadStore::new(&db)
        .save_thread(&Thread {
            id: "lace_20250731_ppp001".into(),
            session_id: Some("sess_delegate".into()),
            project_id: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            metadata: None,
        })
        .expect("save creator thread");

    let bus = Arc::new(EventBus::default());
    // The delegate's turn publishes a streamed token scoped to its own
    // thread id; subscribing unscoped to that bus kind is how we learn
    // which thread the manager actually spawned.
    let mut token_sub = bus.subscribe(SubscriptionFilter {
        kinds: Some(["agent:token".to_string()].into_iter().collect()),
        ..Default::default()
    });

    let resolved = Arc::new(AtomicUsize::new(0));
    let manager = SessionManager::new(
        db.clone(),
        "sess_delegate",
        bus,
        Arc::new(OneModelResolver {
            resolved: resolved.clone(),
        }),
        Arc::new(ToolRegistry::new()),
        Arc::new(ApprovalCoordinator::new(db.clone())),
        Arc::new(CompactionRegistry::with_builtins()),
        RuntimeConfig::new(dir.path().to_path_buf()),
    );

    let task = manager
        .create_task(
            "investigate the flaky test".into(),
            "it fails intermittently in CI".into(),
            "look into the flaky test and report back".into(),
            TaskPriority::High,
            "new:delegate/echo-1".into(),
            "alice".into(),
            "lace_20250731_ppp001".into(),
            true,
        )
        .expect("create task");

    assert_eq!(task.assignee, "new:delegate/echo-1");
    assert_eq!(resolved.load(Ordering::SeqCst), 1, "resolver was consulted");

    let envelope = tokio::time::timeout(Duration::from_secs(2), token_sub.recv())
        .await
        .expect("delegate turn published a token within the wait budget")
        .expect("bus still open");
    let delegate_thread_id = envelope
        .scope
        .thread_id
        .clone()
        .expect("token envelope is thread-scoped");
    assert!(
        delegate_thread_id.starts_with("lace_20250731_ppp001."),
        "delegate thread id must be parent-prefixed under the creating thread, got {delegate_thread_id}"
    );

    let events = lace_core::storage::EventStore::new(&db);
    let mut raw = Vec::new();
    for _ in 0..50 {
        raw = events.load_events(&delegate_thread_id).expect("load events");
        if raw.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let tags: Vec<&str> = raw.iter().map(|e| e.tag()).collect();
    assert_eq!(tags, vec!["USER_MESSAGE", "AGENT_MESSAGE"]);

    let first_text = match &raw[0].payload {
        lace_core::model::EventPayload::UserMessage { text } => text.clone(),
        other => panic!("expected a USER_MESSAGE, got {other:?}"),
    };
    assert!(first_text.contains("look into the flaky test and report back"));
    assert!(first_text.starts_with("[lace:task-assigned]"));
}
