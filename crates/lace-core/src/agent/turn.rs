//! The turn loop (spec.md §4.7 steps 1-8), grounded on
//! `krusty-core::agent::executor`'s stream-then-tool-loop shape and
//! `loop_events.rs`'s `LoopEvent` vocabulary, generalized to this runtime's
//! event-sourced persistence instead of an in-memory message list.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::approval::ApprovalCoordinator;
use crate::bus::{Envelope, EventBus, Scope};
use crate::compaction::{self, CompactionRegistry};
use crate::config::RuntimeConfig;
use crate::conversation;
use crate::error::{AgentError, AgentResult};
use crate::model::{ContentBlock, Event, EventPayload};
use crate::provider::{ModelMessage, ProviderAdapter, Role, StreamDelta, ToolAdvertisement};
use crate::storage::{Database, EventStore};
use crate::tools::{ToolContext, ToolRegistry};

use super::state::{Agent, AgentStatus};

/// The collaborators a turn needs, bundled so `run_turn` takes one
/// argument instead of five. Owned by whatever wires up a session (the
/// server's `AppState`, or a test harness).
pub struct TurnDeps {
    pub db: Arc<Database>,
    pub provider: Arc<dyn ProviderAdapter>,
    pub tools: Arc<ToolRegistry>,
    pub approval: Arc<ApprovalCoordinator>,
    pub compaction: Arc<CompactionRegistry>,
    pub bus: Arc<EventBus>,
    pub config: RuntimeConfig,
}

impl Agent {
    /// Drives the turn loop for `user_text`, then drains any notifications
    /// queued while this Agent was busy, each as its own subsequent turn
    /// (spec.md §4.8 "Notification delivery": FIFO, processed on return to
    /// idle). Returns the outcome of the first cancellation encountered, if
    /// any; queued notifications are otherwise processed to completion even
    /// when an individual turn ends in a recorded failure.
    pub async fn run_turn(&self, deps: &TurnDeps, user_text: String) -> AgentResult<()> {
        let mut next = Some(user_text);
        loop {
            let Some(text) = next.take().or_else(|| self.pop_notification()) else {
                break;
            };

            let token = CancellationToken::new();
            *self.current_turn.lock() = Some(token.clone());
            let result = self.run_turn_once(deps, text, token).await;
            *self.current_turn.lock() = None;
            self.set_status(AgentStatus::Idle);

            if let Err(err) = result {
                tracing::warn!(thread_id = %self.thread_id, error = %err, "turn ended without completing");
                if matches!(err, AgentError::Cancelled) {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    async fn run_turn_once(
        &self,
        deps: &TurnDeps,
        user_text: String,
        cancel: CancellationToken,
    ) -> AgentResult<()> {
        let events = EventStore::new(&deps.db);
        events.save_event(&self.thread_id, EventPayload::UserMessage { text: user_text })?;

        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            self.maybe_compact(deps, &events, &cancel).await?;

            let raw = events.load_events(&self.thread_id)?;
            let working = conversation::working_conversation(&raw);
            let messages = to_model_messages(&working);
            let tool_advertisements = tool_advertisements(deps).await;

            self.set_status(AgentStatus::Thinking);
            let (delta_tx, mut delta_rx) = tokio::sync::mpsc::unbounded_channel();
            let bus = deps.bus.clone();
            let thread_id = self.thread_id.clone();
            let forward = tokio::spawn(async move {
                while let Some(StreamDelta::Text(text)) = delta_rx.recv().await {
                    // Transient only: token deltas are never persisted as
                    // Events (spec.md §4.7 step 4).
                    bus.publish(Envelope::new(
                        Scope::thread(thread_id.clone()),
                        "agent:token",
                        serde_json::json!({ "text": text }),
                        false,
                    ));
                }
            });

            self.set_status(AgentStatus::Streaming);
            let response = deps
                .provider
                .create_response(&messages, &tool_advertisements, delta_tx, cancel.clone())
                .await;
            let _ = forward.await;

            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let response = match response {
                Ok(response) => response,
                Err(err) => {
                    events.save_event(
                        &self.thread_id,
                        EventPayload::LocalSystemMessage {
                            text: format!("provider error: {err}"),
                        },
                    )?;
                    return Ok(());
                }
            };

            events.save_event(
                &self.thread_id,
                EventPayload::AgentMessage {
                    text: response.text,
                    usage: Some(response.usage),
                },
            )?;

            if response.tool_calls.is_empty() {
                return Ok(());
            }

            for call in response.tool_calls {
                if cancel.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }

                events.save_event(
                    &self.thread_id,
                    EventPayload::ToolCall {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                )?;

                self.set_status(AgentStatus::ToolWaiting);
                let ctx = ToolContext {
                    thread_id: self.thread_id.clone(),
                    session_id: self.session_id.clone(),
                    project_id: self.project_id.clone(),
                    cancellation: cancel.clone(),
                };
                self.set_status(AgentStatus::ToolRunning);
                let outcome = deps
                    .tools
                    .execute(&call.name, call.arguments, ctx, &call.id, &deps.approval)
                    .await;

                events.save_event(
                    &self.thread_id,
                    EventPayload::ToolResult {
                        call_id: call.id,
                        content: outcome.content,
                        status: outcome.status,
                        usage: None,
                    },
                )?;
            }
            // Loop to step 3: the next iteration re-reads the working
            // conversation including the TOOL_RESULTs just appended.
        }
    }

    async fn maybe_compact(
        &self,
        deps: &TurnDeps,
        events: &EventStore<'_>,
        cancel: &CancellationToken,
    ) -> AgentResult<()> {
        let raw = events.load_events(&self.thread_id)?;
        let used = compaction::estimate_tokens(&raw);
        if !compaction::should_compact(
            used,
            deps.provider.context_window(),
            deps.config.context_window_safety_margin,
        ) {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let candidate = deps
            .compaction
            .compact("trim-tool-results", &raw, &serde_json::json!({}))
            .await
            .map_err(|err| AgentError::Provider(err.to_string()))?;

        events.save_event(
            &self.thread_id,
            EventPayload::Compaction {
                strategy_id: candidate.strategy_id,
                original_event_count: candidate.original_event_count,
                compacted_events: candidate.compacted_events,
            },
        )?;
        Ok(())
    }
}

async fn tool_advertisements(deps: &TurnDeps) -> Vec<ToolAdvertisement> {
    deps.tools
        .list()
        .await
        .into_iter()
        .map(|decl| ToolAdvertisement {
            name: decl.name,
            description: decl.description,
            input_schema: decl.input_schema,
        })
        .collect()
}

fn to_model_messages(events: &[Event]) -> Vec<ModelMessage> {
    events
        .iter()
        .filter_map(|event| match &event.payload {
            EventPayload::UserMessage { text } => Some(ModelMessage {
                role: Role::User,
                content: text.clone(),
            }),
            EventPayload::AgentMessage { text, .. } => Some(ModelMessage {
                role: Role::Assistant,
                content: text.clone(),
            }),
            EventPayload::SystemPrompt { text } | EventPayload::UserSystemPrompt { text } => {
                Some(ModelMessage {
                    role: Role::System,
                    content: text.clone(),
                })
            }
            EventPayload::LocalSystemMessage { text } => Some(ModelMessage {
                role: Role::System,
                content: text.clone(),
            }),
            EventPayload::ToolResult { content, .. } => Some(ModelMessage {
                role: Role::Tool,
                content: ContentBlock::join_text(content),
            }),
            EventPayload::ToolCall { .. }
            | EventPayload::ToolApprovalRequest { .. }
            | EventPayload::ToolApprovalResponse { .. }
            | EventPayload::Compaction { .. }
            | EventPayload::MalformedCompaction { .. } => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RequestedToolCall, Thread, TokenUsage};
    use crate::storage::ThreadStore;
    use crate::tools::builtin::ReadFileTool;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct StubProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProviderAdapter for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }
        fn default_model(&self) -> &str {
            "stub-1"
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
        ) -> anyhow::Result<crate::provider::ProviderResponse> {
            let call_index = self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = deltas.send(StreamDelta::Text("hi".into()));
            if call_index == 0 {
                Ok(crate::provider::ProviderResponse {
                    text: "let me check".into(),
                    tool_calls: vec![RequestedToolCall {
                        id: "call_1".into(),
                        name: "read_file".into(),
                        arguments: serde_json::json!({"path": "/nonexistent-for-lace-turn-test"}),
                    }],
                    usage: TokenUsage {
                        prompt_tokens: 10,
                        completion_tokens: 5,
                    },
                })
            } else {
                Ok(crate::provider::ProviderResponse {
                    text: "done".into(),
                    tool_calls: vec![],
                    usage: TokenUsage {
                        prompt_tokens: 10,
                        completion_tokens: 5,
                    },
                })
            }
        }
    }

    async fn setup() -> (TurnDeps, Agent, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let db = Arc::new(Database::new(dir.path().join("lace.db")).expect("open db"));
        let thread_id = "lace_20250731_turn01".to_string();
        ThreadStore::new(&db)
            .save_thread(&Thread {
                id: thread_id.clone(),
                session_id: None,
                project_id: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                metadata: None,
            })
            .expect("save thread");

        let tools = Arc::new(ToolRegistry::new());
        tools.register(Arc::new(ReadFileTool)).await;

        let deps = TurnDeps {
            db: db.clone(),
            provider: Arc::new(StubProvider {
                calls: AtomicUsize::new(0),
            }),
            tools,
            approval: Arc::new(ApprovalCoordinator::new(db)),
            compaction: Arc::new(CompactionRegistry::with_builtins()),
            bus: Arc::new(EventBus::default()),
            config: RuntimeConfig::new(dir.path().to_path_buf()),
        };
        let agent = Agent::new(thread_id, None, None);
        (deps, agent, dir)
    }

    #[tokio::test]
    async fn runs_a_basic_turn_with_a_tool_call() {
        let (deps, agent, _dir) = setup().await;
        agent
            .run_turn(&deps, "please read that file".into())
            .await
            .expect("turn completes");

        let events = EventStore::new(&deps.db);
        let raw = events.load_events(&agent.thread_id).expect("load");
        let tags: Vec<&str> = raw.iter().map(|e| e.tag()).collect();
        assert_eq!(
            tags,
            vec![
                "USER_MESSAGE",
                "AGENT_MESSAGE",
                "TOOL_CALL",
                "TOOL_RESULT",
                "AGENT_MESSAGE",
            ]
        );
        assert!(agent.is_idle());
    }

    #[tokio::test]
    async fn queued_notification_runs_after_idle() {
        let (deps, agent, _dir) = setup().await;
        agent.enqueue_notification("a queued follow-up");
        agent
            .run_turn(&deps, "please read that file".into())
            .await
            .expect("turn completes");

        let events = EventStore::new(&deps.db);
        let raw = events.load_events(&agent.thread_id).expect("load");
        let user_messages: Vec<&str> = raw
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::UserMessage { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            user_messages,
            vec!["please read that file", "a queued follow-up"]
        );
    }
}
