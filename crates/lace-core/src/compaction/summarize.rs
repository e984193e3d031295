//! `summarize`: produces a short AGENT_MESSAGE summarising the prefix via a
//! provider adapter, preserving USER_MESSAGE and recent AGENT_MESSAGE events
//! verbatim while collapsing tool chatter.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{CompactionError, CompactionResult};
use crate::model::{ContentBlock, Event, EventPayload};
use crate::provider::{ModelMessage, ProviderAdapter, Role};

use super::{CompactionCandidate, CompactionStrategy};

const DEFAULT_KEEP_RECENT_AGENT_MESSAGES: usize = 2;

pub struct SummarizeStrategy {
    provider: Arc<dyn ProviderAdapter>,
}

impl SummarizeStrategy {
    pub fn new(provider: Arc<dyn ProviderAdapter>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl CompactionStrategy for SummarizeStrategy {
    fn id(&self) -> &'static str {
        "summarize"
    }

    async fn compact(
        &self,
        events: &[Event],
        params: &Value,
    ) -> CompactionResult<CompactionCandidate> {
        let keep_recent = params
            .get("keepRecentAgentMessages")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_KEEP_RECENT_AGENT_MESSAGES);

        let transcript = render_transcript(events);
        let prompt = vec![
            ModelMessage {
                role: Role::System,
                content: "Summarise the following conversation prefix in a few sentences, \
                          preserving any decisions or facts the assistant will need later."
                    .to_string(),
            },
            ModelMessage {
                role: Role::User,
                content: transcript,
            },
        ];

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let response = self
            .provider
            .create_response(&prompt, &[], tx, tokio_util::sync::CancellationToken::new())
            .await
            .map_err(|err| CompactionError::Provider(err.to_string()))?;

        let agent_message_indices: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e.payload, EventPayload::AgentMessage { .. }))
            .map(|(i, _)| i)
            .collect();
        let keep_from = agent_message_indices
            .len()
            .saturating_sub(keep_recent);
        let kept_agent_indices: std::collections::HashSet<usize> =
            agent_message_indices[keep_from..].iter().copied().collect();

        let mut compacted_events = Vec::new();
        compacted_events.push(Event {
            id: crate::ids::new_event_id(),
            thread_id: events
                .first()
                .map(|e| e.thread_id.clone())
                .unwrap_or_default(),
            timestamp: chrono::Utc::now(),
            payload: EventPayload::AgentMessage {
                text: response.text.clone(),
                usage: Some(response.usage.clone()),
            },
        });

        for (i, event) in events.iter().enumerate() {
            match &event.payload {
                EventPayload::UserMessage { .. } => compacted_events.push(event.clone()),
                EventPayload::AgentMessage { .. } if kept_agent_indices.contains(&i) => {
                    compacted_events.push(event.clone())
                }
                _ => {}
            }
        }

        Ok(CompactionCandidate {
            strategy_id: self.id().to_string(),
            original_event_count: events.len(),
            compacted_events,
        })
    }
}

fn render_transcript(events: &[Event]) -> String {
    events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::UserMessage { text } => Some(format!("user: {text}")),
            EventPayload::AgentMessage { text, .. } => Some(format!("assistant: {text}")),
            EventPayload::ToolResult { content, .. } => {
                Some(format!("tool: {}", ContentBlock::join_text(content)))
            }
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
