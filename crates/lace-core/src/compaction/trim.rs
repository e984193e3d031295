//! `trim-tool-results`: truncates long TOOL_RESULT text content, leaving
//! every other event untouched. Grounded on `krusty-core`'s
//! `agent::executor::truncate_output` line-budget approach.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CompactionResult;
use crate::model::{ContentBlock, Event, EventPayload};

use super::{CompactionCandidate, CompactionStrategy};

const TRUNCATION_MARKER: &str = "[results truncated to save space.]";
const DEFAULT_MAX_LINES: usize = 50;

pub struct TrimToolResultsStrategy {
    default_max_lines: usize,
}

impl Default for TrimToolResultsStrategy {
    fn default() -> Self {
        Self {
            default_max_lines: DEFAULT_MAX_LINES,
        }
    }
}

#[async_trait]
impl CompactionStrategy for TrimToolResultsStrategy {
    fn id(&self) -> &'static str {
        "trim-tool-results"
    }

    async fn compact(
        &self,
        events: &[Event],
        params: &Value,
    ) -> CompactionResult<CompactionCandidate> {
        let max_lines = params
            .get("maxLines")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(self.default_max_lines);

        let compacted_events = events
            .iter()
            .map(|event| match &event.payload {
                EventPayload::ToolResult {
                    call_id,
                    content,
                    status,
                    usage,
                } => {
                    let trimmed = content
                        .iter()
                        .map(|block| trim_block(block, max_lines))
                        .collect();
                    Event {
                        payload: EventPayload::ToolResult {
                            call_id: call_id.clone(),
                            content: trimmed,
                            status: *status,
                            usage: usage.clone(),
                        },
                        ..event.clone()
                    }
                }
                _ => event.clone(),
            })
            .collect();

        Ok(CompactionCandidate {
            strategy_id: self.id().to_string(),
            original_event_count: events.len(),
            compacted_events,
        })
    }
}

fn trim_block(block: &ContentBlock, max_lines: usize) -> ContentBlock {
    let ContentBlock::Text { text } = block else {
        return block.clone();
    };

    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines {
        return block.clone();
    }

    let mut truncated = lines[..max_lines].join("\n");
    truncated.push('\n');
    truncated.push_str(TRUNCATION_MARKER);
    ContentBlock::Text { text: truncated }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolStatus;
    use chrono::Utc;
    use serde_json::json;

    fn evt(payload: EventPayload) -> Event {
        Event {
            id: crate::ids::new_event_id(),
            thread_id: "t".into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    #[tokio::test]
    async fn trims_long_tool_result_preserving_identity_and_status() {
        let events = vec![
            evt(EventPayload::UserMessage { text: "ls".into() }),
            evt(EventPayload::ToolCall {
                call_id: "c1".into(),
                name: "ls".into(),
                arguments: json!({}),
            }),
            evt(EventPayload::ToolResult {
                call_id: "c1".into(),
                content: vec![ContentBlock::text(
                    "file1\nfile2\nfile3\nfile4\nfile5",
                )],
                status: ToolStatus::Completed,
                usage: None,
            }),
            evt(EventPayload::AgentMessage {
                text: "found 5".into(),
                usage: None,
            }),
        ];

        let strategy = TrimToolResultsStrategy::default();
        let candidate = strategy
            .compact(&events, &json!({"maxLines": 3}))
            .await
            .expect("compact");

        assert_eq!(candidate.original_event_count, 4);
        let EventPayload::ToolResult { content, status, call_id, .. } =
            &candidate.compacted_events[2].payload
        else {
            panic!("expected tool result at index 2");
        };
        assert_eq!(call_id, "c1");
        assert_eq!(*status, ToolStatus::Completed);
        assert_eq!(
            ContentBlock::join_text(content),
            "file1\nfile2\nfile3\n[results truncated to save space.]"
        );
    }

    #[tokio::test]
    async fn leaves_short_results_untouched() {
        let events = vec![evt(EventPayload::ToolResult {
            call_id: "c1".into(),
            content: vec![ContentBlock::text("a\nb")],
            status: ToolStatus::Completed,
            usage: None,
        })];
        let strategy = TrimToolResultsStrategy::default();
        let candidate = strategy
            .compact(&events, &json!({"maxLines": 3}))
            .await
            .expect("compact");
        assert_eq!(candidate.compacted_events[0].payload, events[0].payload);
    }
}
