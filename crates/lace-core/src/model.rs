//! Domain types: events, threads, sessions, tasks, projects.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token usage attached to an AGENT_MESSAGE or TOOL_RESULT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Outcome status of a tool execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Completed,
    Failed,
    Aborted,
}

/// A decision on a TOOL_APPROVAL_REQUEST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalDecision {
    AllowOnce,
    AllowSession,
    Deny,
}

/// A content block within a TOOL_RESULT, mirroring the tool contract's
/// `{text, image, resource}` union (spec §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { media_type: String, data: String },
    Resource { uri: String, text: Option<String> },
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        ContentBlock::Text { text: s.into() }
    }

    /// Concatenates the textual representation of a content-block list,
    /// used by compaction strategies that work against display text.
    pub fn join_text(blocks: &[ContentBlock]) -> String {
        blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Resource { text, .. } => text.as_deref(),
                ContentBlock::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The tagged payload union for an [`Event`]. Serializes with a `tag` field
/// matching spec.md §3's event-tag vocabulary, dispatched explicitly rather
/// than through virtual methods (spec.md §9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag")]
pub enum EventPayload {
    #[serde(rename = "USER_MESSAGE")]
    UserMessage { text: String },

    #[serde(rename = "AGENT_MESSAGE")]
    AgentMessage {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },

    #[serde(rename = "TOOL_CALL")]
    ToolCall {
        call_id: String,
        name: String,
        arguments: Value,
    },

    #[serde(rename = "TOOL_RESULT")]
    ToolResult {
        call_id: String,
        content: Vec<ContentBlock>,
        status: ToolStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },

    #[serde(rename = "TOOL_APPROVAL_REQUEST")]
    ToolApprovalRequest { call_id: String },

    #[serde(rename = "TOOL_APPROVAL_RESPONSE")]
    ToolApprovalResponse {
        call_id: String,
        decision: ApprovalDecision,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    #[serde(rename = "LOCAL_SYSTEM_MESSAGE")]
    LocalSystemMessage { text: String },

    #[serde(rename = "SYSTEM_PROMPT")]
    SystemPrompt { text: String },

    #[serde(rename = "USER_SYSTEM_PROMPT")]
    UserSystemPrompt { text: String },

    #[serde(rename = "COMPACTION")]
    Compaction {
        strategy_id: String,
        original_event_count: usize,
        compacted_events: Vec<Event>,
    },

    /// A stored COMPACTION row whose payload did not validate against the
    /// schema above (spec.md §4.3 step 4, §9: "mutate TOOL_RESULT... in
    /// place" is the non-goal; a payload that fails to parse at all is the
    /// defensive case this variant exists for). Never constructed directly
    /// by strategies — only produced when rehydrating a row from storage.
    #[serde(skip)]
    MalformedCompaction { raw: Value },
}

impl EventPayload {
    /// The discriminator tag as it appears on the wire / in storage.
    pub fn tag(&self) -> &'static str {
        match self {
            EventPayload::UserMessage { .. } => "USER_MESSAGE",
            EventPayload::AgentMessage { .. } => "AGENT_MESSAGE",
            EventPayload::ToolCall { .. } => "TOOL_CALL",
            EventPayload::ToolResult { .. } => "TOOL_RESULT",
            EventPayload::ToolApprovalRequest { .. } => "TOOL_APPROVAL_REQUEST",
            EventPayload::ToolApprovalResponse { .. } => "TOOL_APPROVAL_RESPONSE",
            EventPayload::LocalSystemMessage { .. } => "LOCAL_SYSTEM_MESSAGE",
            EventPayload::SystemPrompt { .. } => "SYSTEM_PROMPT",
            EventPayload::UserSystemPrompt { .. } => "USER_SYSTEM_PROMPT",
            EventPayload::Compaction { .. } => "COMPACTION",
            EventPayload::MalformedCompaction { .. } => "COMPACTION",
        }
    }

    /// The call identifier carried by this payload, if it carries one at
    /// all (used for approval-response uniqueness and tool-result dedup).
    pub fn call_id(&self) -> Option<&str> {
        match self {
            EventPayload::ToolCall { call_id, .. }
            | EventPayload::ToolResult { call_id, .. }
            | EventPayload::ToolApprovalRequest { call_id }
            | EventPayload::ToolApprovalResponse { call_id, .. } => Some(call_id),
            _ => None,
        }
    }
}

/// An immutable, append-only record in a thread's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub thread_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn tag(&self) -> &'static str {
        self.payload.tag()
    }

    pub fn call_id(&self) -> Option<&str> {
        self.payload.call_id()
    }
}

/// A conversation container, owned by an optional session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub session_id: Option<String>,
    pub project_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Option<HashMap<String, Value>>,
}

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Archived,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project_id: Option<String>,
    pub config: HashMap<String, Value>,
    pub status: SessionStatus,
    /// Thread identifiers of the agents bound to this session.
    pub agent_thread_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

/// Parsed form of a task's `assignee` field (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignee {
    Agent(String),
    Human,
    Spawn { provider: String, model: String },
}

impl Assignee {
    pub fn parse(raw: &str) -> Self {
        if raw == "human" {
            return Assignee::Human;
        }
        if let Some(spec) = raw.strip_prefix("new:") {
            if let Some((provider, model)) = spec.split_once('/') {
                return Assignee::Spawn {
                    provider: provider.to_string(),
                    model: model.to_string(),
                };
            }
        }
        Assignee::Agent(raw.to_string())
    }

    pub fn as_str(&self) -> String {
        match self {
            Assignee::Agent(id) => id.clone(),
            Assignee::Human => "human".to_string(),
            Assignee::Spawn { provider, model } => format!("new:{provider}/{model}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNote {
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub prompt: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assignee: String,
    pub creator: String,
    pub thread_id: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub notes: Vec<TaskNote>,
}

/// Counts of tasks by status, as returned by the task manager's `summary`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSummary {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub blocked: usize,
}
