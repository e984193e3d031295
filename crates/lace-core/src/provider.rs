//! Provider adapter contract (spec.md §6). The wire format of any given
//! upstream provider is explicitly out of scope; this module defines only
//! the trait and the minimal message/content types the rest of the core
//! needs to drive a turn. Shapes are trimmed down from `krusty-core`'s much
//! larger `ai::types` (web search/fetch, thinking, context-management
//! editing are provider-wire detail with no counterpart here).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::TokenUsage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: Role,
    pub content: String,
}

/// A tool call the provider asked to invoke, surfaced at the end of a
/// streamed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// A tool advertised to the provider for this request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolAdvertisement {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// One incremental delta from a streaming provider response.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    Text(String),
}

/// The assembled, terminal response once the provider has finished
/// streaming for this turn.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    pub tool_calls: Vec<RequestedToolCall>,
    pub usage: TokenUsage,
}

/// External collaborator contract an upstream AI provider satisfies
/// (spec.md §6). Implementations own the actual wire protocol; this crate
/// only depends on this trait.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;
    fn context_window(&self) -> usize;
    fn max_completion_tokens(&self) -> usize;

    /// Streams token deltas on `deltas`, returning the assembled terminal
    /// response once the provider finishes (or `cancel` fires).
    async fn create_response(
        &self,
        messages: &[ModelMessage],
        tools: &[ToolAdvertisement],
        deltas: tokio::sync::mpsc::UnboundedSender<StreamDelta>,
        cancel: tokio_util::sync::CancellationToken,
    ) -> anyhow::Result<ProviderResponse>;

    /// Estimate used by the compaction trigger when actual counts are
    /// unavailable (spec.md §4.4: 1 token ≈ 4 characters).
    fn estimate_tokens(&self, messages: &[ModelMessage]) -> usize {
        messages.iter().map(|m| m.content.len()).sum::<usize>() / 4
    }
}
