//! Core of the multi-agent orchestration runtime: the event-sourced thread
//! store, conversation builder, compaction engine, tool executor, approval
//! coordinator, Agent state machine, session/task manager, and event bus.
//! External interfaces (HTTP/SSE, CLI) live in sibling crates.

pub mod agent;
pub mod approval;
pub mod bus;
pub mod compaction;
pub mod config;
pub mod conversation;
pub mod error;
pub mod ids;
pub mod model;
pub mod provider;
pub mod session_manager;
pub mod storage;
pub mod tools;

pub use agent::{Agent, AgentStatus, TurnDeps};
pub use approval::ApprovalCoordinator;
pub use bus::{Envelope, EventBus, Scope, ScopeFilter, SubscriptionFilter};
pub use compaction::{CompactionCandidate, CompactionRegistry, CompactionStrategy};
pub use config::RuntimeConfig;
pub use error::{AgentError, CompactionError, StorageError, ToolError};
pub use model::{
    ApprovalDecision, Assignee, ContentBlock, Event, EventPayload, Project, Session,
    SessionStatus, Task, TaskNote, TaskPriority, TaskStatus, TaskSummary, Thread, TokenUsage,
    ToolStatus,
};
pub use provider::{
    ModelMessage, ProviderAdapter, ProviderResponse, RequestedToolCall, Role, StreamDelta,
    ToolAdvertisement,
};
pub use session_manager::{ProviderResolver, SessionManager};
pub use storage::Database;
pub use tools::{Tool, ToolAnnotations, ToolContext, ToolOutcome, ToolRegistry};
