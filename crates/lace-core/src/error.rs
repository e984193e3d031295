//! Error types for each core component, following `krusty-core`'s split: typed
//! `thiserror` enums at module boundaries, `anyhow` at call sites that
//! aggregate multiple failure sources.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("parent thread not found: {0}")]
    ParentThreadNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("persistence unavailable, running in degraded in-memory mode: {0}")]
    Degraded(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("unknown compaction strategy: {0}")]
    UnknownStrategy(String),

    #[error("provider error during summarization: {0}")]
    Provider(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type CompactionResult<T> = Result<T, CompactionError>;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("argument validation failed: {0}")]
    InvalidArguments(String),

    #[error("tool execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("tool handler failed: {0}")]
    HandlerFailed(String),
}

pub type ToolResult<T> = Result<T, ToolError>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("turn cancelled")]
    Cancelled,
}

pub type AgentResult<T> = Result<T, AgentError>;
