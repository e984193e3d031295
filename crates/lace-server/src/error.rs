//! Unified error handling for the API, mirroring `krusty-server::error`'s
//! three-variant `AppError`.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;

use lace_core::{AgentError, CompactionError, StorageError, ToolError};

#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        (
            status,
            Json(ApiError {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ThreadNotFound(id) => AppError::NotFound(format!("thread not found: {id}")),
            StorageError::SessionNotFound(id) => {
                AppError::NotFound(format!("session not found: {id}"))
            }
            StorageError::TaskNotFound(id) => AppError::NotFound(format!("task not found: {id}")),
            StorageError::ProjectNotFound(id) => {
                AppError::NotFound(format!("project not found: {id}"))
            }
            StorageError::ParentThreadNotFound(id) => {
                AppError::BadRequest(format!("parent thread not found: {id}"))
            }
            other => {
                tracing::error!(error = %other, "storage error");
                AppError::Internal(other.to_string())
            }
        }
    }
}

impl From<AgentError> for AppError {
    fn from(err: AgentError) -> Self {
        tracing::error!(error = %err, "agent error");
        AppError::Internal(err.to_string())
    }
}

impl From<ToolError> for AppError {
    fn from(err: ToolError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<CompactionError> for AppError {
    fn from(err: CompactionError) -> Self {
        tracing::error!(error = %err, "compaction error");
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON error: {err}"))
    }
}
