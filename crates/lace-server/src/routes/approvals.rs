//! Approval request/response routes (spec.md §4.6), grounded on
//! `krusty-server::routes::chat`'s `/tool-approval` endpoint.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use lace_core::ApprovalDecision;

use crate::error::AppError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/:call_id", post(respond))
}

#[derive(Debug, Deserialize)]
pub struct ApprovalResponseRequest {
    pub thread_id: String,
    pub decision: ApprovalDecision,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApprovalResponseAck {
    pub status: &'static str,
}

async fn respond(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(req): Json<ApprovalResponseRequest>,
) -> Result<Json<ApprovalResponseAck>, AppError> {
    state
        .approval
        .respond(&req.thread_id, &call_id, req.decision, req.reason.as_deref())
        .ok_or_else(|| AppError::NotFound(format!("no pending approval for call {call_id}")))?;

    Ok(Json(ApprovalResponseAck { status: "ok" }))
}
