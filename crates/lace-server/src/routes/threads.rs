//! Thread and event HTTP CRUD (spec.md §4.2/§4.7), grounded on
//! `krusty-server::routes::chat`'s route shape: a handler that sets up
//! context, then hands the actual turn off to a spawned background task so
//! the HTTP response doesn't block on the full agentic loop.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use lace_core::agent::{dangling_tool_call, resume_thread};
use lace_core::storage::{EventStore, ThreadStore};
use lace_core::{conversation, Agent, Event, Thread};

use crate::error::AppError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_thread))
        .route("/:thread_id", get(get_thread))
        .route("/:thread_id/events", get(list_events))
        .route("/:thread_id/messages", post(post_message))
        .route("/:thread_id/cancel", post(cancel_turn))
}

#[derive(Debug, Deserialize)]
pub struct CreateThreadRequest {
    pub session_id: Option<String>,
    pub project_id: Option<String>,
    /// A delegate's creator thread. When present, the new thread's id is
    /// `<parent>.<next integer>` and it inherits the parent's session and
    /// project rather than `session_id`/`project_id` above (spec.md §4.2).
    pub parent: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ThreadResponse {
    pub thread: Thread,
}

async fn create_thread(
    State(state): State<AppState>,
    Json(req): Json<CreateThreadRequest>,
) -> Result<Json<ThreadResponse>, AppError> {
    let thread = ThreadStore::new(&state.db).create_thread(
        req.parent.as_deref(),
        req.session_id,
        req.project_id,
    )?;

    let agent = Arc::new(Agent::new(
        thread.id.clone(),
        thread.session_id.clone(),
        thread.project_id.clone(),
    ));
    state.register_agent(agent);

    Ok(Json(ThreadResponse { thread }))
}

async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<Vec<Event>>, AppError> {
    let raw = EventStore::new(&state.db).load_events(&thread_id)?;
    Ok(Json(conversation::working_conversation(&raw)))
}

async fn list_events(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<Vec<Event>>, AppError> {
    let raw = EventStore::new(&state.db).load_events(&thread_id)?;
    Ok(Json(conversation::complete_history(&raw)))
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct PostMessageResponse {
    pub accepted: bool,
}

/// Appends a user message and drives the turn loop in the background. The
/// HTTP response only acknowledges acceptance; callers observe progress
/// over the event stream (spec.md §6).
async fn post_message(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Json(req): Json<PostMessageRequest>,
) -> Result<Json<PostMessageResponse>, AppError> {
    let agent = match state.agent(&thread_id) {
        Some(agent) => agent,
        None => {
            // Not running in this process yet (fresh process, or a thread
            // created before this server started): reconstruct it,
            // closing out any dangling tool call first (spec.md §4.7).
            let raw = EventStore::new(&state.db).load_events(&thread_id)?;
            if dangling_tool_call(&raw).is_some() {
                resume_thread(&EventStore::new(&state.db), &thread_id)?;
            }
            let thread = ThreadStore::new(&state.db).load_thread(&thread_id)?;
            let agent = Arc::new(Agent::new(
                thread.id,
                thread.session_id,
                thread.project_id,
            ));
            state.register_agent(agent.clone());
            agent
        }
    };

    let deps = state.turn_deps(state.default_provider.clone());
    tokio::spawn(async move {
        if let Err(err) = agent.run_turn(&deps, req.text).await {
            tracing::warn!(thread_id = %agent.thread_id, error = %err, "turn ended with an error");
        }
    });

    Ok(Json(PostMessageResponse { accepted: true }))
}

async fn cancel_turn(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<PostMessageResponse>, AppError> {
    match state.agent(&thread_id) {
        Some(agent) => {
            agent.cancel();
            Ok(Json(PostMessageResponse { accepted: true }))
        }
        None => Err(AppError::NotFound(format!(
            "no running agent for thread {thread_id}"
        ))),
    }
}
