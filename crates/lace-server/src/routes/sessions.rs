//! Session and task HTTP CRUD (spec.md §4.8), grounded on
//! `krusty-server::routes::chat`'s general route shape (`krusty-server` has
//! no dedicated sessions.rs to mirror directly, so the endpoint surface
//! here is modeled on `SessionManager`'s own method list instead).

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use lace_core::storage::SessionStore;
use lace_core::{ids, Session, SessionStatus, Task, TaskPriority, TaskStatus, TaskSummary};

use crate::error::AppError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_session))
        .route("/:session_id", get(get_session))
        .route("/:session_id/summary", get(summary))
        .route("/:session_id/tasks", get(list_tasks).post(create_task))
        .route(
            "/:session_id/tasks/:task_id",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .route("/:session_id/tasks/:task_id/notes", post(add_note))
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub project_id: Option<String>,
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<Session>, AppError> {
    let now = chrono::Utc::now();
    let session = Session {
        id: ids::new_session_id(),
        project_id: req.project_id,
        config: HashMap::new(),
        status: SessionStatus::Active,
        agent_thread_ids: vec![],
        created_at: now,
        updated_at: now,
    };
    SessionStore::new(&state.db).save_session(&session)?;
    Ok(Json(session))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, AppError> {
    Ok(Json(SessionStore::new(&state.db).load_session(&session_id)?))
}

async fn summary(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<TaskSummary>, AppError> {
    Ok(Json(state.session_manager(&session_id).summary()?))
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: String,
    pub prompt: String,
    pub priority: TaskPriority,
    pub assignee: String,
    pub creator: String,
    pub creator_thread_id: String,
    pub creator_is_human: bool,
}

async fn create_task(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<Task>, AppError> {
    let task = state.session_manager(&session_id).create_task(
        req.title,
        req.description,
        req.prompt,
        req.priority,
        req.assignee,
        req.creator,
        req.creator_thread_id,
        req.creator_is_human,
    )?;
    Ok(Json(task))
}

#[derive(Debug, Deserialize, Default)]
pub struct ListTasksQuery {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assignee: Option<String>,
}

async fn list_tasks(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = state.session_manager(&session_id).list_tasks(
        query.status,
        query.priority,
        query.assignee.as_deref(),
    )?;
    Ok(Json(tasks))
}

async fn get_task(
    State(state): State<AppState>,
    Path((session_id, task_id)): Path<(String, String)>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(state.session_manager(&session_id).get_task(&task_id)?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assignee: Option<String>,
    pub description: Option<String>,
    pub actor: String,
    pub actor_is_human: bool,
}

async fn update_task(
    State(state): State<AppState>,
    Path((session_id, task_id)): Path<(String, String)>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, AppError> {
    let task = state.session_manager(&session_id).update_task(
        &task_id,
        req.status,
        req.priority,
        req.assignee.as_deref(),
        req.description.as_deref(),
        &req.actor,
        req.actor_is_human,
    )?;
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
pub struct DeleteTaskRequest {
    pub actor: String,
    pub actor_is_human: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteAck {
    pub status: &'static str,
}

async fn delete_task(
    State(state): State<AppState>,
    Path((session_id, task_id)): Path<(String, String)>,
    Json(req): Json<DeleteTaskRequest>,
) -> Result<Json<DeleteAck>, AppError> {
    state
        .session_manager(&session_id)
        .delete_task(&task_id, &req.actor, req.actor_is_human)?;
    Ok(Json(DeleteAck { status: "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct AddNoteRequest {
    pub author: String,
    pub content: String,
    pub author_is_human: bool,
}

async fn add_note(
    State(state): State<AppState>,
    Path((session_id, task_id)): Path<(String, String)>,
    Json(req): Json<AddNoteRequest>,
) -> Result<Json<Task>, AppError> {
    let task = state.session_manager(&session_id).add_note(
        &task_id,
        req.author,
        req.content,
        req.author_is_human,
    )?;
    Ok(Json(task))
}
