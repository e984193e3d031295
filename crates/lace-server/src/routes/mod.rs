//! API routes.

use axum::Router;

use crate::AppState;

mod approvals;
mod events;
mod sessions;
mod threads;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/threads", threads::router())
        .nest("/approvals", approvals::router())
        .nest("/sessions", sessions::router())
        .nest("/events", events::router())
}
