//! The event stream endpoint (spec.md §6): a long-lived SSE stream of bus
//! envelopes, scope-filtered at connect time. Grounded on
//! `krusty-server::routes::chat`'s `Sse`/`KeepAlive` wiring, generalized
//! from a single chat channel to the full bus.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::stream::{self, Stream};
use serde::Deserialize;

use lace_core::{Scope, ScopeFilter, SubscriptionFilter};

use crate::AppState;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize, Default)]
pub struct EventStreamQuery {
    pub project_id: Option<String>,
    pub session_id: Option<String>,
    pub thread_id: Option<String>,
    pub task_id: Option<String>,
    pub call_id: Option<String>,
    /// Comma-separated list of envelope kinds; absent means every kind.
    pub kinds: Option<String>,
}

impl From<EventStreamQuery> for SubscriptionFilter {
    fn from(q: EventStreamQuery) -> Self {
        SubscriptionFilter {
            scope: ScopeFilter {
                project_id: q.project_id,
                session_id: q.session_id,
                thread_id: q.thread_id,
                task_id: q.task_id,
                call_id: q.call_id,
            },
            kinds: q
                .kinds
                .map(|raw| raw.split(',').map(str::trim).map(String::from).collect()),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(stream_events))
}

async fn stream_events(
    State(state): State<AppState>,
    Query(query): Query<EventStreamQuery>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let sub = state.bus.subscribe(query.into());

    let stream = stream::unfold(sub, |mut sub| async move {
        let envelope = sub.recv().await?;
        let data = serde_json::json!({
            "id": envelope.id,
            "timestamp": envelope.timestamp,
            "scope": scope_json(&envelope.scope),
            "kind": envelope.kind,
            "payload": envelope.payload,
            "persisted": envelope.persisted,
        });
        let event = SseEvent::default()
            .id(envelope.id.clone())
            .event(envelope.kind.clone())
            .json_data(data)
            .unwrap_or_else(|_| SseEvent::default().data("{}"));
        Some((Ok(event), sub))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEPALIVE_INTERVAL))
}

fn scope_json(scope: &Scope) -> serde_json::Value {
    serde_json::json!({
        "projectId": scope.project_id,
        "sessionId": scope.session_id,
        "threadId": scope.thread_id,
        "taskId": scope.task_id,
        "callId": scope.call_id,
    })
}
