//! Event bus (spec.md §4.9): a process-wide publish/subscribe service.
//! Matching happens subscriber-side; the publisher emits every envelope and
//! each subscriber drops what it doesn't want. Grounded on
//! `krusty-server::routes::chat`'s SSE broadcast channel, generalized from a
//! single chat-scoped topic to the full project/session/thread/task/call
//! scope tuple.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Scope carried by every envelope; a filter field of `None` means
/// "unscoped" for that dimension in a filter, or "not applicable" on an
/// envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub project_id: Option<String>,
    pub session_id: Option<String>,
    pub thread_id: Option<String>,
    pub task_id: Option<String>,
    pub call_id: Option<String>,
}

impl Scope {
    pub fn thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Self::default()
        }
    }

    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }
}

/// The unified envelope every publish wraps (spec.md §4.9).
#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub scope: Scope,
    pub kind: String,
    pub payload: Value,
    /// Distinguishes a transient, bus-only event (e.g. a token delta) from
    /// one that also exists as a persisted Event — consumers must not try
    /// to write a transient envelope to storage.
    pub persisted: bool,
}

impl Envelope {
    pub fn new(scope: Scope, kind: impl Into<String>, payload: Value, persisted: bool) -> Self {
        Self {
            id: format!("bus_{}", Uuid::new_v4().simple()),
            timestamp: Utc::now(),
            scope,
            kind: kind.into(),
            payload,
            persisted,
        }
    }
}

/// A subscriber's scope filter: each `Some` field must match the envelope's
/// corresponding field exactly; `None` fields impose no constraint.
#[derive(Debug, Clone, Default)]
pub struct ScopeFilter {
    pub project_id: Option<String>,
    pub session_id: Option<String>,
    pub thread_id: Option<String>,
    pub task_id: Option<String>,
    pub call_id: Option<String>,
}

impl ScopeFilter {
    fn matches(&self, scope: &Scope) -> bool {
        field_matches(&self.project_id, &scope.project_id)
            && field_matches(&self.session_id, &scope.session_id)
            && field_matches(&self.thread_id, &scope.thread_id)
            && field_matches(&self.task_id, &scope.task_id)
            && field_matches(&self.call_id, &scope.call_id)
    }
}

fn field_matches(filter: &Option<String>, value: &Option<String>) -> bool {
    match filter {
        None => true,
        Some(want) => value.as_deref() == Some(want.as_str()),
    }
}

/// A subscription's full filter: scope plus an optional set of payload
/// kinds. `kinds: None` means "every kind".
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub scope: ScopeFilter,
    pub kinds: Option<HashSet<String>>,
}

impl SubscriptionFilter {
    fn matches(&self, envelope: &Envelope) -> bool {
        self.scope.matches(&envelope.scope)
            && self
                .kinds
                .as_ref()
                .map(|kinds| kinds.contains(&envelope.kind))
                .unwrap_or(true)
    }
}

pub struct EventBus {
    tx: broadcast::Sender<Arc<Envelope>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes to every current subscriber. The bus applies no
    /// backpressure (spec.md §5); a subscriber that falls behind drops
    /// events rather than stalling the publisher.
    pub fn publish(&self, envelope: Envelope) {
        let _ = self.tx.send(Arc::new(envelope));
    }

    pub fn subscribe(&self, filter: SubscriptionFilter) -> BusSubscription {
        BusSubscription {
            rx: self.tx.subscribe(),
            filter,
        }
    }
}

pub struct BusSubscription {
    rx: broadcast::Receiver<Arc<Envelope>>,
    filter: SubscriptionFilter,
}

impl BusSubscription {
    /// Awaits the next envelope matching this subscription's filter,
    /// transparently skipping non-matching envelopes and lag gaps.
    pub async fn recv(&mut self) -> Option<Arc<Envelope>> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) if self.filter.matches(&envelope) => return Some(envelope),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event bus subscriber lagged, dropping events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
