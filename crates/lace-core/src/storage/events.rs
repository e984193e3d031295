//! Event persistence: append-only writes, chronological reads, and the
//! approval-uniqueness enforcement that backs the at-most-once guarantee
//! (spec.md §4.1, §4.6).

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::error::{StorageError, StorageResult};
use crate::model::{Event, EventPayload};

use super::database::Database;

pub struct EventStore<'a> {
    db: &'a Database,
}

/// A pending approval row: call id, the originating TOOL_CALL event, and
/// when the request was made.
pub struct PendingApproval {
    pub call_id: String,
    pub tool_call: Event,
    pub requested_at: DateTime<Utc>,
}

impl<'a> EventStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Appends `payload` to `thread_id`. Returns `Ok(None)` when the write
    /// was rejected by the approval-response uniqueness constraint — the
    /// sole "expected" duplicate case (spec.md §4.1). All other constraint
    /// violations propagate as errors.
    pub fn save_event(&self, thread_id: &str, payload: EventPayload) -> StorageResult<Option<Event>> {
        let event = Event {
            id: crate::ids::new_event_id(),
            thread_id: thread_id.to_string(),
            timestamp: Utc::now(),
            payload,
        };

        let conn = self.db.conn();
        let next_seq: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(sequence), -1) + 1 FROM events WHERE thread_id = ?1",
                [thread_id],
                |r| r.get(0),
            )
            .map_err(StorageError::Database)?;

        let payload_json = serde_json::to_string(&event.payload)?;
        let insert = conn.execute(
            "INSERT INTO events (id, thread_id, sequence, tag, call_id, timestamp, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.id,
                event.thread_id,
                next_seq,
                event.tag(),
                event.call_id(),
                event.timestamp.to_rfc3339(),
                payload_json,
            ],
        );

        match insert {
            Ok(_) => Ok(Some(event)),
            // Only the approval-response uniqueness constraint is an
            // "expected" duplicate (spec.md §4.1). Any other constraint
            // violation — e.g. the `thread_id` foreign key rejecting an
            // event appended against a nonexistent thread — is a real
            // error and must not be swallowed as a no-op.
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation
                    && event.tag() == "TOOL_APPROVAL_RESPONSE" =>
            {
                Ok(None)
            }
            Err(err) => Err(StorageError::Database(err)),
        }
    }

    /// Loads the complete, chronological raw event list for a thread.
    pub fn load_events(&self, thread_id: &str) -> StorageResult<Vec<Event>> {
        let conn = self.db.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, thread_id, tag, timestamp, payload FROM events
                 WHERE thread_id = ?1 ORDER BY sequence ASC",
            )
            .map_err(StorageError::Database)?;

        let rows = stmt
            .query_map([thread_id], |row| {
                let id: String = row.get(0)?;
                let thread_id: String = row.get(1)?;
                let tag: String = row.get(2)?;
                let timestamp: String = row.get(3)?;
                let payload: String = row.get(4)?;
                Ok((id, thread_id, tag, timestamp, payload))
            })
            .map_err(StorageError::Database)?;

        let mut events = Vec::new();
        for row in rows {
            let (id, thread_id, tag, timestamp, payload_json) = row.map_err(StorageError::Database)?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());

            let payload = match serde_json::from_str::<EventPayload>(&payload_json) {
                Ok(payload) => payload,
                // A COMPACTION row that fails to parse against the typed
                // schema is tolerated defensively (spec.md §4.3 step 4,
                // §7); any other tag failing to parse is real corruption.
                Err(err) if tag == "COMPACTION" => {
                    tracing::warn!(thread_id = %thread_id, event_id = %id, error = %err, "malformed COMPACTION payload, falling back to raw event on read");
                    let raw: serde_json::Value = serde_json::from_str(&payload_json)?;
                    EventPayload::MalformedCompaction { raw }
                }
                Err(err) => return Err(StorageError::Serialization(err)),
            };

            events.push(Event {
                id,
                thread_id,
                timestamp,
                payload,
            });
        }
        Ok(events)
    }

    /// TOOL_APPROVAL_REQUEST events in `thread_id` lacking a matching
    /// TOOL_APPROVAL_RESPONSE (spec.md §4.1 `pendingApprovals`).
    pub fn pending_approvals(&self, thread_id: &str) -> StorageResult<Vec<PendingApproval>> {
        let events = self.load_events(thread_id)?;
        let mut pending = Vec::new();
        for event in &events {
            if let EventPayload::ToolApprovalRequest { call_id } = &event.payload {
                let responded = events.iter().any(|e| {
                    matches!(
                        &e.payload,
                        EventPayload::ToolApprovalResponse { call_id: c, .. } if c == call_id
                    )
                });
                if responded {
                    continue;
                }
                let tool_call = events
                    .iter()
                    .find(|e| {
                        matches!(&e.payload, EventPayload::ToolCall { call_id: c, .. } if c == call_id)
                    })
                    .cloned();
                if let Some(tool_call) = tool_call {
                    pending.push(PendingApproval {
                        call_id: call_id.clone(),
                        tool_call,
                        requested_at: event.timestamp,
                    });
                }
            }
        }
        Ok(pending)
    }

    /// The stored decision for `call_id` in `thread_id`, if a response has
    /// been recorded (spec.md §4.1 `approvalDecision`).
    pub fn approval_decision(
        &self,
        thread_id: &str,
        call_id: &str,
    ) -> StorageResult<Option<crate::model::ApprovalDecision>> {
        let conn = self.db.conn();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM events
                 WHERE thread_id = ?1 AND call_id = ?2 AND tag = 'TOOL_APPROVAL_RESPONSE'
                 LIMIT 1",
                params![thread_id, call_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::Database)?;

        match payload {
            None => Ok(None),
            Some(payload) => {
                let payload: EventPayload = serde_json::from_str(&payload)?;
                match payload {
                    EventPayload::ToolApprovalResponse { decision, .. } => Ok(Some(decision)),
                    _ => Ok(None),
                }
            }
        }
    }

    pub fn delete_thread_events(&self, thread_id: &str) -> StorageResult<()> {
        self.db
            .conn()
            .execute("DELETE FROM events WHERE thread_id = ?1", [thread_id])
            .map_err(StorageError::Database)?;
        Ok(())
    }
}
