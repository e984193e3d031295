//! Conversation builder (spec.md §4.3): the pure function from a raw event
//! list to the "working conversation" a provider sees. Called on every read
//! path, including provider-bound assembly — it must never fail.

use std::collections::HashSet;

use crate::model::{Event, EventPayload};

/// Derives the working conversation from a thread's raw, complete history.
///
/// 1. Find the last COMPACTION event.
/// 2. None: raw list, deduplicated.
/// 3. Present and valid: `replacement ++ [compaction] ++ raw[after]`.
/// 4. Present but malformed: raw list unchanged (defensive fallback).
/// 5. Always finishes with tool-result deduplication.
pub fn working_conversation(raw: &[Event]) -> Vec<Event> {
    let last_compaction_idx = raw.iter().rposition(|e| {
        matches!(
            e.payload,
            EventPayload::Compaction { .. } | EventPayload::MalformedCompaction { .. }
        )
    });

    let assembled = match last_compaction_idx {
        None => raw.to_vec(),
        Some(idx) => match &raw[idx].payload {
            EventPayload::Compaction {
                compacted_events, ..
            } => {
                let mut out = compacted_events.clone();
                out.push(raw[idx].clone());
                out.extend(raw[idx + 1..].iter().cloned());
                out
            }
            // Defensive fallback (spec.md §4.3 step 4): never fail a read
            // on bad compaction data, return the raw list unchanged.
            EventPayload::MalformedCompaction { .. } => raw.to_vec(),
            _ => unreachable!("last_compaction_idx only matches compaction payloads"),
        },
    };

    dedup_tool_results(assembled)
}

/// The complete, unfiltered history — the raw event list as stored.
pub fn complete_history(raw: &[Event]) -> Vec<Event> {
    raw.to_vec()
}

/// Walks events in order; for each TOOL_RESULT carrying a call identifier,
/// keeps only the first occurrence and drops later duplicates. Object-form
/// TOOL_RESULT events with no call identifier are dropped as invalid.
fn dedup_tool_results(events: Vec<Event>) -> Vec<Event> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(events.len());

    for event in events {
        if let EventPayload::ToolResult { call_id, .. } = &event.payload {
            if call_id.is_empty() {
                continue;
            }
            if !seen.insert(call_id.clone()) {
                continue;
            }
        }
        out.push(event);
    }
    out
}
