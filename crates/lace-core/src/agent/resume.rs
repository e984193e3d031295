//! Resume logic (spec.md §4.7 "Resume"): on process restart an Agent is
//! reconstructed purely by reading the thread's events. A dangling TOOL_CALL
//! — one with no matching TOOL_RESULT — must never surface in the working
//! conversation, so resume closes it out with a synthetic `aborted` result
//! before the Agent re-enters `idle`.

use crate::error::StorageResult;
use crate::model::{ContentBlock, Event, EventPayload, ToolStatus};
use crate::storage::EventStore;

/// Returns the call identifier of a dangling TOOL_CALL: the last raw event
/// in the thread is a TOOL_CALL with no corresponding TOOL_RESULT.
pub fn dangling_tool_call(raw: &[Event]) -> Option<&str> {
    let last = raw.last()?;
    match &last.payload {
        EventPayload::ToolCall { call_id, .. } => Some(call_id.as_str()),
        _ => None,
    }
}

/// Closes out a dangling tool call for `thread_id`, if one exists. Safe to
/// call unconditionally on every Agent reconstruction — a no-op when the
/// thread's last event is not a bare TOOL_CALL.
pub fn resume_thread(events: &EventStore<'_>, thread_id: &str) -> StorageResult<()> {
    let raw = events.load_events(thread_id)?;
    if let Some(call_id) = dangling_tool_call(&raw) {
        let call_id = call_id.to_string();
        events.save_event(
            thread_id,
            EventPayload::ToolResult {
                call_id,
                content: vec![ContentBlock::text(
                    "aborted: process restarted while this tool call was in flight",
                )],
                status: ToolStatus::Aborted,
                usage: None,
            },
        )?;
    }
    Ok(())
}
