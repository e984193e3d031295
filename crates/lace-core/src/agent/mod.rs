//! The Agent state machine and turn loop (spec.md §4.7). Submodule layout
//! mirrors `krusty-core::agent`'s split across state, executor, and
//! resume/cancellation concerns, trimmed to what this runtime's turn loop
//! actually needs — no `event_bus.rs`/`cache.rs`/`summarizer.rs` here since
//! those responsibilities live in [`crate::bus`] and [`crate::compaction`].

mod resume;
mod state;
mod turn;

pub use resume::{dangling_tool_call, resume_thread};
pub use state::{Agent, AgentStatus};
pub use turn::TurnDeps;
