//! Persistence layer (spec.md §4.1).
//!
//! SQLite-backed storage for threads, events, sessions, projects, and tasks.
//! Each sub-store borrows the shared [`Database`] connection; callers
//! compose them rather than the store owning its own connection, matching
//! `krusty-core`'s `MessageStore<'a>` / `SessionManager` split.

pub mod database;
pub mod events;
pub mod projects;
pub mod sessions;
pub mod tasks;
pub mod threads;

pub use database::Database;
pub use events::{EventStore, PendingApproval};
pub use projects::ProjectStore;
pub use sessions::SessionStore;
pub use tasks::TaskStore;
pub use threads::ThreadStore;
