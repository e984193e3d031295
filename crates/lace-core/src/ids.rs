//! Identifier generation and parsing.
//!
//! Thread identifiers have the shape `lace_<yyyymmdd>_<6 alphanum>` with an
//! optional dot-suffixed chain of integers marking delegate descent, e.g.
//! `lace_20250731_abc123.1.2`. The prefix before the first dot is the root
//! identifier; everything after is the delegate path.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

static THREAD_ROOT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^lace_\d{8}_[a-z0-9]{6}$").expect("static regex"));

static THREAD_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^lace_\d{8}_[a-z0-9]{6}(\.\d+)*$").expect("static regex"));

/// Generates a fresh root thread identifier: `lace_<yyyymmdd>_<6 alphanum>`.
pub fn new_thread_root_id() -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = random_alphanum(6);
    format!("lace_{date}_{suffix}")
}

/// Builds the next delegate identifier under `parent`, given the count of
/// existing direct children (the new suffix is `count + 1`).
pub fn next_delegate_id(parent: &str, existing_children: usize) -> String {
    format!("{parent}.{}", existing_children + 1)
}

/// Returns whether `id` has the well-formed thread identifier shape.
pub fn is_valid_thread_id(id: &str) -> bool {
    THREAD_ID_RE.is_match(id)
}

/// Returns whether `id` is a root identifier (no delegate suffix).
pub fn is_root_thread_id(id: &str) -> bool {
    THREAD_ROOT_RE.is_match(id)
}

/// Returns the root identifier a (possibly delegate) thread id descends from.
pub fn root_of(id: &str) -> &str {
    id.split('.').next().unwrap_or(id)
}

/// Returns the immediate parent identifier of a delegate id, or `None` for a
/// root identifier.
pub fn parent_of(id: &str) -> Option<&str> {
    id.rfind('.').map(|idx| &id[..idx])
}

/// Generates an event identifier: monotonically-suggestive timestamp plus a
/// random suffix, so lexical sort approximates append order without being
/// relied upon for correctness (append order is authoritative).
pub fn new_event_id() -> String {
    format!("evt_{}_{}", Utc::now().timestamp_micros(), random_alphanum(6))
}

/// Generates a task identifier: `task_<yyyymmdd>_<random>`.
pub fn new_task_id() -> String {
    let date = Utc::now().format("%Y%m%d");
    format!("task_{date}_{}", random_alphanum(8))
}

/// Generates a session identifier.
pub fn new_session_id() -> String {
    format!("sess_{}", Uuid::new_v4().simple())
}

/// Generates a project identifier.
pub fn new_project_id() -> String {
    format!("proj_{}", Uuid::new_v4().simple())
}

/// Generates a call identifier for a tool invocation.
pub fn new_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

fn random_alphanum(len: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let uuid = Uuid::new_v4();
    let bytes = uuid.as_bytes();
    (0..len)
        .map(|i| ALPHABET[(bytes[i % bytes.len()] as usize + i) % ALPHABET.len()] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_id_matches_shape() {
        let id = new_thread_root_id();
        assert!(is_valid_thread_id(&id));
        assert!(is_root_thread_id(&id));
    }

    #[test]
    fn delegate_id_chains() {
        let root = new_thread_root_id();
        let child = next_delegate_id(&root, 0);
        assert_eq!(child, format!("{root}.1"));
        assert!(is_valid_thread_id(&child));
        assert!(!is_root_thread_id(&child));
        assert_eq!(root_of(&child), root);
        assert_eq!(parent_of(&child), Some(root.as_str()));

        let grandchild = next_delegate_id(&child, 1);
        assert_eq!(grandchild, format!("{child}.2"));
        assert_eq!(root_of(&grandchild), root);
        assert_eq!(parent_of(&grandchild), Some(child.as_str()));
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(!is_valid_thread_id("not-a-thread-id"));
        assert!(!is_valid_thread_id("lace_2025_abc"));
        assert!(!is_valid_thread_id("lace_20250731_ABCDEF"));
    }
}
