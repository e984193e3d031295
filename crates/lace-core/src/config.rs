//! Runtime configuration consumed by the core (SPEC_FULL.md §11). Loading
//! this struct from a config file or environment is out of scope — callers
//! (the CLI's `clap` parser, or a test fixture) construct it directly.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub db_path: PathBuf,
    pub lace_home: PathBuf,
    pub approval_timeout: Duration,
    pub tool_timeout: Duration,
    /// Fraction of the provider's context window left unused as headroom
    /// before compaction triggers (spec.md §4.4).
    pub context_window_safety_margin: f64,
}

impl RuntimeConfig {
    pub fn new(lace_home: PathBuf) -> Self {
        let db_path = lace_home.join("lace.db");
        Self {
            db_path,
            lace_home,
            approval_timeout: Duration::from_secs(30),
            tool_timeout: Duration::from_secs(120),
            context_window_safety_margin: 0.2,
        }
    }
}
