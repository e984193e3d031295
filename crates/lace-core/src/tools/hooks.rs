//! Pre/post tool-execution hooks (spec.md §9's ambient logging, grounded on
//! `krusty-core::agent::hooks`). Only `LoggingHook` is carried over — the
//! teacher's `SafetyHook`/`PlanModeHook` enforce krusty-specific bash
//! denylists and a plan/build mode this runtime has no concept of.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{ToolContext, ToolOutcome};

#[derive(Debug)]
pub enum HookResult {
    Continue,
    Block { reason: String },
}

#[async_trait]
pub trait PreToolHook: Send + Sync {
    async fn before_execute(&self, name: &str, args: &Value, ctx: &ToolContext) -> HookResult;
}

#[async_trait]
pub trait PostToolHook: Send + Sync {
    async fn after_execute(
        &self,
        name: &str,
        args: &Value,
        outcome: &ToolOutcome,
        duration: Duration,
    );
}

pub struct LoggingHook;

impl LoggingHook {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoggingHook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PreToolHook for LoggingHook {
    async fn before_execute(&self, name: &str, _args: &Value, ctx: &ToolContext) -> HookResult {
        tracing::debug!(tool = name, thread_id = %ctx.thread_id, "tool execution starting");
        HookResult::Continue
    }
}

#[async_trait]
impl PostToolHook for LoggingHook {
    async fn after_execute(
        &self,
        name: &str,
        _args: &Value,
        outcome: &ToolOutcome,
        duration: Duration,
    ) {
        tracing::info!(
            tool = name,
            status = ?outcome.status,
            duration_ms = duration.as_millis() as u64,
            "tool execution completed"
        );
    }
}
