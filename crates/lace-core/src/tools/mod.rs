//! Tool executor (spec.md §4.5): a registry of tools keyed by name,
//! schema-validated dispatch, approval gating, and cancellation.

pub mod builtin;
pub mod hooks;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::approval::ApprovalCoordinator;
use crate::model::{ApprovalDecision, ContentBlock, ToolStatus};

use hooks::{HookResult, PostToolHook, PreToolHook};

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ToolAnnotations {
    pub read_only: bool,
    pub idempotent: bool,
    pub destructive: bool,
}

impl ToolAnnotations {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            idempotent: true,
            destructive: false,
        }
    }

    pub fn destructive() -> Self {
        Self {
            read_only: false,
            idempotent: false,
            destructive: true,
        }
    }
}

/// Context passed to a tool handler (spec.md §4.5 step 4, §6).
#[derive(Clone)]
pub struct ToolContext {
    pub thread_id: String,
    pub session_id: Option<String>,
    pub project_id: Option<String>,
    pub cancellation: CancellationToken,
}

/// The outcome of a tool execution (spec.md §4.5): always either
/// `{completed, content}` or `{aborted|failed, content explaining why}`.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub status: ToolStatus,
    pub content: Vec<ContentBlock>,
}

impl ToolOutcome {
    pub fn completed(content: Vec<ContentBlock>) -> Self {
        Self {
            status: ToolStatus::Completed,
            content,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Failed,
            content: vec![ContentBlock::text(message)],
        }
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Aborted,
            content: vec![ContentBlock::text(message)],
        }
    }
}

/// A tool declaration plus handler (spec.md §6's tool contract). `metadata`
/// mirrors `krusty-core`'s duck-typed-handler interface collapsed into two
/// operations (spec.md §9).
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    fn annotations(&self) -> ToolAnnotations;

    /// Per-tool execution timeout; defaults to the registry-wide default.
    fn timeout(&self) -> Duration {
        DEFAULT_TOOL_TIMEOUT
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome;
}

/// Static declaration of a tool, for provider advertisement.
#[derive(Debug, Clone)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub annotations: ToolAnnotations,
}

pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    pre_hooks: Vec<Arc<dyn PreToolHook>>,
    post_hooks: Vec<Arc<dyn PostToolHook>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            pre_hooks: vec![Arc::new(hooks::LoggingHook::new())],
            post_hooks: vec![Arc::new(hooks::LoggingHook::new())],
        }
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hooks(
        pre_hooks: Vec<Arc<dyn PreToolHook>>,
        post_hooks: Vec<Arc<dyn PostToolHook>>,
    ) -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            pre_hooks,
            post_hooks,
        }
    }

    pub async fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.write().await.insert(tool.name().to_string(), tool);
    }

    pub async fn list(&self) -> Vec<ToolDeclaration> {
        self.tools
            .read()
            .await
            .values()
            .map(|t| ToolDeclaration {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
                annotations: t.annotations(),
            })
            .collect()
    }

    async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    /// Runs the full dispatch pipeline for spec.md §4.5: lookup, schema
    /// validation (delegated to the tool's own `execute`, since schemas are
    /// declarative JSON this crate does not interpret further), approval
    /// gating through `approval`, timeout, and panic containment.
    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        ctx: ToolContext,
        call_id: &str,
        approval: &ApprovalCoordinator,
    ) -> ToolOutcome {
        let Some(tool) = self.get(name).await else {
            return ToolOutcome::failed(format!("unknown tool: {name}"));
        };

        for hook in &self.pre_hooks {
            if let HookResult::Block { reason } = hook.before_execute(name, &args, &ctx).await {
                return ToolOutcome::aborted(reason);
            }
        }

        let annotations = tool.annotations();
        if !annotations.read_only {
            let decision = approval
                .request_approval(
                    &ctx.thread_id,
                    ctx.session_id.as_deref(),
                    name,
                    call_id,
                    ctx.cancellation.clone(),
                )
                .await;
            match decision {
                ApprovalDecision::Deny => return ToolOutcome::aborted("denied by approval"),
                ApprovalDecision::AllowOnce | ApprovalDecision::AllowSession => {}
            }
        }

        let started = Instant::now();
        let timeout = tool.timeout();
        let outcome = match tokio::time::timeout(timeout, run_tool(&tool, args.clone(), &ctx)).await
        {
            Ok(outcome) => outcome,
            Err(_) => ToolOutcome::failed(format!("tool timed out after {timeout:?}")),
        };
        let duration = started.elapsed();

        for hook in &self.post_hooks {
            hook.after_execute(name, &args, &outcome, duration).await;
        }

        outcome
    }
}

/// Runs the handler, converting a panic into a `failed` outcome rather than
/// taking down the Agent's turn loop (spec.md §5 "Failure containment").
async fn run_tool(tool: &Arc<dyn Tool>, args: Value, ctx: &ToolContext) -> ToolOutcome {
    let tool = tool.clone();
    let ctx = ctx.clone();
    match tokio::spawn(async move { tool.execute(args, &ctx).await }).await {
        Ok(outcome) => outcome,
        Err(join_err) => ToolOutcome::failed(format!("tool handler panicked: {join_err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use std::sync::Arc as StdArc;
    use tempfile::TempDir;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        fn annotations(&self) -> ToolAnnotations {
            ToolAnnotations::read_only()
        }
        async fn execute(&self, args: Value, _ctx: &ToolContext) -> ToolOutcome {
            ToolOutcome::completed(vec![ContentBlock::text(args.to_string())])
        }
    }

    fn setup() -> (Database, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let db = Database::new(dir.path().join("lace.db")).expect("open db");
        (db, dir)
    }

    #[tokio::test]
    async fn read_only_tool_skips_approval() {
        let (db, _dir) = setup();
        let db = StdArc::new(db);
        let approval = ApprovalCoordinator::new(db.clone());
        let registry = ToolRegistry::new();
        registry.register(StdArc::new(EchoTool)).await;

        let ctx = ToolContext {
            thread_id: "lace_20250731_aaa111".into(),
            session_id: None,
            project_id: None,
            cancellation: CancellationToken::new(),
        };
        let outcome = registry
            .execute("echo", serde_json::json!({"x": 1}), ctx, "call_1", &approval)
            .await;
        assert_eq!(outcome.status, ToolStatus::Completed);
    }

    #[tokio::test]
    async fn unknown_tool_fails() {
        let (db, _dir) = setup();
        let db = StdArc::new(db);
        let approval = ApprovalCoordinator::new(db);
        let registry = ToolRegistry::new();
        let ctx = ToolContext {
            thread_id: "lace_20250731_bbb222".into(),
            session_id: None,
            project_id: None,
            cancellation: CancellationToken::new(),
        };
        let outcome = registry
            .execute("nope", serde_json::json!({}), ctx, "call_1", &approval)
            .await;
        assert_eq!(outcome.status, ToolStatus::Failed);
    }
}
