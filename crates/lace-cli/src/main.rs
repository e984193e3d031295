//! Thin binary wiring a `lace-core` runtime to `lace-server` (spec.md §6
//! "CLI/configuration: out of scope except... the configured database
//! path, the configured lace-home directory, and the set of registered
//! tools are inputs to this core at startup"). Grounded on
//! `krusty-cli::main`'s clap/tracing-subscriber wiring, stripped of every
//! TUI/ACP/PTY concern this runtime has no counterpart for.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use lace_core::storage::Database;
use lace_core::tools::builtin::{ReadFileTool, ShellTool};
use lace_core::{
    ApprovalCoordinator, CompactionRegistry, EventBus, ModelMessage, ProviderAdapter,
    ProviderResolver, ProviderResponse, RuntimeConfig, StreamDelta, TokenUsage, ToolAdvertisement,
    ToolRegistry,
};
use lace_server::AppState;

#[derive(Parser)]
#[command(name = "lace")]
#[command(about = "Multi-agent orchestration runtime server")]
struct Cli {
    /// Directory holding the SQLite database and other runtime state.
    /// Defaults to `~/.lace`.
    #[arg(long)]
    lace_home: Option<PathBuf>,

    /// Address to bind the HTTP/SSE server to.
    #[arg(long, default_value = "127.0.0.1:4173")]
    bind: SocketAddr,
}

fn default_lace_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lace")
}

/// A provider adapter that acknowledges a turn without calling out to any
/// upstream model. Upstream wire protocols are explicitly out of this
/// runtime's scope; this stub exists only so the binary is runnable
/// end-to-end without external credentials configured. A real deployment
/// swaps this for an adapter backed by an actual provider.
struct NullProvider;

#[async_trait::async_trait]
impl ProviderAdapter for NullProvider {
    fn name(&self) -> &str {
        "null"
    }
    fn default_model(&self) -> &str {
        "null"
    }
    fn context_window(&self) -> usize {
        128_000
    }
    fn max_completion_tokens(&self) -> usize {
        4_096
    }

    async fn create_response(
        &self,
        _messages: &[ModelMessage],
        _tools: &[ToolAdvertisement],
        _deltas: tokio::sync::mpsc::UnboundedSender<StreamDelta>,
        _cancel: CancellationToken,
    ) -> Result<ProviderResponse> {
        Ok(ProviderResponse {
            text: "no provider is configured for this lace deployment".to_string(),
            tool_calls: vec![],
            usage: TokenUsage {
                prompt_tokens: 0,
                completion_tokens: 0,
            },
        })
    }
}

/// No spawn-on-demand providers are configured by this thin binary; an
/// embedder wiring real providers implements [`ProviderResolver`] itself.
struct NoProviders;

impl ProviderResolver for NoProviders {
    fn resolve(&self, _provider: &str, _model: &str) -> Option<Arc<dyn ProviderAdapter>> {
        None
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let lace_home = cli.lace_home.unwrap_or_else(default_lace_home);
    std::fs::create_dir_all(&lace_home)?;

    let config = RuntimeConfig::new(lace_home);
    let db = Arc::new(Database::new(&config.db_path)?);
    if db.is_degraded() {
        tracing::warn!("database is running in degraded in-memory mode; history will not persist");
    }

    let bus = Arc::new(EventBus::default());
    let tools = Arc::new(ToolRegistry::new());
    tools.register(Arc::new(ReadFileTool)).await;
    tools.register(Arc::new(ShellTool)).await;

    let approval = Arc::new(ApprovalCoordinator::with_timeout(
        db.clone(),
        config.approval_timeout,
    ));
    let compaction = Arc::new(CompactionRegistry::with_builtins());

    let state = AppState::new(
        db,
        bus,
        tools,
        approval,
        compaction,
        Arc::new(NoProviders),
        config,
        Arc::new(NullProvider),
    );

    lace_server::serve(cli.bind, state).await
}
