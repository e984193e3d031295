//! Shared application state, wiring the `lace-core` components into one
//! `Clone`-able handle for axum handlers. Grounded on `krusty-server`'s
//! `AppState` (a struct of `Arc`s shared across the router), trimmed to
//! this runtime's components.

use std::sync::Arc;

use dashmap::DashMap;

use lace_core::{
    Agent, ApprovalCoordinator, CompactionRegistry, Database, EventBus, ProviderAdapter,
    ProviderResolver, RuntimeConfig, SessionManager, ToolRegistry, TurnDeps,
};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub bus: Arc<EventBus>,
    pub tools: Arc<ToolRegistry>,
    pub approval: Arc<ApprovalCoordinator>,
    pub compaction: Arc<CompactionRegistry>,
    pub providers: Arc<dyn ProviderResolver>,
    pub config: RuntimeConfig,
    /// Provider used for threads created directly over HTTP, as opposed to
    /// delegate threads spawned through a `new:<provider>/<model>` task
    /// assignee, which resolve their own provider via `providers`.
    pub default_provider: Arc<dyn ProviderAdapter>,
    /// Every Agent running in this process, keyed by thread id, shared
    /// across every session's [`SessionManager`] so a notification can find
    /// an Agent regardless of which handler registered it.
    agents: Arc<DashMap<String, Arc<Agent>>>,
    session_managers: Arc<DashMap<String, Arc<SessionManager>>>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<Database>,
        bus: Arc<EventBus>,
        tools: Arc<ToolRegistry>,
        approval: Arc<ApprovalCoordinator>,
        compaction: Arc<CompactionRegistry>,
        providers: Arc<dyn ProviderResolver>,
        config: RuntimeConfig,
        default_provider: Arc<dyn ProviderAdapter>,
    ) -> Self {
        Self {
            db,
            bus,
            tools,
            approval,
            compaction,
            providers,
            config,
            default_provider,
            agents: Arc::new(DashMap::new()),
            session_managers: Arc::new(DashMap::new()),
        }
    }

    pub fn agent(&self, thread_id: &str) -> Option<Arc<Agent>> {
        self.agents.get(thread_id).map(|entry| entry.clone())
    }

    pub fn register_agent(&self, agent: Arc<Agent>) {
        if let Some(session_id) = agent.session_id.clone() {
            self.session_manager(&session_id).register_agent(agent.clone());
        }
        self.agents.insert(agent.thread_id.clone(), agent);
    }

    /// Builds a fresh [`TurnDeps`] for a turn running against `provider`.
    pub fn turn_deps(&self, provider: Arc<dyn ProviderAdapter>) -> Arc<TurnDeps> {
        Arc::new(TurnDeps {
            db: self.db.clone(),
            provider,
            tools: self.tools.clone(),
            approval: self.approval.clone(),
            compaction: self.compaction.clone(),
            bus: self.bus.clone(),
            config: self.config.clone(),
        })
    }

    /// Returns this process's [`SessionManager`] for `session_id`,
    /// constructing one on first use. Every caller for the same session
    /// shares the same manager, and therefore the same in-process Agent
    /// registry scoped to it.
    pub fn session_manager(&self, session_id: &str) -> Arc<SessionManager> {
        if let Some(existing) = self.session_managers.get(session_id) {
            return existing.clone();
        }
        let manager = Arc::new(SessionManager::new(
            self.db.clone(),
            session_id.to_string(),
            self.bus.clone(),
            self.providers.clone(),
            self.tools.clone(),
            self.approval.clone(),
            self.compaction.clone(),
            self.config.clone(),
        ));
        self.session_managers
            .insert(session_id.to_string(), manager.clone());
        manager
    }
}
