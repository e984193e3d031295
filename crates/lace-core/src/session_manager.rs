//! Session and task manager (spec.md §4.8). Each Session owns one
//! TaskManager; this module folds both into one type since neither has
//! meaningful state apart from the other in this runtime. Grounded on
//! `krusty-core::storage::messages`'s CRUD-plus-bus-event shape, applied to
//! tasks instead of chat messages.

use std::sync::Arc;

use dashmap::DashMap;

use crate::agent::{Agent, TurnDeps};
use crate::bus::{Envelope, EventBus, Scope};
use crate::error::StorageResult;
use crate::ids;
use crate::model::{Assignee, Task, TaskNote, TaskPriority, TaskStatus, TaskSummary};
use crate::provider::ProviderAdapter;
use crate::storage::{Database, TaskStore};

/// Prefix marking a USER_MESSAGE as a task-assignment notification rather
/// than organic human input (spec.md §4.8 "a USER_MESSAGE prefixed with a
/// fixed system marker").
pub const TASK_NOTIFICATION_MARKER: &str = "[lace:task-assigned]";

/// Resolves a `new:<provider>/<model>` assignee to a concrete adapter.
/// Implemented by the caller that owns the set of configured providers;
/// this crate only depends on the trait (spec.md §6).
pub trait ProviderResolver: Send + Sync {
    fn resolve(&self, provider: &str, model: &str) -> Option<Arc<dyn ProviderAdapter>>;
}

pub struct SessionManager {
    db: Arc<Database>,
    session_id: String,
    bus: Arc<EventBus>,
    providers: Arc<dyn ProviderResolver>,
    turn_deps_template: TurnDepsTemplate,
    /// In-process registry of Agents bound to this session, keyed by
    /// thread id. Only agents actually running in this process can receive
    /// a queued notification; an assignee thread with no running Agent
    /// here is simply not delivered to (it will be observed via the bus).
    agents: DashMap<String, Arc<Agent>>,
}

/// The non-provider collaborators shared by every Agent this manager spawns.
struct TurnDepsTemplate {
    tools: Arc<crate::tools::ToolRegistry>,
    approval: Arc<crate::approval::ApprovalCoordinator>,
    compaction: Arc<crate::compaction::CompactionRegistry>,
    config: crate::config::RuntimeConfig,
}

impl SessionManager {
    pub fn new(
        db: Arc<Database>,
        session_id: impl Into<String>,
        bus: Arc<EventBus>,
        providers: Arc<dyn ProviderResolver>,
        tools: Arc<crate::tools::ToolRegistry>,
        approval: Arc<crate::approval::ApprovalCoordinator>,
        compaction: Arc<crate::compaction::CompactionRegistry>,
        config: crate::config::RuntimeConfig,
    ) -> Self {
        Self {
            db,
            session_id: session_id.into(),
            bus,
            providers,
            turn_deps_template: TurnDepsTemplate {
                tools,
                approval,
                compaction,
                config,
            },
            agents: DashMap::new(),
        }
    }

    /// Registers an already-running Agent so this manager can deliver
    /// notifications to it. Callers that reconstruct Agents on startup
    /// (via [`crate::agent::resume_thread`]) register them here too.
    pub fn register_agent(&self, agent: Arc<Agent>) {
        self.agents.insert(agent.thread_id.clone(), agent);
    }

    pub fn agent(&self, thread_id: &str) -> Option<Arc<Agent>> {
        self.agents.get(thread_id).map(|entry| entry.clone())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_task(
        &self,
        title: String,
        description: String,
        prompt: String,
        priority: TaskPriority,
        assignee: String,
        creator: String,
        creator_thread_id: String,
        creator_is_human: bool,
    ) -> StorageResult<Task> {
        let now = chrono::Utc::now();
        let task = Task {
            id: ids::new_task_id(),
            title,
            description,
            prompt,
            status: TaskStatus::Pending,
            priority,
            assignee,
            creator,
            thread_id: creator_thread_id,
            session_id: self.session_id.clone(),
            created_at: now,
            updated_at: now,
            notes: vec![],
        };

        TaskStore::new(&self.db).create_task(&task)?;
        self.publish_task_event("task:created", &task, &task.creator.clone(), creator_is_human);
        self.deliver_assignment(&task);
        Ok(task)
    }

    pub fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        priority: Option<TaskPriority>,
        assignee: Option<&str>,
    ) -> StorageResult<Vec<Task>> {
        TaskStore::new(&self.db).list_tasks(&self.session_id, status, priority, assignee)
    }

    pub fn get_task(&self, task_id: &str) -> StorageResult<Task> {
        TaskStore::new(&self.db).get_task(task_id)
    }

    pub fn update_task(
        &self,
        task_id: &str,
        status: Option<TaskStatus>,
        priority: Option<TaskPriority>,
        assignee: Option<&str>,
        description: Option<&str>,
        actor: &str,
        actor_is_human: bool,
    ) -> StorageResult<Task> {
        let store = TaskStore::new(&self.db);
        let before = store.get_task(task_id)?;
        store.update_task(task_id, status, priority, assignee, description)?;
        let after = store.get_task(task_id)?;

        self.publish_task_event("task:updated", &after, actor, actor_is_human);
        if after.assignee != before.assignee {
            self.deliver_assignment(&after);
        }
        Ok(after)
    }

    pub fn delete_task(&self, task_id: &str, actor: &str, actor_is_human: bool) -> StorageResult<()> {
        let store = TaskStore::new(&self.db);
        let task = store.get_task(task_id)?;
        store.delete_task(task_id)?;
        self.publish_task_event("task:deleted", &task, actor, actor_is_human);
        Ok(())
    }

    pub fn add_note(
        &self,
        task_id: &str,
        author: String,
        content: String,
        author_is_human: bool,
    ) -> StorageResult<Task> {
        let store = TaskStore::new(&self.db);
        store.add_note(
            task_id,
            &TaskNote {
                author: author.clone(),
                content,
                timestamp: chrono::Utc::now(),
            },
        )?;
        let task = store.get_task(task_id)?;
        self.publish_task_event("task:note_added", &task, &author, author_is_human);
        Ok(task)
    }

    pub fn summary(&self) -> StorageResult<TaskSummary> {
        let tasks = TaskStore::new(&self.db).list_tasks(&self.session_id, None, None, None)?;
        let mut summary = TaskSummary::default();
        for task in &tasks {
            match task.status {
                TaskStatus::Pending => summary.pending += 1,
                TaskStatus::InProgress => summary.in_progress += 1,
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Blocked => summary.blocked += 1,
            }
        }
        Ok(summary)
    }

    fn publish_task_event(&self, kind: &str, task: &Task, actor: &str, actor_is_human: bool) {
        self.bus.publish(Envelope::new(
            Scope {
                session_id: Some(self.session_id.clone()),
                task_id: Some(task.id.clone()),
                ..Scope::default()
            },
            kind,
            serde_json::json!({
                "task": task,
                "actor": actor,
                "actorIsHuman": actor_is_human,
            }),
            true,
        ));
    }

    /// Routes a task to its assignee per spec.md §4.8's three assignment
    /// semantics. A `new:` assignee that cannot be resolved to a known
    /// provider is logged and left undelivered rather than failing the
    /// task mutation that triggered it.
    fn deliver_assignment(&self, task: &Task) {
        match Assignee::parse(&task.assignee) {
            Assignee::Human => {}
            Assignee::Agent(thread_id) => {
                if let Some(agent) = self.agent(&thread_id) {
                    agent.enqueue_notification(format!(
                        "{TASK_NOTIFICATION_MARKER} {}",
                        task.prompt
                    ));
                } else {
                    tracing::warn!(
                        thread_id,
                        task_id = %task.id,
                        "task assigned to an agent thread with no running Agent in this process"
                    );
                }
            }
            Assignee::Spawn { provider, model } => self.spawn_delegate(task, &provider, &model),
        }
    }

    fn spawn_delegate(&self, task: &Task, provider: &str, model: &str) {
        let Some(adapter) = self.providers.resolve(provider, model) else {
            tracing::warn!(provider, model, task_id = %task.id, "unknown provider/model for spawn-on-demand assignee");
            return;
        };

        let thread = match crate::storage::ThreadStore::new(&self.db).create_thread(
            Some(&task.thread_id),
            Some(self.session_id.clone()),
            None,
        ) {
            Ok(thread) => thread,
            Err(err) => {
                tracing::error!(creator_thread_id = %task.thread_id, error = %err, "failed to create delegate thread");
                return;
            }
        };
        let thread_id = thread.id.clone();

        let agent = Arc::new(Agent::new(
            thread_id.clone(),
            Some(self.session_id.clone()),
            None,
        ));
        self.register_agent(agent.clone());

        let deps = Arc::new(TurnDeps {
            db: self.db.clone(),
            provider: adapter,
            tools: self.turn_deps_template.tools.clone(),
            approval: self.turn_deps_template.approval.clone(),
            compaction: self.turn_deps_template.compaction.clone(),
            bus: self.bus.clone(),
            config: self.turn_deps_template.config.clone(),
        });
        let prompt = format!("{TASK_NOTIFICATION_MARKER} {}", task.prompt);
        tokio::spawn(async move {
            if let Err(err) = agent.run_turn(&deps, prompt).await {
                tracing::warn!(thread_id = %agent.thread_id, error = %err, "delegate turn ended with an error");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalCoordinator;
    use crate::compaction::CompactionRegistry;
    use crate::config::RuntimeConfig;
    use crate::model::{Session, SessionStatus};
    use crate::storage::SessionStore;
    use crate::tools::ToolRegistry;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct NoProviders;
    impl ProviderResolver for NoProviders {
        fn resolve(&self, _provider: &str, _model: &str) -> Option<Arc<dyn ProviderAdapter>> {
            None
        }
    }

    fn setup() -> (SessionManager, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let db = Arc::new(Database::new(dir.path().join("lace.db")).expect("open db"));
        SessionStore::new(&db)
            .save_session(&Session {
                id: "sess_1".into(),
                project_id: None,
                config: HashMap::new(),
                status: SessionStatus::Active,
                agent_thread_ids: vec![],
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            })
            .expect("save session");

        let manager = SessionManager::new(
            db.clone(),
            "sess_1",
            Arc::new(EventBus::default()),
            Arc::new(NoProviders),
            Arc::new(ToolRegistry::new()),
            Arc::new(ApprovalCoordinator::new(db)),
            Arc::new(CompactionRegistry::with_builtins()),
            RuntimeConfig::new(dir.path().to_path_buf()),
        );
        (manager, dir)
    }

    #[test]
    fn create_and_summarize() {
        let (manager, _dir) = setup();
        manager
            .create_task(
                "title".into(),
                "desc".into(),
                "do it".into(),
                TaskPriority::High,
                "human".into(),
                "alice".into(),
                "lace_20250731_eee555".into(),
                true,
            )
            .expect("create");

        let summary = manager.summary().expect("summary");
        assert_eq!(summary.pending, 1);
    }

    #[test]
    fn human_assignee_needs_no_running_agent() {
        let (manager, _dir) = setup();
        let task = manager
            .create_task(
                "title".into(),
                "desc".into(),
                "do it".into(),
                TaskPriority::Medium,
                "human".into(),
                "alice".into(),
                "lace_20250731_fff666".into(),
                true,
            )
            .expect("create");
        assert_eq!(task.assignee, "human");
    }

    #[test]
    fn agent_assignee_delivers_when_registered() {
        let (manager, _dir) = setup();
        let agent = Arc::new(Agent::new("lace_20250731_ggg777", Some("sess_1".into()), None));
        manager.register_agent(agent.clone());

        manager
            .create_task(
                "title".into(),
                "desc".into(),
                "please look into this".into(),
                TaskPriority::Low,
                "lace_20250731_ggg777".into(),
                "alice".into(),
                "lace_20250731_fff666".into(),
                true,
            )
            .expect("create");

        assert_eq!(
            agent.status(),
            crate::agent::AgentStatus::Idle,
            "registering and notifying does not itself start a turn"
        );
    }

    #[test]
    fn update_triggers_reassignment_delivery() {
        let (manager, _dir) = setup();
        let task = manager
            .create_task(
                "title".into(),
                "desc".into(),
                "do it".into(),
                TaskPriority::Medium,
                "human".into(),
                "alice".into(),
                "lace_20250731_hhh888".into(),
                true,
            )
            .expect("create");

        let agent = Arc::new(Agent::new("lace_20250731_iii999", Some("sess_1".into()), None));
        manager.register_agent(agent.clone());

        manager
            .update_task(
                &task.id,
                None,
                None,
                Some("lace_20250731_iii999"),
                None,
                "alice",
                true,
            )
            .expect("update");
    }
}
