//! Wires one concrete deployment of the core (spec §4.9's collaborators)
//! from a resolved [`CliConfig`]: a [`MemoryStore`] backend, a
//! [`MockLlmClient`] stand-in for the external LLM provider, the
//! canonical tool registry backed by a no-op invoker, and every
//! component the command handlers dispatch into.
//!
//! `ksg-cli` is an operator tool, not the HTTP/browser-automation
//! deployment spec §1 scopes out — it never wires a real
//! [`ToolInvoker`] or [`LlmClient`]; it exists to seed, inspect, and
//! drive the agent loop end to end against whichever store is
//! configured.

use std::path::Path;
use std::sync::Arc;

use ksg_core::llm::MockLlmClient;
use ksg_core::queue::TaskQueue;
use ksg_core::scheduler::Scheduler;
use ksg_core::store::{InMemoryStore, MemoryStore};
use ksg_core::tools::{NullToolInvoker, ToolRegistry};
use ksg_core::{AgentLoop, Config as CoreConfig, Error, Ksg, LearningEngine, ProcedureSubsystem, Result, WorkingMemory};
use ksg_storage_redb::RedbStore;

use crate::config::{CliConfig, StoreBackend};

/// Every component a command handler might need, built once per
/// invocation.
pub struct AppContext {
    pub ksg: Arc<Ksg>,
    pub procedures: Arc<ProcedureSubsystem>,
    pub tools: Arc<ToolRegistry>,
    pub learning: Arc<LearningEngine>,
    pub working_memory: Arc<WorkingMemory>,
    pub queue: Arc<TaskQueue>,
    pub scheduler: Arc<Scheduler>,
    pub agent: AgentLoop,
    pub core_config: CoreConfig,
}

/// Embedding dimension for the CLI's `MockLlmClient` stand-in. Fixed so
/// every concept created via `ksg-cli` embeds at the same dimension
/// regardless of which store backs it.
const CLI_EMBEDDING_DIM: usize = 32;

impl AppContext {
    pub async fn build(cli_config: &CliConfig) -> Result<Self> {
        let core_config = cli_config.core_config();

        let store: Arc<dyn MemoryStore> = match cli_config.backend {
            StoreBackend::Memory => Arc::new(InMemoryStore::new()),
            StoreBackend::Redb => {
                let path = core_config
                    .store_path
                    .clone()
                    .ok_or_else(|| Error::InvalidInput("backend = redb requires a store_path".into()))?;
                Arc::new(RedbStore::open(Path::new(&path)).await?)
            }
        };

        let llm = Arc::new(MockLlmClient::new(CLI_EMBEDDING_DIM));
        let ksg = Arc::new(Ksg::new(store, llm, CLI_EMBEDDING_DIM));
        ksg_core::seed::seed_prototypes(&ksg).await?;

        let tools = Arc::new(ToolRegistry::with_canonical_tools(Arc::new(NullToolInvoker)));
        let procedures = Arc::new(ProcedureSubsystem::new(Arc::clone(&ksg), Arc::clone(&tools)));
        let learning = Arc::new(LearningEngine::new(Arc::clone(&ksg)));
        let working_memory = Arc::new(WorkingMemory::new(core_config.working_memory_config()));
        let queue = Arc::new(TaskQueue::new(Arc::clone(&ksg), "default").await?);
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&queue)));

        let agent = AgentLoop::new(
            Arc::clone(&ksg),
            Arc::clone(&procedures),
            Arc::clone(&tools),
            Arc::clone(&learning),
            Arc::clone(&working_memory),
            core_config.clone(),
        );

        Ok(Self {
            ksg,
            procedures,
            tools,
            learning,
            working_memory,
            queue,
            scheduler,
            agent,
            core_config,
        })
    }
}
