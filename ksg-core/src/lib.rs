//! Core of the procedural learning agent (SPEC_FULL §2): the knowledge
//! graph / fuzzy ontology, procedure subsystem, form engine, task queue,
//! scheduler, working memory, deterministic parser, learning engine, and
//! the agent loop that ties them together.
//!
//! External collaborators — the LLM provider, the physical tool/browser
//! adapters, the HTTP surface, and the durable store — are consumed only
//! through the narrow traits declared here ([`llm::LlmClient`],
//! [`tools::ToolInvoker`], [`store::MemoryStore`], [`replicator::AsyncReplicator`]).
//! `ksg-storage-redb` provides the durable [`store::MemoryStore`]
//! implementation; `ksg-cli` wires a concrete deployment.

pub mod agent;
pub mod config;
pub mod error;
pub mod form;
pub mod ksg;
pub mod learning;
pub mod llm;
pub mod parser;
pub mod procedure;
pub mod queue;
pub mod replicator;
pub mod scheduler;
pub mod seed;
pub mod store;
pub mod tools;
pub mod types;
pub mod working_memory;

pub use agent::{AgentLoop, AgentOutcome, StepState};
pub use config::Config;
pub use error::{Error, Result};
pub use ksg::Ksg;
pub use learning::LearningEngine;
pub use procedure::ProcedureSubsystem;
pub use queue::TaskQueue;
pub use scheduler::Scheduler;
pub use store::{InMemoryStore, MemoryStore};
pub use tools::ToolRegistry;
pub use working_memory::WorkingMemory;
