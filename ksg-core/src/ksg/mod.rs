//! KSG — the fuzzy ontology / knowledge-graph component (C2, spec §4.2).
//!
//! A prototype-and-instance graph with embedding-based similarity search,
//! first-class relationships, and centroid-drift embeddings. `Ksg` wraps a
//! [`MemoryStore`] and an [`LlmClient`] and exposes the public contract
//! listed in spec §4.2.

mod association;
mod concept;
mod exemplar;
mod hydration;
mod prototype;
mod relationship;

pub use hydration::hydrate_props;
pub use relationship::{PatternMatch, TransferredPattern};

use std::sync::Arc;

use crate::llm::LlmClient;
use crate::store::MemoryStore;

/// Threshold at which `recordPatternSuccess` triggers `autoGeneralize`
/// (spec §4.2, default 2).
pub const DEFAULT_GENERALIZE_SUCCESS_THRESHOLD: u32 = 2;

/// Default similarity floor for exemplars contributing to a generalized
/// concept (spec §4.2).
pub const DEFAULT_GENERALIZE_MIN_SIMILARITY: f32 = 0.7;

/// The knowledge graph / fuzzy ontology service.
pub struct Ksg {
    pub(crate) store: Arc<dyn MemoryStore>,
    pub(crate) llm: Arc<dyn LlmClient>,
    pub(crate) embedding_dim: usize,
}

impl Ksg {
    #[must_use]
    pub fn new(store: Arc<dyn MemoryStore>, llm: Arc<dyn LlmClient>, embedding_dim: usize) -> Self {
        Self {
            store,
            llm,
            embedding_dim,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }
}
