//! Memory store (C1, spec §4.1): a pluggable node/edge store with two
//! operations, `search` and `upsert`. [`InMemoryStore`] is the required
//! adjacency-list backend used by the core's tests and by default; durable
//! backends (e.g. `ksg-storage-redb`) implement the same trait.

mod memory;
mod similarity;

pub use memory::InMemoryStore;
pub use similarity::cosine_similarity;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{Edge, Node};

/// An entity the store can persist: either a [`Node`] or an [`Edge`].
#[derive(Debug, Clone)]
pub enum Entity {
    Node(Node),
    Edge(Edge),
}

impl From<Node> for Entity {
    fn from(n: Node) -> Self {
        Entity::Node(n)
    }
}

impl From<Edge> for Entity {
    fn from(e: Edge) -> Self {
        Entity::Edge(e)
    }
}

/// A property-equality predicate used by [`SearchFilter`].
#[derive(Debug, Clone)]
pub struct PropFilter {
    pub key: String,
    pub value: Value,
}

/// Filters applied by `search` before (and independent of) vector ranking.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub kind: Option<String>,
    pub labels: Vec<String>,
    pub props: Vec<PropFilter>,
    pub include_deleted: bool,
}

impl SearchFilter {
    #[must_use]
    pub fn by_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_prop(mut self, key: impl Into<String>, value: Value) -> Self {
        self.props.push(PropFilter {
            key: key.into(),
            value,
        });
        self
    }

    #[must_use]
    pub fn matches(&self, node: &Node) -> bool {
        if !self.include_deleted && !node.is_active() {
            return false;
        }
        if let Some(kind) = &self.kind {
            if &node.kind != kind {
                return false;
            }
        }
        for label in &self.labels {
            if !node.labels.contains(label) {
                return false;
            }
        }
        for pf in &self.props {
            if node.props.get(&pf.key) != Some(&pf.value) {
                return false;
            }
        }
        true
    }
}

/// A search hit: the node plus the rank score that placed it there.
#[derive(Debug, Clone)]
pub struct ScoredNode {
    pub node: Node,
    pub score: f32,
}

/// The pluggable store contract (spec §4.1). Every operation is async so
/// both in-process and durable backends share one interface.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Insert or replace an entity by UUID.
    async fn upsert(&self, entity: Entity) -> Result<()>;

    /// Fetch a single node by id, including soft-deleted ones.
    async fn get_node(&self, id: Uuid) -> Result<Option<Node>>;

    /// Fetch a single edge by id.
    async fn get_edge(&self, id: Uuid) -> Result<Option<Edge>>;

    /// Filtered, optionally vector-ranked search over nodes.
    ///
    /// When `query_embedding` is `Some`, results are ranked by cosine
    /// similarity descending and truncated to `top_k`; ties broken
    /// lexicographically on `updated_at` descending then UUID ascending
    /// for determinism (spec §4.2). Otherwise ranked by most-recent
    /// `updated_at`. Results below `min_similarity` are dropped when a
    /// query embedding was supplied.
    async fn search(
        &self,
        filter: &SearchFilter,
        query_embedding: Option<&[f32]>,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredNode>>;

    /// All edges with `from == node_id` (optionally filtered by `rel`).
    async fn edges_from(&self, node_id: Uuid, rel: Option<&str>) -> Result<Vec<Edge>>;

    /// All edges with `to == node_id` (optionally filtered by `rel`).
    async fn edges_to(&self, node_id: Uuid, rel: Option<&str>) -> Result<Vec<Edge>>;

    /// Soft-deletes a node by setting `status = deleted`.
    async fn soft_delete(&self, id: Uuid) -> Result<()>;
}
