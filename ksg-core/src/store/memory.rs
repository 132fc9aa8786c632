//! In-process adjacency-list [`MemoryStore`] backend, required by spec
//! §4.1 for tests and usable as the default runtime store.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::types::NodeStatus;

use super::{cosine_similarity, Entity, MemoryStore, ScoredNode, SearchFilter};
use crate::types::{Edge, Node};

/// `Send + Sync` in-memory store. Writers serialize through the outer
/// `RwLock`'s write guard (spec §5: per-UUID serialization is satisfied by
/// a single coarse writer lock in the reference backend; durable backends
/// may use finer-grained per-UUID locking).
#[derive(Default)]
pub struct InMemoryStore {
    nodes: RwLock<HashMap<Uuid, Node>>,
    edges: RwLock<HashMap<Uuid, Edge>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn rank(
        &self,
        mut candidates: Vec<Node>,
        query_embedding: Option<&[f32]>,
        top_k: usize,
        min_similarity: f32,
    ) -> Vec<ScoredNode> {
        if let Some(query) = query_embedding {
            let mut scored: Vec<ScoredNode> = candidates
                .into_iter()
                .filter_map(|node| {
                    let score = node
                        .embedding
                        .as_deref()
                        .map_or(0.0, |e| cosine_similarity(e, query));
                    (score >= min_similarity).then_some(ScoredNode { node, score })
                })
                .collect();
            scored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| b.node.updated_at.cmp(&a.node.updated_at))
                    .then_with(|| a.node.id.cmp(&b.node.id))
            });
            scored.truncate(top_k);
            scored
        } else {
            candidates.sort_by(|a, b| {
                b.updated_at
                    .cmp(&a.updated_at)
                    .then_with(|| a.id.cmp(&b.id))
            });
            candidates.truncate(top_k);
            candidates
                .into_iter()
                .map(|node| ScoredNode { node, score: 0.0 })
                .collect()
        }
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn upsert(&self, entity: Entity) -> Result<()> {
        match entity {
            Entity::Node(node) => {
                self.nodes.write().insert(node.id, node);
            }
            Entity::Edge(edge) => {
                self.edges.write().insert(edge.id, edge);
            }
        }
        Ok(())
    }

    async fn get_node(&self, id: Uuid) -> Result<Option<Node>> {
        Ok(self.nodes.read().get(&id).cloned())
    }

    async fn get_edge(&self, id: Uuid) -> Result<Option<Edge>> {
        Ok(self.edges.read().get(&id).cloned())
    }

    async fn search(
        &self,
        filter: &SearchFilter,
        query_embedding: Option<&[f32]>,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredNode>> {
        let candidates: Vec<Node> = self
            .nodes
            .read()
            .values()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect();
        Ok(self.rank(candidates, query_embedding, top_k, min_similarity))
    }

    async fn edges_from(&self, node_id: Uuid, rel: Option<&str>) -> Result<Vec<Edge>> {
        Ok(self
            .edges
            .read()
            .values()
            .filter(|e| e.from == node_id && rel.is_none_or(|r| e.rel == r))
            .cloned()
            .collect())
    }

    async fn edges_to(&self, node_id: Uuid, rel: Option<&str>) -> Result<Vec<Edge>> {
        Ok(self
            .edges
            .read()
            .values()
            .filter(|e| e.to == node_id && rel.is_none_or(|r| e.rel == r))
            .cloned()
            .collect())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        if let Some(node) = self.nodes.write().get_mut(&id) {
            node.status = NodeStatus::Deleted;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Provenance;

    fn node(kind: &str, embedding: Option<Vec<f32>>) -> Node {
        let mut n = Node::new(kind, Provenance::new("test", Uuid::new_v4()));
        n.embedding = embedding;
        n
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let store = InMemoryStore::new();
        let n = node("Concept", None);
        let id = n.id;
        store.upsert(n.into()).await.unwrap();
        let fetched = store.get_node(id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
    }

    #[tokio::test]
    async fn search_ranks_by_similarity_and_truncates() {
        let store = InMemoryStore::new();
        let a = node("Concept", Some(vec![1.0, 0.0]));
        let b = node("Concept", Some(vec![0.9, 0.1]));
        let c = node("Concept", Some(vec![0.0, 1.0]));
        for n in [a, b, c] {
            store.upsert(n.into()).await.unwrap();
        }
        let filter = SearchFilter::by_kind("Concept");
        let results = store
            .search(&filter, Some(&[1.0, 0.0]), 2, 0.0)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn search_without_embedding_orders_by_recency() {
        let store = InMemoryStore::new();
        let n1 = node("Concept", None);
        store.upsert(n1.clone().into()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let mut n2 = node("Concept", None);
        n2.updated_at = chrono::Utc::now();
        store.upsert(n2.clone().into()).await.unwrap();
        let results = store
            .search(&SearchFilter::by_kind("Concept"), None, 10, 0.0)
            .await
            .unwrap();
        assert_eq!(results[0].node.id, n2.id);
    }

    #[tokio::test]
    async fn soft_delete_excluded_unless_requested() {
        let store = InMemoryStore::new();
        let n = node("Concept", None);
        let id = n.id;
        store.upsert(n.into()).await.unwrap();
        store.soft_delete(id).await.unwrap();
        let results = store
            .search(&SearchFilter::by_kind("Concept"), None, 10, 0.0)
            .await
            .unwrap();
        assert!(results.is_empty());
        let mut filter = SearchFilter::by_kind("Concept");
        filter.include_deleted = true;
        let results = store.search(&filter, None, 10, 0.0).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
