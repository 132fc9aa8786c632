//! redb-backed durable [`MemoryStore`] (spec §4.1, §6.5): the persistent
//! counterpart to `ksg_core::store::InMemoryStore`, giving equivalent
//! search/upsert semantics backed by an embedded on-disk database instead
//! of an in-process adjacency list.
//!
//! Layout (spec §6.5 "nodes and edges, both keyed by UUID... indexes
//! required: by kind, by labels membership, by (kind, prop key→value) for
//! exact filters, and an ANN or brute-force vector index over embeddings
//! partitioned by kind"): nodes and edges are stored postcard-encoded,
//! keyed by UUID string. A `kind -> node id` multimap index partitions the
//! brute-force similarity scan so a `search` with a kind filter never
//! touches nodes of other kinds; label and property predicates are
//! evaluated in-process against [`ksg_core::store::SearchFilter::matches`]
//! over that narrowed candidate set, same as the in-memory backend.

mod tables;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, ReadableMultimapTable};
use uuid::Uuid;

use ksg_core::error::{Error, Result};
use ksg_core::store::{cosine_similarity, Entity, MemoryStore, ScoredNode, SearchFilter};
use ksg_core::types::{Edge, Node, NodeStatus};

use tables::{EDGES_FROM_INDEX, EDGES_TABLE, EDGES_TO_INDEX, NODES_TABLE, NODE_KIND_INDEX};

/// Durable [`MemoryStore`] implementation backed by a single redb file.
///
/// All blocking redb calls run on `tokio::task::spawn_blocking` so callers
/// never stall the async runtime on disk I/O (spec §5: "any external
/// call... may suspend").
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Opens (creating if absent) a redb database at `path` and ensures
    /// every table exists.
    pub async fn open(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        let db = tokio::task::spawn_blocking(move || -> Result<Database> {
            let db = Database::create(&path)
                .map_err(|e| Error::Storage(format!("redb open failed: {e}")))?;
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Storage(format!("redb begin_write failed: {e}")))?;
            {
                write_txn.open_table(NODES_TABLE).map_err(storage_err)?;
                write_txn.open_table(EDGES_TABLE).map_err(storage_err)?;
                write_txn.open_multimap_table(NODE_KIND_INDEX).map_err(storage_err)?;
                write_txn.open_multimap_table(EDGES_FROM_INDEX).map_err(storage_err)?;
                write_txn.open_multimap_table(EDGES_TO_INDEX).map_err(storage_err)?;
            }
            write_txn.commit().map_err(storage_err)?;
            Ok(db)
        })
        .await
        .map_err(join_err)??;

        Ok(Self { db: Arc::new(db) })
    }

    fn encode_node(node: &Node) -> Result<Vec<u8>> {
        postcard::to_allocvec(node).map_err(|e| Error::Storage(format!("node encode: {e}")))
    }

    fn decode_node(bytes: &[u8]) -> Result<Node> {
        postcard::from_bytes(bytes).map_err(|e| Error::Storage(format!("node decode: {e}")))
    }

    fn encode_edge(edge: &Edge) -> Result<Vec<u8>> {
        postcard::to_allocvec(edge).map_err(|e| Error::Storage(format!("edge encode: {e}")))
    }

    fn decode_edge(bytes: &[u8]) -> Result<Edge> {
        postcard::from_bytes(bytes).map_err(|e| Error::Storage(format!("edge decode: {e}")))
    }

    fn rank(candidates: Vec<Node>, query_embedding: Option<&[f32]>, top_k: usize, min_similarity: f32) -> Vec<ScoredNode> {
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
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.node.updated_at.cmp(&a.node.updated_at))
                    .then_with(|| a.node.id.cmp(&b.node.id))
            });
            scored.truncate(top_k);
            scored
        } else {
            let mut candidates = candidates;
            candidates.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
            candidates.truncate(top_k);
            candidates.into_iter().map(|node| ScoredNode { node, score: 0.0 }).collect()
        }
    }
}

fn storage_err(e: impl std::fmt::Display) -> Error {
    Error::Storage(format!("redb: {e}"))
}

fn join_err(e: tokio::task::JoinError) -> Error {
    Error::Storage(format!("redb task join: {e}"))
}

#[async_trait]
impl MemoryStore for RedbStore {
    async fn upsert(&self, entity: Entity) -> Result<()> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let write_txn = db.begin_write().map_err(storage_err)?;
            match entity {
                Entity::Node(node) => {
                    let bytes = RedbStore::encode_node(&node)?;
                    let id = node.id.to_string();
                    {
                        let mut table = write_txn.open_table(NODES_TABLE).map_err(storage_err)?;
                        table.insert(id.as_str(), bytes.as_slice()).map_err(storage_err)?;
                    }
                    {
                        let mut idx = write_txn.open_multimap_table(NODE_KIND_INDEX).map_err(storage_err)?;
                        idx.insert(node.kind.as_str(), id.as_str()).map_err(storage_err)?;
                    }
                }
                Entity::Edge(edge) => {
                    let bytes = RedbStore::encode_edge(&edge)?;
                    let id = edge.id.to_string();
                    let from = edge.from.to_string();
                    let to = edge.to.to_string();
                    {
                        let mut table = write_txn.open_table(EDGES_TABLE).map_err(storage_err)?;
                        table.insert(id.as_str(), bytes.as_slice()).map_err(storage_err)?;
                    }
                    {
                        let mut from_idx = write_txn.open_multimap_table(EDGES_FROM_INDEX).map_err(storage_err)?;
                        from_idx.insert(from.as_str(), id.as_str()).map_err(storage_err)?;
                        let mut to_idx = write_txn.open_multimap_table(EDGES_TO_INDEX).map_err(storage_err)?;
                        to_idx.insert(to.as_str(), id.as_str()).map_err(storage_err)?;
                    }
                }
            }
            write_txn.commit().map_err(storage_err)?;
            Ok(())
        })
        .await
        .map_err(join_err)?
    }

    async fn get_node(&self, id: Uuid) -> Result<Option<Node>> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || -> Result<Option<Node>> {
            let read_txn = db.begin_read().map_err(storage_err)?;
            let table = read_txn.open_table(NODES_TABLE).map_err(storage_err)?;
            match table.get(id.to_string().as_str()).map_err(storage_err)? {
                Some(guard) => Ok(Some(RedbStore::decode_node(guard.value())?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(join_err)?
    }

    async fn get_edge(&self, id: Uuid) -> Result<Option<Edge>> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || -> Result<Option<Edge>> {
            let read_txn = db.begin_read().map_err(storage_err)?;
            let table = read_txn.open_table(EDGES_TABLE).map_err(storage_err)?;
            match table.get(id.to_string().as_str()).map_err(storage_err)? {
                Some(guard) => Ok(Some(RedbStore::decode_edge(guard.value())?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(join_err)?
    }

    async fn search(
        &self,
        filter: &SearchFilter,
        query_embedding: Option<&[f32]>,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredNode>> {
        let db = Arc::clone(&self.db);
        let filter = filter.clone();
        let query_embedding = query_embedding.map(<[f32]>::to_vec);
        tokio::task::spawn_blocking(move || -> Result<Vec<ScoredNode>> {
            let read_txn = db.begin_read().map_err(storage_err)?;
            let table = read_txn.open_table(NODES_TABLE).map_err(storage_err)?;
            let candidates: Vec<Node> = if let Some(kind) = &filter.kind {
                let idx = read_txn.open_multimap_table(NODE_KIND_INDEX).map_err(storage_err)?;
                let mut out = Vec::new();
                for entry in idx.get(kind.as_str()).map_err(storage_err)? {
                    let id_str = entry.map_err(storage_err)?;
                    if let Some(guard) = table.get(id_str.value()).map_err(storage_err)? {
                        let node = RedbStore::decode_node(guard.value())?;
                        if filter.matches(&node) {
                            out.push(node);
                        }
                    }
                }
                out
            } else {
                let mut out = Vec::new();
                for entry in table.iter().map_err(storage_err)? {
                    let (_, guard) = entry.map_err(storage_err)?;
                    let node = RedbStore::decode_node(guard.value())?;
                    if filter.matches(&node) {
                        out.push(node);
                    }
                }
                out
            };
            Ok(RedbStore::rank(candidates, query_embedding.as_deref(), top_k, min_similarity))
        })
        .await
        .map_err(join_err)?
    }

    async fn edges_from(&self, node_id: Uuid, rel: Option<&str>) -> Result<Vec<Edge>> {
        let db = Arc::clone(&self.db);
        let rel = rel.map(str::to_string);
        tokio::task::spawn_blocking(move || -> Result<Vec<Edge>> {
            let read_txn = db.begin_read().map_err(storage_err)?;
            let edges_table = read_txn.open_table(EDGES_TABLE).map_err(storage_err)?;
            let idx = read_txn.open_multimap_table(EDGES_FROM_INDEX).map_err(storage_err)?;
            let mut out = Vec::new();
            for entry in idx.get(node_id.to_string().as_str()).map_err(storage_err)? {
                let id_str = entry.map_err(storage_err)?;
                if let Some(guard) = edges_table.get(id_str.value()).map_err(storage_err)? {
                    let edge = RedbStore::decode_edge(guard.value())?;
                    if rel.as_deref().is_none_or(|r| edge.rel == r) {
                        out.push(edge);
                    }
                }
            }
            Ok(out)
        })
        .await
        .map_err(join_err)?
    }

    async fn edges_to(&self, node_id: Uuid, rel: Option<&str>) -> Result<Vec<Edge>> {
        let db = Arc::clone(&self.db);
        let rel = rel.map(str::to_string);
        tokio::task::spawn_blocking(move || -> Result<Vec<Edge>> {
            let read_txn = db.begin_read().map_err(storage_err)?;
            let edges_table = read_txn.open_table(EDGES_TABLE).map_err(storage_err)?;
            let idx = read_txn.open_multimap_table(EDGES_TO_INDEX).map_err(storage_err)?;
            let mut out = Vec::new();
            for entry in idx.get(node_id.to_string().as_str()).map_err(storage_err)? {
                let id_str = entry.map_err(storage_err)?;
                if let Some(guard) = edges_table.get(id_str.value()).map_err(storage_err)? {
                    let edge = RedbStore::decode_edge(guard.value())?;
                    if rel.as_deref().is_none_or(|r| edge.rel == r) {
                        out.push(edge);
                    }
                }
            }
            Ok(out)
        })
        .await
        .map_err(join_err)?
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let write_txn = db.begin_write().map_err(storage_err)?;
            {
                let mut table = write_txn.open_table(NODES_TABLE).map_err(storage_err)?;
                let id_str = id.to_string();
                if let Some(guard) = table.get(id_str.as_str()).map_err(storage_err)? {
                    let mut node = RedbStore::decode_node(guard.value())?;
                    node.status = NodeStatus::Deleted;
                    let bytes = RedbStore::encode_node(&node)?;
                    drop(guard);
                    table.insert(id_str.as_str(), bytes.as_slice()).map_err(storage_err)?;
                }
            }
            write_txn.commit().map_err(storage_err)?;
            Ok(())
        })
        .await
        .map_err(join_err)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksg_core::types::Provenance;

    async fn open_tmp() -> (RedbStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ksg.redb");
        (RedbStore::open(&path).await.unwrap(), dir)
    }

    fn node(kind: &str, embedding: Option<Vec<f32>>) -> Node {
        let mut n = Node::new(kind, Provenance::new("test", Uuid::new_v4()));
        n.embedding = embedding;
        n
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let (store, _dir) = open_tmp().await;
        let n = node("Concept", None);
        let id = n.id;
        store.upsert(n.into()).await.unwrap();
        let fetched = store.get_node(id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
    }

    #[tokio::test]
    async fn search_is_scoped_by_kind_index() {
        let (store, _dir) = open_tmp().await;
        let concept = node("Concept", Some(vec![1.0, 0.0]));
        let prototype = node("Prototype", Some(vec![1.0, 0.0]));
        store.upsert(concept.clone().into()).await.unwrap();
        store.upsert(prototype.into()).await.unwrap();

        let filter = SearchFilter::by_kind("Concept");
        let results = store.search(&filter, Some(&[1.0, 0.0]), 10, 0.0).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node.id, concept.id);
    }

    #[tokio::test]
    async fn search_ranks_by_similarity_and_truncates() {
        let (store, _dir) = open_tmp().await;
        let a = node("Concept", Some(vec![1.0, 0.0]));
        let b = node("Concept", Some(vec![0.9, 0.1]));
        let c = node("Concept", Some(vec![0.0, 1.0]));
        for n in [a, b, c] {
            store.upsert(n.into()).await.unwrap();
        }
        let results = store
            .search(&SearchFilter::by_kind("Concept"), Some(&[1.0, 0.0]), 2, 0.0)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn edges_from_and_to_respect_rel_filter() {
        let (store, _dir) = open_tmp().await;
        let a = node("Concept", None);
        let b = node("Concept", None);
        let (a_id, b_id) = (a.id, b.id);
        store.upsert(a.into()).await.unwrap();
        store.upsert(b.into()).await.unwrap();
        let edge = Edge::new(a_id, b_id, "instanceOf", Provenance::new("test", Uuid::new_v4()));
        store.upsert(edge.into()).await.unwrap();

        let out = store.edges_from(a_id, Some("instanceOf")).await.unwrap();
        assert_eq!(out.len(), 1);
        let none = store.edges_from(a_id, Some("dependsOn")).await.unwrap();
        assert!(none.is_empty());
        let into = store.edges_to(b_id, None).await.unwrap();
        assert_eq!(into.len(), 1);
    }

    #[tokio::test]
    async fn soft_delete_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ksg.redb");
        let n = node("Concept", None);
        let id = n.id;
        {
            let store = RedbStore::open(&path).await.unwrap();
            store.upsert(n.into()).await.unwrap();
            store.soft_delete(id).await.unwrap();
        }
        let store = RedbStore::open(&path).await.unwrap();
        let fetched = store.get_node(id).await.unwrap().unwrap();
        assert_eq!(fetched.status, NodeStatus::Deleted);
    }
}
