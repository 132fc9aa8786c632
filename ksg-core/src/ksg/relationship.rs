//! First-class relationships (spec §4.2, §9 "First-class relationships"):
//! an edge that must itself be searchable is materialized as a
//! Relationship Concept plus two ordinary connecting edges.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::{Entity, SearchFilter};
use crate::types::{rel, Edge, Node, NodeKind, Provenance};

use super::Ksg;

/// A scored hit from `findSimilarPatterns`.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub concept: Node,
    pub score: f32,
}

/// Result of `transferPattern`: the source pattern plus an LLM-adapted
/// description for the new context. Materializing it as a concept is the
/// caller's decision (spec §4.2 leaves this to callers).
#[derive(Debug, Clone)]
pub struct TransferredPattern {
    pub source_id: Uuid,
    pub adapted_description: String,
}

impl Ksg {
    /// `createRelationship(fromUuid, toUuid, relType, properties?,
    /// embedding?) -> uuid` (spec §4.2). Materializes a Relationship
    /// Concept plus `hasOutgoing` (relationship -> from) and `pointsTo`
    /// (relationship -> to) edges.
    pub async fn create_relationship(
        &self,
        from: Uuid,
        to: Uuid,
        rel_type: &str,
        properties: Option<Map<String, Value>>,
        embedding: Option<Vec<f32>>,
    ) -> Result<Uuid> {
        let from_node = self.store.get_node(from).await?.ok_or(Error::NotFound(from))?;
        let to_node = self.store.get_node(to).await?.ok_or(Error::NotFound(to))?;

        let embedding = match embedding {
            Some(e) => e,
            None => {
                let from_label = from_node.get_str("name").unwrap_or("node");
                let to_label = to_node.get_str("name").unwrap_or("node");
                let canonical = format!("{rel_type}: {from_label} \u{2192} {to_label}");
                self.llm.embed(&canonical).await?
            }
        };

        let trace_id = Uuid::new_v4();
        let mut props = properties.unwrap_or_default();
        props.insert("relType".into(), Value::String(rel_type.to_string()));
        props.insert("fromId".into(), Value::String(from.to_string()));
        props.insert("toId".into(), Value::String(to.to_string()));

        let mut node = Node::new(
            NodeKind::Relationship.as_str(),
            Provenance::new("ksg.create_relationship", trace_id),
        )
        .with_props(props)
        .with_embedding(embedding);
        node.labels.push(rel_type.to_string());
        let rel_id = node.id;
        self.store.upsert(Entity::Node(node)).await?;

        let outgoing = Edge::new(rel_id, from, rel::HAS_OUTGOING, Provenance::new("ksg.create_relationship", trace_id));
        self.store.upsert(Entity::Edge(outgoing)).await?;
        let points_to = Edge::new(rel_id, to, rel::POINTS_TO, Provenance::new("ksg.create_relationship", trace_id));
        self.store.upsert(Entity::Edge(points_to)).await?;

        Ok(rel_id)
    }

    /// `searchRelationships(query, relType?, topK)` (spec §4.2): searching
    /// relationships is searching concepts of `kind=Relationship` (spec
    /// §9).
    pub async fn search_relationships(
        &self,
        query: &str,
        rel_type: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<Node>> {
        let query_embedding = self.llm.embed(query).await?;
        let mut filter = SearchFilter::by_kind(NodeKind::Relationship.as_str());
        if let Some(rel_type) = rel_type {
            filter.labels.push(rel_type.to_string());
        }
        let hits = self.store.search(&filter, Some(&query_embedding), top_k, 0.0).await?;
        Ok(hits.into_iter().map(|s| s.node).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::store::InMemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn ksg() -> Ksg {
        Ksg::new(Arc::new(InMemoryStore::new()), Arc::new(MockLlmClient::default()), 16)
    }

    #[tokio::test]
    async fn create_relationship_materializes_concept_and_edges() {
        let k = ksg();
        let proto = k.create_prototype("Procedure", None, vec![]).await.unwrap();
        let mut props_a = Map::new();
        props_a.insert("name".into(), json!("A"));
        let a = k.create_concept(proto, props_a, None, None).await.unwrap();
        let mut props_b = Map::new();
        props_b.insert("name".into(), json!("B"));
        let b = k.create_concept(proto, props_b, None, None).await.unwrap();

        let rel_id = k.create_relationship(a, b, "callsProcedure", None, None).await.unwrap();
        let rel_node = k.store.get_node(rel_id).await.unwrap().unwrap();
        assert_eq!(rel_node.kind, "Relationship");

        let outgoing = k.store.edges_from(rel_id, Some(rel::HAS_OUTGOING)).await.unwrap();
        assert_eq!(outgoing[0].to, a);
        let points_to = k.store.edges_from(rel_id, Some(rel::POINTS_TO)).await.unwrap();
        assert_eq!(points_to[0].to, b);
    }

    #[tokio::test]
    async fn search_relationships_finds_by_kind() {
        let k = ksg();
        let proto = k.create_prototype("Procedure", None, vec![]).await.unwrap();
        let a = k.create_concept(proto, Map::new(), None, None).await.unwrap();
        let b = k.create_concept(proto, Map::new(), None, None).await.unwrap();
        k.create_relationship(a, b, "dependsOn", None, None).await.unwrap();
        let results = k.search_relationships("dependsOn relationship", None, 5).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
