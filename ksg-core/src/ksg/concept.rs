use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::{Entity, SearchFilter};
use crate::types::{rel, Edge, Node, NodeKind, Provenance};

use super::hydration::hydrate_props;
use super::Ksg;

/// Keywords that, when present in a query, signal the caller wants a
/// recall-style answer (spec §9, resolved Open Question #2): Person/Name
/// concepts are excluded from ranking for these queries so an unrelated
/// "what's my name" lookup can't hijack a procedure/recall request.
const RECALL_KEYWORDS: &[&str] = &["recall", "steps", "procedure", "note", "concept"];

#[must_use]
pub fn is_recall_query(query: &str) -> bool {
    let lower = query.to_lowercase();
    RECALL_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

impl Ksg {
    /// `createConcept(prototypeUuid, json, embedding?, previousVersionUuid?)
    /// -> uuid` (spec §4.2). Auto-embeds via the injected LLM when no
    /// embedding is supplied.
    pub async fn create_concept(
        &self,
        prototype_id: Uuid,
        props: Map<String, Value>,
        embedding: Option<Vec<f32>>,
        previous_version_id: Option<Uuid>,
    ) -> Result<Uuid> {
        let prototype = self
            .store
            .get_node(prototype_id)
            .await?
            .ok_or(Error::NotFound(prototype_id))?;
        if prototype.kind != NodeKind::Prototype.as_str() {
            return Err(Error::InvalidInput(format!(
                "{prototype_id} is not a Prototype"
            )));
        }

        let trace_id = Uuid::new_v4();
        let embedding = match embedding {
            Some(e) => e,
            None => {
                let text = concept_embedding_text(&prototype, &props);
                self.llm.embed(&text).await?
            }
        };

        let mut node = Node::new(
            NodeKind::Concept.as_str(),
            Provenance::new("ksg.create_concept", trace_id),
        )
        .with_props(props)
        .with_embedding(embedding);
        node.props.insert("isPrototype".into(), Value::Bool(false));
        let concept_id = node.id;
        self.store.upsert(Entity::Node(node)).await?;

        let instance_edge = Edge::new(
            concept_id,
            prototype_id,
            rel::INSTANCE_OF,
            Provenance::new("ksg.create_concept", trace_id),
        );
        self.store.upsert(Entity::Edge(instance_edge)).await?;

        if let Some(prev) = previous_version_id {
            let version_edge = Edge::new(
                prev,
                concept_id,
                rel::NEXT_VERSION,
                Provenance::new("ksg.create_concept", trace_id),
            );
            self.store.upsert(Entity::Edge(version_edge)).await?;
        }

        Ok(concept_id)
    }

    /// `updateProperties(uuid, map)` — shallow-merge into props (spec
    /// §4.2).
    pub async fn update_properties(&self, concept_id: Uuid, patch: Map<String, Value>) -> Result<()> {
        let mut node = self
            .store
            .get_node(concept_id)
            .await?
            .ok_or(Error::NotFound(concept_id))?;
        node.merge_props(patch);
        self.store.upsert(Entity::Node(node)).await
    }

    /// `searchConcepts(query, topK, prototypeFilter?, minSimilarity?,
    /// hydrate?) -> [concept]` (spec §4.2).
    pub async fn search_concepts(
        &self,
        query: &str,
        top_k: usize,
        prototype_filter: Option<Uuid>,
        min_similarity: f32,
        hydrate: bool,
    ) -> Result<Vec<Node>> {
        let query_embedding = self.llm.embed(query).await?;
        let filter = SearchFilter::by_kind(NodeKind::Concept.as_str());
        let hits = self
            .store
            .search(&filter, Some(&query_embedding), top_k.max(1) * 4, min_similarity)
            .await?;

        let recall = is_recall_query(query);
        let mut results = Vec::new();
        for scored in hits {
            if results.len() >= top_k {
                break;
            }
            let node = scored.node;
            if recall && is_person_or_name(&node) {
                continue;
            }
            if let Some(proto) = prototype_filter {
                let instance_of = self
                    .store
                    .edges_from(node.id, Some(rel::INSTANCE_OF))
                    .await?;
                if !instance_of.iter().any(|e| e.to == proto) {
                    continue;
                }
            }
            if hydrate {
                let hydrated = self.hydrate_concept(&node).await?;
                results.push(hydrated);
            } else {
                results.push(node);
            }
        }
        Ok(results)
    }

    /// Walks `instanceOf` then `inherits*` parents and merges PropertyDef
    /// defaults under instance values, child overriding parent (spec
    /// §4.2's hydration algorithm).
    pub async fn hydrate_concept(&self, concept: &Node) -> Result<Node> {
        let instance_of = self.store.edges_from(concept.id, Some(rel::INSTANCE_OF)).await?;
        let Some(proto_edge) = instance_of.first() else {
            return Ok(concept.clone());
        };
        let chain = self.prototype_chain(proto_edge.to).await?;
        let mut hydrated = concept.clone();
        hydrated.props = hydrate_props(&concept.props, &chain);
        Ok(hydrated)
    }

    /// Returns the prototype and all its `inherits*` ancestors, nearest
    /// first.
    async fn prototype_chain(&self, prototype_id: Uuid) -> Result<Vec<Node>> {
        let mut chain = Vec::new();
        let mut current = Some(prototype_id);
        let mut seen = std::collections::HashSet::new();
        while let Some(id) = current {
            if !seen.insert(id) {
                break;
            }
            let Some(node) = self.store.get_node(id).await? else {
                break;
            };
            let parent = self
                .store
                .edges_from(id, Some(rel::INHERITS))
                .await?
                .into_iter()
                .next()
                .map(|e| e.to);
            chain.push(node);
            current = parent;
        }
        Ok(chain)
    }
}

fn concept_embedding_text(prototype: &Node, props: &Map<String, Value>) -> String {
    let name = prototype.get_str("name").unwrap_or("Concept");
    let body = Value::Object(props.clone()).to_string();
    format!("{name}: {body}")
}

fn is_person_or_name(node: &Node) -> bool {
    node.labels
        .iter()
        .any(|l| l.eq_ignore_ascii_case("Person") || l.eq_ignore_ascii_case("Name"))
        || node.get_str("name").is_some() && node.labels.is_empty() && node.kind == NodeKind::Concept.as_str()
            && node.props.contains_key("fullName")
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
    async fn create_concept_links_instance_of_and_auto_embeds() {
        let k = ksg();
        let proto = k.create_prototype("Procedure", None, vec![]).await.unwrap();
        let mut props = Map::new();
        props.insert("name".into(), json!("Login to example.com"));
        let concept_id = k.create_concept(proto, props, None, None).await.unwrap();
        let node = k.store.get_node(concept_id).await.unwrap().unwrap();
        assert!(node.embedding.is_some());
        let edges = k.store.edges_from(concept_id, Some(rel::INSTANCE_OF)).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].to, proto);
    }

    #[tokio::test]
    async fn update_properties_merges_without_clobbering_unrelated_keys() {
        let k = ksg();
        let proto = k.create_prototype("Procedure", None, vec![]).await.unwrap();
        let mut props = Map::new();
        props.insert("a".into(), json!(1));
        let id = k.create_concept(proto, props, None, None).await.unwrap();
        let mut patch = Map::new();
        patch.insert("b".into(), json!(2));
        k.update_properties(id, patch).await.unwrap();
        let node = k.store.get_node(id).await.unwrap().unwrap();
        assert_eq!(node.get_f64("a"), Some(1.0));
        assert_eq!(node.get_f64("b"), Some(2.0));
    }

    #[test]
    fn recall_keywords_detected() {
        assert!(is_recall_query("recall the steps for login"));
        assert!(!is_recall_query("what is my name"));
    }
}
