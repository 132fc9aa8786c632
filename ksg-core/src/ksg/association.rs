use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Result;
use crate::store::Entity;
use crate::types::{Edge, Provenance};

use super::Ksg;

impl Ksg {
    /// `addAssociation(fromUuid, toUuid, relation, strength=1.0, props?)`
    /// (spec §4.2). If the triple already exists, increments its
    /// `recallCount` instead of creating a duplicate edge.
    pub async fn add_association(
        &self,
        from: Uuid,
        to: Uuid,
        relation: &str,
        strength: f32,
        props: Option<Map<String, Value>>,
    ) -> Result<Uuid> {
        let existing = self.store.edges_from(from, Some(relation)).await?;
        if let Some(mut edge) = existing.into_iter().find(|e| e.matches_triple(from, to, relation)) {
            edge.recall_count += 1;
            let id = edge.id;
            self.store.upsert(Entity::Edge(edge)).await?;
            return Ok(id);
        }

        let trace_id = Uuid::new_v4();
        let mut edge = Edge::new(from, to, relation, Provenance::new("ksg.add_association", trace_id))
            .with_weight(strength);
        if let Some(props) = props {
            edge = edge.with_props(props);
        }
        let id = edge.id;
        self.store.upsert(Entity::Edge(edge)).await?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::store::InMemoryStore;
    use std::sync::Arc;

    fn ksg() -> Ksg {
        Ksg::new(Arc::new(InMemoryStore::new()), Arc::new(MockLlmClient::default()), 16)
    }

    #[tokio::test]
    async fn repeated_association_increments_recall_count_not_duplicate() {
        let k = ksg();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let e1 = k.add_association(a, b, "associatedWith", 1.0, None).await.unwrap();
        let e2 = k.add_association(a, b, "associatedWith", 1.0, None).await.unwrap();
        assert_eq!(e1, e2);
        let edges = k.store.edges_from(a, Some("associatedWith")).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].recall_count, 1);
    }

    #[tokio::test]
    async fn distinct_targets_create_distinct_edges() {
        let k = ksg();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        k.add_association(a, b, "associatedWith", 1.0, None).await.unwrap();
        k.add_association(a, c, "associatedWith", 1.0, None).await.unwrap();
        let edges = k.store.edges_from(a, Some("associatedWith")).await.unwrap();
        assert_eq!(edges.len(), 2);
    }
}
