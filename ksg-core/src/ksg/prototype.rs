use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::{Entity, SearchFilter};
use crate::types::{rel, Edge, Node, NodeKind, Provenance, PropertyDef};

use super::Ksg;

impl Ksg {
    /// Finds a prototype node by its human name, active only.
    pub async fn find_prototype_by_name(&self, name: &str) -> Result<Option<Node>> {
        let filter = SearchFilter::by_kind(NodeKind::Prototype.as_str())
            .with_prop("name", Value::String(name.to_string()));
        let hits = self.store.search(&filter, None, 1, 0.0).await?;
        Ok(hits.into_iter().next().map(|s| s.node))
    }

    /// `createPrototype(name, parentName?, propertyDefs?) -> uuid` (spec
    /// §4.2). Fails `AlreadyExists` if the name is taken with a different
    /// property-def set.
    pub async fn create_prototype(
        &self,
        name: &str,
        parent_name: Option<&str>,
        property_defs: Vec<PropertyDef>,
    ) -> Result<Uuid> {
        let defs_json = serde_json::to_value(&property_defs)?;
        if let Some(existing) = self.find_prototype_by_name(name).await? {
            let existing_defs = existing.props.get("propertyDefs").cloned().unwrap_or(Value::Null);
            if existing_defs == defs_json {
                return Ok(existing.id);
            }
            return Err(Error::AlreadyExists(format!(
                "prototype '{name}' already exists with a different property-def set"
            )));
        }

        let trace_id = Uuid::new_v4();
        let mut node = Node::new(
            NodeKind::Prototype.as_str(),
            Provenance::new("ksg.create_prototype", trace_id),
        );
        node.labels.push(name.to_string());
        node.props.insert("name".into(), Value::String(name.to_string()));
        node.props.insert("isPrototype".into(), Value::Bool(true));
        node.props.insert("propertyDefs".into(), defs_json);
        let id = node.id;
        self.store.upsert(Entity::Node(node)).await?;

        if let Some(parent_name) = parent_name {
            let parent = self
                .find_prototype_by_name(parent_name)
                .await?
                .ok_or_else(|| Error::InvalidInput(format!("unknown parent prototype '{parent_name}'")))?;
            self.assert_no_inherits_cycle(id, parent.id).await?;
            let edge = Edge::new(id, parent.id, rel::INHERITS, Provenance::new("ksg.create_prototype", trace_id));
            self.store.upsert(Entity::Edge(edge)).await?;
        }

        Ok(id)
    }

    /// Walks `inherits` edges from `start` and fails `CycleDetected` if
    /// `candidate_parent` is already reachable from `start` (i.e. adding
    /// `start -> candidate_parent` would close a cycle).
    pub(crate) async fn assert_no_inherits_cycle(&self, start: Uuid, candidate_parent: Uuid) -> Result<()> {
        let mut frontier = vec![candidate_parent];
        let mut seen = std::collections::HashSet::new();
        while let Some(current) = frontier.pop() {
            if current == start {
                return Err(Error::CycleDetected(
                    "inherits edge would create a cycle in the prototype DAG".into(),
                ));
            }
            if !seen.insert(current) {
                continue;
            }
            for edge in self.store.edges_from(current, Some(rel::INHERITS)).await? {
                frontier.push(edge.to);
            }
        }
        Ok(())
    }

    /// Looks up the declared property defs for a prototype.
    pub async fn property_defs(&self, prototype_id: Uuid) -> Result<Vec<PropertyDef>> {
        let node = self
            .store
            .get_node(prototype_id)
            .await?
            .ok_or(Error::NotFound(prototype_id))?;
        let defs = node.props.get("propertyDefs").cloned().unwrap_or(json!([]));
        Ok(serde_json::from_value(defs).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::store::InMemoryStore;
    use crate::types::{Cardinality, ValueType};
    use std::sync::Arc;

    fn ksg() -> Ksg {
        Ksg::new(Arc::new(InMemoryStore::new()), Arc::new(MockLlmClient::default()), 16)
    }

    #[tokio::test]
    async fn create_prototype_is_idempotent_for_same_schema() {
        let k = ksg();
        let defs = vec![PropertyDef::new("email", ValueType::String, Cardinality::ExactlyOne)];
        let id1 = k.create_prototype("Credential", None, defs.clone()).await.unwrap();
        let id2 = k.create_prototype("Credential", None, defs).await.unwrap();
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn create_prototype_rejects_conflicting_schema() {
        let k = ksg();
        k.create_prototype("Credential", None, vec![]).await.unwrap();
        let err = k
            .create_prototype(
                "Credential",
                None,
                vec![PropertyDef::new("email", ValueType::String, Cardinality::ExactlyOne)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn inherits_dag_rejects_cycles() {
        let k = ksg();
        let a = k.create_prototype("A", None, vec![]).await.unwrap();
        k.create_prototype("B", Some("A"), vec![]).await.unwrap();
        // Re-parent A under B directly would cycle: A -> B -> A
        let res = k.assert_no_inherits_cycle(a, a).await;
        assert!(res.is_err());
    }
}
