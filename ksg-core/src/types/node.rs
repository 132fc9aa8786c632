use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::Provenance;

/// Lifecycle status of a node (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Active,
    Deleted,
    Deprecated,
}

/// A node in the knowledge graph: a prototype, concept, property
/// definition, or any other kind listed in [`super::NodeKind`].
///
/// `kind` is stored as a plain string (rather than the closed
/// [`super::NodeKind`] enum) so a pluggable [`crate::store::MemoryStore`]
/// need not know the vocabulary — the core is the only thing that
/// interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub kind: String,
    pub labels: Vec<String>,
    pub props: Map<String, Value>,
    pub embedding: Option<Vec<f32>>,
    pub status: NodeStatus,
    pub provenance: Provenance,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    #[must_use]
    pub fn new(kind: impl Into<String>, provenance: Provenance) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            labels: Vec::new(),
            props: Map::new(),
            embedding: None,
            status: NodeStatus::Active,
            provenance,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    #[must_use]
    pub fn with_props(mut self, props: Map<String, Value>) -> Self {
        self.props = props;
        self
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Shallow-merges `patch` into `props` and bumps `updated_at`, per
    /// `updateProperties` (spec §4.2).
    pub fn merge_props(&mut self, patch: Map<String, Value>) {
        for (k, v) in patch {
            self.props.insert(k, v);
        }
        self.updated_at = Utc::now();
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.props.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.props.get(key).and_then(Value::as_f64)
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_props_bumps_updated_at_and_overwrites_keys() {
        let mut node = Node::new("Concept", Provenance::new("test", Uuid::new_v4()));
        let before = node.updated_at;
        node.props.insert("a".into(), Value::from(1));
        std::thread::sleep(std::time::Duration::from_millis(2));
        let mut patch = Map::new();
        patch.insert("a".into(), Value::from(2));
        patch.insert("b".into(), Value::from("x"));
        node.merge_props(patch);
        assert_eq!(node.get_f64("a"), Some(2.0));
        assert_eq!(node.get_str("b"), Some("x"));
        assert!(node.updated_at >= before);
    }
}
