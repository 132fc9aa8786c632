use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::node::NodeStatus;
use super::Provenance;

/// A first-class edge (spec §3): source, target, predicate, weight,
/// confidence, and governance counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: Uuid,
    pub from: Uuid,
    pub to: Uuid,
    pub rel: String,
    pub property_def: Option<String>,
    pub weight: f32,
    pub confidence: f32,
    pub status: NodeStatus,
    pub votes_up: u32,
    pub votes_down: u32,
    pub recall_count: u32,
    pub props: Map<String, Value>,
    pub provenance: Provenance,
}

impl Edge {
    #[must_use]
    pub fn new(from: Uuid, to: Uuid, rel: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            id: Uuid::new_v4(),
            from,
            to,
            rel: rel.into(),
            property_def: None,
            weight: 1.0,
            confidence: 1.0,
            status: NodeStatus::Active,
            votes_up: 0,
            votes_down: 0,
            recall_count: 0,
            props: Map::new(),
            provenance,
        }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_props(mut self, props: Map<String, Value>) -> Self {
        self.props = props;
        self
    }

    /// Matches the triple `(from, to, rel)` used by `addAssociation`'s
    /// dedup check (spec §4.2).
    #[must_use]
    pub fn matches_triple(&self, from: Uuid, to: Uuid, rel: &str) -> bool {
        self.from == from && self.to == to && self.rel == rel
    }
}
