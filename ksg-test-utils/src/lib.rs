//! Shared fixtures for `ksg-core` and its storage backends: a seeded
//! [`Ksg`] over an [`InMemoryStore`], deterministic plan JSON, and node/
//! edge builders so every crate's tests construct fixtures the same way.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use uuid::Uuid;

use ksg_core::error::Result;
use ksg_core::ksg::Ksg;
use ksg_core::llm::MockLlmClient;
use ksg_core::procedure::Plan;
use ksg_core::seed::seed_prototypes;
use ksg_core::store::InMemoryStore;
use ksg_core::types::{Edge, Node, Provenance};

/// Embedding dimension used throughout test fixtures.
pub const TEST_EMBEDDING_DIM: usize = 16;

/// Builds a [`Ksg`] over a fresh [`InMemoryStore`] and [`MockLlmClient`],
/// with the canonical prototype catalog already seeded.
pub async fn seeded_ksg() -> Result<Arc<Ksg>> {
    let store = Arc::new(InMemoryStore::new());
    let llm = Arc::new(MockLlmClient::new(TEST_EMBEDDING_DIM));
    let ksg = Arc::new(Ksg::new(store, llm, TEST_EMBEDDING_DIM));
    seed_prototypes(&ksg).await?;
    Ok(ksg)
}

/// A bare active [`Node`] of `kind`, with a deterministic trace id and an
/// optional embedding.
#[must_use]
pub fn test_node(kind: &str, embedding: Option<Vec<f32>>) -> Node {
    let mut node = Node::new(kind, Provenance::new("test-fixture", Uuid::new_v4()));
    node.embedding = embedding;
    node
}

/// A bare [`Node`] with props set from the given key/value pairs.
#[must_use]
pub fn test_node_with_props(kind: &str, props: Vec<(&str, Value)>) -> Node {
    let mut map = Map::new();
    for (k, v) in props {
        map.insert(k.to_string(), v);
    }
    test_node(kind, None).with_props(map)
}

/// A bare [`Edge`] between two nodes with `rel`, full weight and
/// confidence.
#[must_use]
pub fn test_edge(from: Uuid, to: Uuid, rel: &str) -> Edge {
    Edge::new(from, to, rel, Provenance::new("test-fixture", Uuid::new_v4()))
}

/// A minimal one-step login plan: `web.fill` an email then a password
/// field, used across procedure/agent-loop tests (mirrors spec §8 S1).
#[must_use]
pub fn login_plan(name: &str, email_selector: &str, password_selector: &str) -> Plan {
    serde_json::from_value(json!({
        "name": name,
        "description": "log into a site with email and password",
        "steps": [
            {
                "id": "fill_email",
                "name": "fill email",
                "tool": "web.fill",
                "params": { "url": "https://example.com", "selector": email_selector, "text": "ada@example.com" },
                "depends_on": []
            },
            {
                "id": "fill_password",
                "name": "fill password",
                "tool": "web.fill",
                "params": { "url": "https://example.com", "selector": password_selector, "text": "hunter2" },
                "depends_on": ["fill_email"]
            },
            {
                "id": "submit",
                "name": "submit",
                "tool": "web.click_selector",
                "params": { "url": "https://example.com", "selector": "button[type=submit]" },
                "depends_on": ["fill_password"]
            }
        ]
    }))
    .expect("fixture plan json is well-formed")
}

/// A deterministic fixed-magnitude embedding for index `i`, distinct from
/// every other index so cosine-similarity tests get clean separation.
#[must_use]
pub fn fixture_embedding(i: usize) -> Vec<f32> {
    let mut v = vec![0.01; TEST_EMBEDDING_DIM];
    v[i % TEST_EMBEDDING_DIM] = 1.0;
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_ksg_has_procedure_prototype() {
        let ksg = seeded_ksg().await.unwrap();
        let found = ksg.find_prototype_by_name("Procedure").await.unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn login_plan_has_three_ordered_steps() {
        let plan = login_plan("Login to example.com", "#email", "#password");
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[1].depends_on, vec!["fill_email".to_string()]);
    }

    #[test]
    fn fixture_embeddings_are_distinct() {
        assert_ne!(fixture_embedding(0), fixture_embedding(1));
    }
}
