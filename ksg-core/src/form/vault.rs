//! Vault lookup (spec §4.4): resolves which stored `Credential` /
//! `Identity` / `PaymentMethod` / `FormData` concept to use for a given
//! domain, preferring an exact domain match and breaking ties by recency.

use uuid::Uuid;

use crate::error::Result;
use crate::store::SearchFilter;
use crate::types::{Node, NodeKind};

use super::FormEngine;

/// The kind of vaulted data a form field maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultKind {
    Credential,
    Identity,
    PaymentMethod,
    FormData,
}

impl VaultKind {
    fn node_kind(self) -> NodeKind {
        match self {
            VaultKind::Credential => NodeKind::Credential,
            VaultKind::Identity => NodeKind::Identity,
            VaultKind::PaymentMethod => NodeKind::PaymentMethod,
            VaultKind::FormData => NodeKind::FormData,
        }
    }
}

impl FormEngine {
    /// Looks up the best vaulted concept of `kind` for `domain`: same-domain
    /// matches are preferred, most-recently-updated first; `PaymentMethod`
    /// and `FormData` aren't domain-scoped so any instance qualifies and
    /// recency alone breaks ties.
    pub async fn find_vaulted(&self, kind: VaultKind, domain: &str) -> Result<Option<Node>> {
        let filter = SearchFilter::by_kind(kind.node_kind().as_str());
        let mut candidates = self.ksg.store().search(&filter, None, 64, 0.0).await?;
        candidates.retain(|c| c.node.is_active());

        let domain_scoped = matches!(kind, VaultKind::Credential | VaultKind::Identity);
        let mut same_domain: Vec<Node> = Vec::new();
        let mut rest: Vec<Node> = Vec::new();
        for scored in candidates {
            let node = scored.node;
            if domain_scoped && node.get_str("domain") == Some(domain) {
                same_domain.push(node);
            } else if !domain_scoped {
                same_domain.push(node);
            } else {
                rest.push(node);
            }
        }

        let pool = if same_domain.is_empty() { rest } else { same_domain };
        let best = pool.into_iter().max_by_key(|n| n.updated_at);
        Ok(best)
    }

    /// Bumps `recallCount` on a vaulted concept once it's used to fill a
    /// form (mirrors `Edge.recallCount`'s reuse-tracking convention for
    /// vault nodes, spec §3).
    pub async fn record_vault_recall(&self, concept_id: Uuid) -> Result<()> {
        let node = self.ksg.store().get_node(concept_id).await?;
        let Some(node) = node else { return Ok(()) };
        let current = node.get_f64("recallCount").unwrap_or(0.0);
        let mut patch = serde_json::Map::new();
        patch.insert("recallCount".into(), serde_json::json!(current + 1.0));
        self.ksg.update_properties(concept_id, patch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::ksg::Ksg;
    use crate::seed::seed_prototypes;
    use crate::store::InMemoryStore;
    use serde_json::{json, Map};
    use std::sync::Arc;

    async fn engine() -> FormEngine {
        let ksg = Arc::new(Ksg::new(Arc::new(InMemoryStore::new()), Arc::new(MockLlmClient::default()), 8));
        seed_prototypes(&ksg).await.unwrap();
        FormEngine::new(ksg, None)
    }

    #[tokio::test]
    async fn prefers_same_domain_credential() {
        let engine = engine().await;
        let proto = engine.ksg.find_prototype_by_name("Credential").await.unwrap().unwrap();
        let mut other = Map::new();
        other.insert("domain".into(), json!("other.com"));
        engine.ksg.create_concept(proto.id, other, None, None).await.unwrap();
        let mut mine = Map::new();
        mine.insert("domain".into(), json!("example.com"));
        let mine_id = engine.ksg.create_concept(proto.id, mine, None, None).await.unwrap();

        let found = engine.find_vaulted(VaultKind::Credential, "example.com").await.unwrap().unwrap();
        assert_eq!(found.id, mine_id);
    }

    #[tokio::test]
    async fn no_match_returns_none() {
        let engine = engine().await;
        let found = engine.find_vaulted(VaultKind::Credential, "nowhere.com").await.unwrap();
        assert!(found.is_none());
    }
}
