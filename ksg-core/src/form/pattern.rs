//! Pattern lookup order (spec §4.4): exact fingerprint match, then
//! same-domain best match by score, falling back to an external
//! form-detection collaborator.

use std::collections::HashMap;

use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::SearchFilter;
use crate::types::{Node, NodeKind};

use super::fingerprint::FormShape;
use super::FormEngine;

/// Default `minScore` for same-domain pattern reuse (spec §4.4),
/// overridable via `KSG_PATTERN_REUSE_MIN_SCORE` (spec §6.4).
pub const DEFAULT_MIN_SCORE: f32 = 2.0;

#[derive(Debug, Clone)]
pub enum PatternLookup {
    Exact { pattern_id: Uuid, selectors: HashMap<String, String> },
    BestMatch { pattern_id: Uuid, selectors: HashMap<String, String>, score: f32 },
    NotFound,
}

fn selectors_from_props(props: &Map<String, Value>) -> HashMap<String, String> {
    props
        .get("selectors")
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn labels_from_props(props: &Map<String, Value>) -> Vec<String> {
    props
        .get("labels")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// `3·domain_match + 2·form_type_match + token_overlap(labels)` (spec
/// §4.4).
#[must_use]
pub fn match_score(domain_match: bool, form_type_match: bool, candidate_labels: &[String], query_labels: &[String]) -> f32 {
    let overlap = candidate_labels
        .iter()
        .filter(|l| query_labels.iter().any(|q| q.eq_ignore_ascii_case(l)))
        .count() as f32;
    3.0 * f32::from(domain_match) + 2.0 * f32::from(form_type_match) + overlap
}

impl FormEngine {
    pub async fn lookup_pattern(&self, shape: &FormShape, form_type: &str, min_score: f32) -> Result<PatternLookup> {
        let target_fp = super::fingerprint::fingerprint(shape);
        let filter = SearchFilter::by_kind(NodeKind::FormPattern.as_str())
            .with_prop("fingerprint", Value::String(target_fp.clone()));
        let exact = self.ksg.store().search(&filter, None, 1, 0.0).await?;
        if let Some(hit) = exact.into_iter().next() {
            return Ok(PatternLookup::Exact {
                pattern_id: hit.node.id,
                selectors: selectors_from_props(&hit.node.props),
            });
        }

        let domain_filter = SearchFilter::by_kind(NodeKind::FormPattern.as_str())
            .with_prop("domain", Value::String(shape.domain.clone()));
        let candidates = self.ksg.store().search(&domain_filter, None, 64, 0.0).await?;
        let mut best: Option<(Node, f32)> = None;
        for scored in candidates {
            let node = scored.node;
            let candidate_form_type = node.get_str("formType").unwrap_or_default();
            let candidate_labels = labels_from_props(&node.props);
            let score = match_score(true, candidate_form_type == form_type, &candidate_labels, &shape.labels);
            if best.as_ref().is_none_or(|(_, best_score)| score > *best_score) {
                best = Some((node, score));
            }
        }
        if let Some((node, score)) = best {
            if score >= min_score {
                return Ok(PatternLookup::BestMatch {
                    pattern_id: node.id,
                    selectors: selectors_from_props(&node.props),
                    score,
                });
            }
        }
        Ok(PatternLookup::NotFound)
    }

    /// Stores a newly detected form (or an updated selector set for an
    /// existing one) as a `FormPattern` concept (spec §4.4 step 3: "on
    /// success, store the exemplar as a new pattern").
    pub async fn store_pattern(
        &self,
        shape: &FormShape,
        form_type: &str,
        selectors: &HashMap<String, String>,
    ) -> Result<Uuid> {
        let proto = self
            .ksg
            .find_prototype_by_name("FormPattern")
            .await?
            .ok_or_else(|| Error::InvariantViolation("FormPattern prototype not seeded".into()))?;

        let mut props = Map::new();
        props.insert("fingerprint".into(), json!(super::fingerprint::fingerprint(shape)));
        props.insert("domain".into(), json!(shape.domain));
        props.insert("formType".into(), json!(form_type));
        props.insert("labels".into(), json!(shape.labels));
        props.insert(
            "selectors".into(),
            Value::Object(selectors.iter().map(|(k, v)| (k.clone(), json!(v))).collect()),
        );
        self.ksg.create_concept(proto.id, props, None, None).await
    }

    /// Updates a previously stored pattern's selector for one field (spec
    /// §4.4 step 5: persists the first successful fallback).
    pub async fn update_selector(&self, pattern_id: Uuid, field: &str, selector: &str) -> Result<()> {
        let node = self.ksg.store().get_node(pattern_id).await?.ok_or(Error::NotFound(pattern_id))?;
        let mut selectors = node.props.get("selectors").and_then(Value::as_object).cloned().unwrap_or_default();
        selectors.insert(field.to_string(), json!(selector));
        let mut patch = Map::new();
        patch.insert("selectors".into(), Value::Object(selectors));
        self.ksg.update_properties(pattern_id, patch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::ksg::Ksg;
    use crate::seed::seed_prototypes;
    use crate::store::InMemoryStore;
    use std::sync::Arc;

    async fn engine() -> FormEngine {
        let ksg = Arc::new(Ksg::new(Arc::new(InMemoryStore::new()), Arc::new(MockLlmClient::default()), 8));
        seed_prototypes(&ksg).await.unwrap();
        FormEngine::new(ksg, None)
    }

    fn shape() -> FormShape {
        FormShape {
            domain: "example.com".into(),
            path: "/login".into(),
            labels: vec!["Email".into(), "Password".into()],
            input_types: vec!["email".into(), "password".into()],
            placeholders: vec![],
        }
    }

    #[tokio::test]
    async fn exact_fingerprint_match_reuses_selectors() {
        let engine = engine().await;
        let mut selectors = HashMap::new();
        selectors.insert("email".into(), "#email".into());
        engine.store_pattern(&shape(), "login", &selectors).await.unwrap();

        let result = engine.lookup_pattern(&shape(), "login", DEFAULT_MIN_SCORE).await.unwrap();
        assert!(matches!(result, PatternLookup::Exact { .. }));
    }

    #[tokio::test]
    async fn same_domain_partial_match_scores_above_threshold() {
        let engine = engine().await;
        let mut selectors = HashMap::new();
        selectors.insert("email".into(), "#email".into());
        engine.store_pattern(&shape(), "login", &selectors).await.unwrap();

        let mut other_path = shape();
        other_path.path = "/account/login".into();
        let result = engine.lookup_pattern(&other_path, "login", DEFAULT_MIN_SCORE).await.unwrap();
        assert!(matches!(result, PatternLookup::BestMatch { .. }));
    }

    #[tokio::test]
    async fn unrelated_domain_is_not_found() {
        let engine = engine().await;
        let mut selectors = HashMap::new();
        selectors.insert("email".into(), "#email".into());
        engine.store_pattern(&shape(), "login", &selectors).await.unwrap();

        let mut other = shape();
        other.domain = "unrelated.com".into();
        other.labels = vec![];
        let result = engine.lookup_pattern(&other, "login", DEFAULT_MIN_SCORE).await.unwrap();
        assert!(matches!(result, PatternLookup::NotFound));
    }
}
