//! `findReusable`, `recordRun`, `persistWinningSelector`, and the
//! generalization trigger (spec §4.3).

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::Entity;
use crate::types::{rel, Edge, NodeKind, Provenance};

use super::ProcedureSubsystem;

/// Outcome of a single executed step, persisted on the `ProcedureRun`
/// (spec §3, §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: String,
    pub success: bool,
    pub error: Option<String>,
}

/// `findReusable`'s result per candidate (spec §4.3): single-step
/// procedures are never auto-executed — they always surface as
/// `SearchOnly` (spec §9, resolved Open Question #3).
#[derive(Debug, Clone)]
pub enum ReuseHint {
    Execute { procedure_id: Uuid, score: f32 },
    SearchOnly { procedure_id: Uuid, score: f32 },
}

impl ReuseHint {
    #[must_use]
    pub fn procedure_id(&self) -> Uuid {
        match self {
            ReuseHint::Execute { procedure_id, .. } | ReuseHint::SearchOnly { procedure_id, .. } => *procedure_id,
        }
    }

    #[must_use]
    pub fn score(&self) -> f32 {
        match self {
            ReuseHint::Execute { score, .. } | ReuseHint::SearchOnly { score, .. } => *score,
        }
    }
}

fn success_ratio(props: &Map<String, Value>) -> f64 {
    let success = props.get("success").and_then(Value::as_f64).unwrap_or(0.0);
    let failure = props.get("failure").and_then(Value::as_f64).unwrap_or(0.0);
    if success + failure == 0.0 {
        0.0
    } else {
        success / (success + failure)
    }
}

impl ProcedureSubsystem {
    /// `findReusable(request, embedding, minScore) -> [procedure, score]`
    /// (spec §4.3). Candidates tie-break by success/failure ratio
    /// descending.
    pub async fn find_reusable(&self, request: &str, min_score: f32) -> Result<Vec<ReuseHint>> {
        let procedure_proto = self
            .ksg
            .find_prototype_by_name("Procedure")
            .await?
            .ok_or_else(|| Error::InvariantViolation("Procedure prototype not seeded".into()))?;

        let candidates = self
            .ksg
            .search_concepts(request, 16, Some(procedure_proto.id), min_score, false)
            .await?;

        let mut scored = Vec::new();
        for node in candidates {
            let query_embedding = self.ksg.llm.embed(request).await?;
            let score = node
                .embedding
                .as_deref()
                .map_or(0.0, |e| crate::store::cosine_similarity(e, &query_embedding));
            if score < min_score {
                continue;
            }
            let step_count = self.ksg.store().edges_from(node.id, Some(rel::HAS_STEP)).await?.len();
            let hint = if step_count <= 1 {
                ReuseHint::SearchOnly { procedure_id: node.id, score }
            } else {
                ReuseHint::Execute { procedure_id: node.id, score }
            };
            scored.push((hint, success_ratio(&node.props), score));
        }
        scored.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
        });
        Ok(scored.into_iter().map(|(hint, _, _)| hint).collect())
    }

    /// `recordRun(procedureUuid, outcome, stepResults, traceId) -> runUuid`
    /// (spec §4.3). Outcomes are embedded in the run's props at creation
    /// time so the run is only ever observed fully-finalized (spec §5
    /// ordering guarantee) before the `runOf` edge links it.
    pub async fn record_run(
        &self,
        procedure_id: Uuid,
        success: bool,
        step_results: &[StepOutcome],
        trace_id: Uuid,
    ) -> Result<Uuid> {
        let run_proto = self
            .ksg
            .find_prototype_by_name("ProcedureRun")
            .await?
            .ok_or_else(|| Error::InvariantViolation("ProcedureRun prototype not seeded".into()))?;

        let mut props = Map::new();
        props.insert("success".into(), json!(success));
        props.insert("stepResults".into(), serde_json::to_value(step_results)?);
        props.insert("traceId".into(), json!(trace_id.to_string()));
        let run_id = self.ksg.create_concept(run_proto.id, props, None, None).await?;

        let run_of = Edge::new(run_id, procedure_id, rel::RUN_OF, Provenance::new("procedure.record_run", trace_id));
        self.ksg.store().upsert(Entity::Edge(run_of)).await?;

        self.bump_counter(procedure_id, "tested", 1).await?;
        if success {
            self.bump_counter(procedure_id, "success", 1).await?;
            self.maybe_generalize(procedure_id, trace_id).await?;
        } else {
            self.bump_counter(procedure_id, "failure", 1).await?;
        }

        Ok(run_id)
    }

    async fn bump_counter(&self, procedure_id: Uuid, key: &str, delta: i64) -> Result<()> {
        let node = self
            .ksg
            .store()
            .get_node(procedure_id)
            .await?
            .ok_or(Error::NotFound(procedure_id))?;
        let current = node.props.get(key).and_then(Value::as_i64).unwrap_or(0);
        let mut patch = Map::new();
        patch.insert(key.to_string(), json!(current + delta));
        self.ksg.update_properties(procedure_id, patch).await
    }

    /// Generalization trigger (spec §4.3): after a successful run, look
    /// for similar procedures above `GENERALIZE_SIMILARITY_THRESHOLD`; if
    /// at least two exist (including self) and their mean pairwise
    /// similarity is above `GENERALIZE_MEAN_PAIRWISE_THRESHOLD`, call
    /// `KSG::generalize_concepts` and cross-link `hasExemplar`.
    async fn maybe_generalize(&self, procedure_id: Uuid, trace_id: Uuid) -> Result<Option<Uuid>> {
        let procedure = self
            .ksg
            .store()
            .get_node(procedure_id)
            .await?
            .ok_or(Error::NotFound(procedure_id))?;
        let Some(embedding) = procedure.embedding.clone() else {
            return Ok(None);
        };

        let procedure_proto = self
            .ksg
            .find_prototype_by_name("Procedure")
            .await?
            .ok_or_else(|| Error::InvariantViolation("Procedure prototype not seeded".into()))?;
        let name = procedure.get_str("name").unwrap_or("procedure").to_string();
        let similar = self
            .ksg
            .store()
            .search(
                &crate::store::SearchFilter::by_kind(NodeKind::Concept.as_str()),
                Some(&embedding),
                8,
                super::GENERALIZE_SIMILARITY_THRESHOLD,
            )
            .await?;

        let mut candidates: Vec<Uuid> = Vec::new();
        for scored in similar {
            let instance_of = self.ksg.store().edges_from(scored.node.id, Some(rel::INSTANCE_OF)).await?;
            if instance_of.iter().any(|e| e.to == procedure_proto.id) {
                candidates.push(scored.node.id);
            }
        }
        if !candidates.contains(&procedure_id) {
            candidates.push(procedure_id);
        }
        if candidates.len() < 2 {
            return Ok(None);
        }

        let mean_similarity = self.mean_pairwise_similarity(&candidates).await?;
        if mean_similarity < super::GENERALIZE_MEAN_PAIRWISE_THRESHOLD {
            return Ok(None);
        }

        let _ = trace_id;
        let generalized = self
            .ksg
            .generalize_concepts(
                &candidates,
                &format!("{name} (generalized)"),
                "auto-generalized from similar successful procedures",
                super::GENERALIZE_MEAN_PAIRWISE_THRESHOLD,
            )
            .await?;
        Ok(Some(generalized))
    }

    async fn mean_pairwise_similarity(&self, ids: &[Uuid]) -> Result<f32> {
        let mut embeddings = Vec::new();
        for id in ids {
            if let Some(node) = self.ksg.store().get_node(*id).await? {
                if let Some(e) = node.embedding {
                    embeddings.push(e);
                }
            }
        }
        if embeddings.len() < 2 {
            return Ok(0.0);
        }
        let mut total = 0.0;
        let mut pairs = 0;
        for i in 0..embeddings.len() {
            for j in (i + 1)..embeddings.len() {
                total += crate::store::cosine_similarity(&embeddings[i], &embeddings[j]);
                pairs += 1;
            }
        }
        Ok(if pairs == 0 { 0.0 } else { total / pairs as f32 })
    }

    /// `persistWinningSelector(procedureUuid, stepId, selector)` (spec
    /// §4.3): locates the step by its plan-level `stepId` and rewrites
    /// `params.selector`; future hydrations and reuses pick it up.
    pub async fn persist_winning_selector(&self, procedure_id: Uuid, step_id: &str, selector: &str) -> Result<()> {
        let has_step_edges = self.ksg.store().edges_from(procedure_id, Some(rel::HAS_STEP)).await?;
        for edge in has_step_edges {
            let Some(node) = self.ksg.store().get_node(edge.to).await? else {
                continue;
            };
            if node.get_str("stepId") != Some(step_id) {
                continue;
            }
            let mut params = node.props.get("params").and_then(Value::as_object).cloned().unwrap_or_default();
            params.insert("selector".into(), json!(selector));
            let mut patch = Map::new();
            patch.insert("params".into(), Value::Object(params));
            self.ksg.update_properties(node.id, patch).await?;
            return Ok(());
        }
        Err(Error::NotFound(procedure_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::procedure::plan::{OnFail, Plan, PlanStep, StepKind};
    use crate::seed::seed_prototypes;
    use crate::store::InMemoryStore;
    use crate::tools::{NullToolInvoker, ToolRegistry};
    use std::sync::Arc;

    fn step(id: &str) -> PlanStep {
        let mut params = Map::new();
        params.insert("url".into(), json!("https://example.com"));
        params.insert("selector".into(), json!("#email"));
        params.insert("text".into(), json!("ada@example.com"));
        PlanStep {
            id: id.into(),
            name: Some(id.into()),
            tool: "web.fill".into(),
            params,
            depends_on: vec![],
            on_fail: OnFail::Stop,
            kind: StepKind::Operation,
        }
    }

    async fn subsystem() -> ProcedureSubsystem {
        let ksg = Arc::new(crate::ksg::Ksg::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(MockLlmClient::default()),
            16,
        ));
        seed_prototypes(&ksg).await.unwrap();
        let tools = Arc::new(ToolRegistry::with_canonical_tools(Arc::new(NullToolInvoker)));
        ProcedureSubsystem::new(ksg, tools)
    }

    #[tokio::test]
    async fn record_run_updates_counters_and_links_run_of() {
        let sub = subsystem().await;
        let plan = Plan {
            name: "Login".into(),
            steps: vec![step("s1"), step("s2")],
            ..Default::default()
        };
        let pid = sub.create_from_json(&plan, None).await.unwrap();
        let run_id = sub
            .record_run(pid, true, &[StepOutcome { step_id: "s1".into(), success: true, error: None }], Uuid::new_v4())
            .await
            .unwrap();
        let run_of = sub.ksg.store().edges_from(run_id, Some(rel::RUN_OF)).await.unwrap();
        assert_eq!(run_of[0].to, pid);
        let procedure = sub.ksg.store().get_node(pid).await.unwrap().unwrap();
        assert_eq!(procedure.props.get("tested").and_then(Value::as_i64), Some(1));
        assert_eq!(procedure.props.get("success").and_then(Value::as_i64), Some(1));
    }

    #[tokio::test]
    async fn single_step_procedure_is_search_only() {
        let sub = subsystem().await;
        let plan = Plan {
            name: "Open a single url".into(),
            steps: vec![step("s1")],
            ..Default::default()
        };
        sub.create_from_json(&plan, None).await.unwrap();
        let hints = sub.find_reusable("Open a single url", 0.0).await.unwrap();
        assert!(hints.iter().all(|h| matches!(h, ReuseHint::SearchOnly { .. })));
    }

    #[tokio::test]
    async fn persist_winning_selector_rewrites_params_and_is_visible_on_hydrate() {
        let sub = subsystem().await;
        let plan = Plan {
            name: "Login".into(),
            steps: vec![step("s1"), step("s2")],
            ..Default::default()
        };
        let pid = sub.create_from_json(&plan, None).await.unwrap();
        sub.persist_winning_selector(pid, "s1", "#user").await.unwrap();
        let hydrated = sub.hydrate(pid).await.unwrap();
        let s1 = hydrated.steps.iter().find(|s| s.id == "s1").unwrap();
        assert_eq!(s1.params.get("selector").and_then(Value::as_str), Some("#user"));
    }
}
