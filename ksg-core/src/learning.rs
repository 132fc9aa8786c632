//! Learning engine (C10, spec §4.10): turns failures, successes, and
//! explicit user feedback into retrievable `Knowledge` concepts that
//! future planning contexts can draw on.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ksg::Ksg;
use crate::llm::{ChatMessage, ChatOptions};
use crate::store::SearchFilter;
use crate::types::{rel, Edge, Node, NodeKind, Provenance};

/// Default similarity floor for `findSimilarKnowledge` and for deciding
/// whether a lesson is worth injecting into a planning context (spec
/// §4.10).
pub const DEFAULT_KNOWLEDGE_MIN_SIMILARITY: f32 = 0.6;

/// The learning engine (C10). Wraps [`Ksg`] to materialize `Knowledge`
/// (and `Lesson`) concepts from execution outcomes.
pub struct LearningEngine {
    ksg: Arc<Ksg>,
}

impl LearningEngine {
    #[must_use]
    pub fn new(ksg: Arc<Ksg>) -> Self {
        Self { ksg }
    }

    #[must_use]
    pub fn ksg(&self) -> &Arc<Ksg> {
        &self.ksg
    }

    /// `analyzeFailure(step, error, context, similarCases?) -> Knowledge`
    /// (spec §4.10): asks the LLM to reason about root cause and a
    /// suggested fix, then materializes the result as a `Knowledge`
    /// concept so the next planning attempt can retrieve it.
    pub async fn analyze_failure(
        &self,
        step_description: &str,
        error: &str,
        context: &str,
        similar_cases: &[Node],
    ) -> Result<Uuid> {
        let cases_text = similar_cases
            .iter()
            .filter_map(|n| n.get_str("lesson"))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "A procedure step failed.\nStep: {step_description}\nError: {error}\nContext: {context}\n\
             Similar prior lessons:\n{cases_text}\n\n\
             Respond with a short rootCause, a lesson learned, and a suggestedFix, one per line prefixed \
             `rootCause:`, `lesson:`, `suggestedFix:`."
        );
        let reply = self
            .ksg
            .llm
            .chat(&[ChatMessage::user(prompt)], &ChatOptions::default())
            .await?;
        let (root_cause, lesson, suggested_fix) = parse_labelled_reply(&reply);

        let mut props = Map::new();
        props.insert("kind".into(), json!("failure"));
        props.insert("stepDescription".into(), json!(step_description));
        props.insert("error".into(), json!(error));
        props.insert("context".into(), json!(context));
        props.insert("rootCause".into(), json!(root_cause));
        props.insert("lesson".into(), json!(lesson));
        props.insert("suggestedFix".into(), json!(suggested_fix));

        self.create_knowledge(props, None).await
    }

    /// `extractTransferable(similarSuccesses) -> Knowledge` (spec §4.10):
    /// summarizes what several successful runs have in common into one
    /// reusable lesson.
    pub async fn extract_transferable(&self, similar_successes: &[Node]) -> Result<Uuid> {
        let descriptions = similar_successes
            .iter()
            .filter_map(|n| n.get_str("name").or_else(|| n.get_str("description")))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "These procedures all succeeded:\n{descriptions}\n\n\
             Summarize the transferable technique they share in one sentence."
        );
        let lesson = self
            .ksg
            .llm
            .chat(&[ChatMessage::user(prompt)], &ChatOptions::default())
            .await?;

        let mut props = Map::new();
        props.insert("kind".into(), json!("transferable"));
        props.insert("lesson".into(), json!(lesson.trim()));
        props.insert("sourceCount".into(), json!(similar_successes.len()));

        self.create_knowledge(props, None).await
    }

    /// `learnFromSuccess(plan, result) -> Knowledge` (spec §4.10): records
    /// a lightweight positive-reinforcement note tied to a procedure run.
    pub async fn learn_from_success(&self, plan_name: &str, result_summary: &str) -> Result<Uuid> {
        let mut props = Map::new();
        props.insert("kind".into(), json!("success"));
        props.insert("lesson".into(), json!(format!("{plan_name} succeeded: {result_summary}")));

        self.create_knowledge(props, None).await
    }

    /// `learnFromUserFeedback(feedbackText, traceId) -> Knowledge` (spec
    /// §4.10): links the new knowledge to the run it corrects via
    /// `correctionOf` so future retrieval can prefer the correction over
    /// the original lesson.
    pub async fn learn_from_user_feedback(&self, feedback_text: &str, trace_id: Uuid) -> Result<Uuid> {
        let mut props = Map::new();
        props.insert("kind".into(), json!("user_feedback"));
        props.insert("lesson".into(), json!(feedback_text));
        props.insert("traceId".into(), json!(trace_id.to_string()));

        let knowledge_id = self.create_knowledge(props, None).await?;

        if let Some(corrected) = self.find_run_by_trace(trace_id).await? {
            let edge = Edge::new(
                knowledge_id,
                corrected.id,
                rel::CORRECTION_OF,
                Provenance::new("learning.learn_from_user_feedback", trace_id),
            );
            self.ksg.store().upsert(edge.into()).await?;
        }

        Ok(knowledge_id)
    }

    /// `findSimilarKnowledge(query, topK) -> [Knowledge]` (spec §4.10):
    /// embedding-ranked retrieval over previously learned lessons, for
    /// injection above [`DEFAULT_KNOWLEDGE_MIN_SIMILARITY`] into future
    /// planning contexts.
    pub async fn find_similar_knowledge(&self, query: &str, top_k: usize) -> Result<Vec<Node>> {
        let query_embedding = self.ksg.llm.embed(query).await?;
        let filter = SearchFilter::by_kind(NodeKind::Knowledge.as_str());
        let hits = self
            .ksg
            .store()
            .search(&filter, Some(&query_embedding), top_k, DEFAULT_KNOWLEDGE_MIN_SIMILARITY)
            .await?;
        Ok(hits.into_iter().map(|s| s.node).collect())
    }

    async fn create_knowledge(&self, props: Map<String, Value>, embedding: Option<Vec<f32>>) -> Result<Uuid> {
        let proto = self
            .ksg
            .find_prototype_by_name("Knowledge")
            .await?
            .ok_or_else(|| Error::InvariantViolation("Knowledge prototype not seeded".into()))?;
        self.ksg.create_concept(proto.id, props, embedding, None).await
    }

    async fn find_run_by_trace(&self, trace_id: Uuid) -> Result<Option<Node>> {
        let filter = SearchFilter::by_kind(NodeKind::ProcedureRun.as_str())
            .with_prop("traceId", json!(trace_id.to_string()));
        let hits = self.ksg.store().search(&filter, None, 1, 0.0).await?;
        Ok(hits.into_iter().next().map(|s| s.node))
    }
}

/// Parses the `rootCause:` / `lesson:` / `suggestedFix:` line-prefixed
/// reply shape requested of the LLM. Any missing line falls back to the
/// raw reply so a lesson is always recorded even when the model doesn't
/// follow the format exactly.
fn parse_labelled_reply(reply: &str) -> (String, String, String) {
    let mut root_cause = String::new();
    let mut lesson = String::new();
    let mut suggested_fix = String::new();
    for line in reply.lines() {
        let line = line.trim();
        if let Some(v) = line.strip_prefix("rootCause:") {
            root_cause = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("lesson:") {
            lesson = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("suggestedFix:") {
            suggested_fix = v.trim().to_string();
        }
    }
    if lesson.is_empty() {
        lesson = reply.trim().to_string();
    }
    (root_cause, lesson, suggested_fix)
}
