//! Centroid-drift embeddings and generalization (spec §4.2, §4.3
//! "Generalization trigger").

use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::{cosine_similarity, Entity, SearchFilter};
use crate::types::{rel, Edge, Node, NodeKind, NodeStatus, Provenance};
use tracing::{debug, info, instrument};

use super::Ksg;

const SUM_KEY: &str = "_embeddingSum";
const COUNT_KEY: &str = "_exemplarCount";

/// Default similarity floor used by `findSimilarPatterns` (spec §4.2).
pub const DEFAULT_PATTERN_MIN_SIMILARITY: f32 = 0.6;

fn sum_to_vec(value: Option<&Value>, dim: usize) -> Vec<f64> {
    value
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_else(|| vec![0.0; dim])
}

impl Ksg {
    /// `addExemplar(conceptUuid, exemplarEmbedding, exemplarUuid?)` (spec
    /// §4.2). Atomically updates `_embeddingSum`, `_exemplarCount`, and the
    /// node's `embedding` to their incremental mean. Invariant (spec §3):
    /// `embedding = sum / count`.
    #[instrument(skip(self, exemplar_embedding))]
    pub async fn add_exemplar(
        &self,
        concept_id: Uuid,
        exemplar_embedding: &[f32],
        exemplar_id: Option<Uuid>,
    ) -> Result<()> {
        let mut node = self
            .store
            .get_node(concept_id)
            .await?
            .ok_or(Error::NotFound(concept_id))?;

        let dim = exemplar_embedding.len();
        let mut sum = sum_to_vec(node.props.get(SUM_KEY), dim);
        if sum.len() != dim {
            sum = vec![0.0; dim];
        }
        for (s, e) in sum.iter_mut().zip(exemplar_embedding.iter()) {
            *s += f64::from(*e);
        }
        let count = node
            .props
            .get(COUNT_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(0)
            + 1;

        node.props.insert(
            SUM_KEY.into(),
            Value::Array(sum.iter().map(|v| json!(v)).collect()),
        );
        node.props.insert(COUNT_KEY.into(), json!(count));
        node.embedding = Some(sum.iter().map(|v| (*v / count as f64) as f32).collect());
        node.updated_at = chrono::Utc::now();
        debug!(%concept_id, count, "centroid updated incrementally");
        self.store.upsert(Entity::Node(node)).await?;

        if let Some(exemplar_id) = exemplar_id {
            let trace_id = Uuid::new_v4();
            let edge = Edge::new(
                concept_id,
                exemplar_id,
                rel::HAS_EXEMPLAR,
                Provenance::new("ksg.add_exemplar", trace_id),
            );
            self.store.upsert(Entity::Edge(edge)).await?;
        }
        Ok(())
    }

    /// `recomputeCentroid(conceptUuid)` (spec §4.2): re-aggregates from
    /// every `hasExemplar` edge rather than trusting the incremental sum,
    /// for use after exemplars are edited or removed.
    #[instrument(skip(self))]
    pub async fn recompute_centroid(&self, concept_id: Uuid) -> Result<()> {
        let mut node = self
            .store
            .get_node(concept_id)
            .await?
            .ok_or(Error::NotFound(concept_id))?;
        let exemplar_edges = self.store.edges_from(concept_id, Some(rel::HAS_EXEMPLAR)).await?;

        let mut sum: Option<Vec<f64>> = None;
        let mut count: u64 = 0;
        for edge in &exemplar_edges {
            let Some(exemplar) = self.store.get_node(edge.to).await? else {
                continue;
            };
            let Some(embedding) = exemplar.embedding else {
                continue;
            };
            let acc = sum.get_or_insert_with(|| vec![0.0; embedding.len()]);
            for (s, e) in acc.iter_mut().zip(embedding.iter()) {
                *s += f64::from(*e);
            }
            count += 1;
        }

        let sum = sum.unwrap_or_default();
        node.props.insert(
            SUM_KEY.into(),
            Value::Array(sum.iter().map(|v| json!(v)).collect()),
        );
        node.props.insert(COUNT_KEY.into(), json!(count));
        if count > 0 {
            node.embedding = Some(sum.iter().map(|v| (*v / count as f64) as f32).collect());
        }
        node.updated_at = chrono::Utc::now();
        self.store.upsert(Entity::Node(node)).await
    }

    /// `generalizeConcepts([exemplarUuids], name, description,
    /// embedding=mean, minSimilarity=0.7)` (spec §4.2). Exemplars below
    /// `min_similarity` of the provisional mean are excluded from the
    /// final centroid and from the `hasExemplar` edges created.
    #[instrument(skip(self, exemplar_ids, description))]
    pub async fn generalize_concepts(
        &self,
        exemplar_ids: &[Uuid],
        name: &str,
        description: &str,
        min_similarity: f32,
    ) -> Result<Uuid> {
        info!(name, exemplar_count = exemplar_ids.len(), "generalizing concepts");
        let mut exemplars = Vec::new();
        for id in exemplar_ids {
            if let Some(node) = self.store.get_node(*id).await? {
                if let Some(embedding) = node.embedding.clone() {
                    exemplars.push((node, embedding));
                }
            }
        }
        if exemplars.is_empty() {
            return Err(Error::InvalidInput(
                "generalizeConcepts requires at least one exemplar with an embedding".into(),
            ));
        }

        let dim = exemplars[0].1.len();
        let mut provisional = vec![0.0f64; dim];
        for (_, e) in &exemplars {
            for (s, v) in provisional.iter_mut().zip(e.iter()) {
                *s += f64::from(*v);
            }
        }
        let provisional: Vec<f32> = provisional
            .iter()
            .map(|v| (*v / exemplars.len() as f64) as f32)
            .collect();

        let accepted: Vec<(Node, Vec<f32>, f32)> = exemplars
            .into_iter()
            .filter_map(|(node, embedding)| {
                let sim = cosine_similarity(&embedding, &provisional);
                (sim >= min_similarity).then_some((node, embedding, sim))
            })
            .collect();
        if accepted.is_empty() {
            return Err(Error::InvalidInput(
                "no exemplars met min_similarity for generalization".into(),
            ));
        }

        let mut final_sum = vec![0.0f64; dim];
        for (_, e, _) in &accepted {
            for (s, v) in final_sum.iter_mut().zip(e.iter()) {
                *s += f64::from(*v);
            }
        }
        let count = accepted.len() as u64;
        let final_embedding: Vec<f32> = final_sum.iter().map(|v| (*v / count as f64) as f32).collect();

        // Generalized concepts inherit the first accepted exemplar's
        // prototype when one exists, otherwise fall back to "Concept".
        let prototype_id = match self.store.edges_from(accepted[0].0.id, Some(rel::INSTANCE_OF)).await?.first() {
            Some(edge) => edge.to,
            None => {
                self.create_prototype("Generalization", None, vec![]).await?
            }
        };

        let trace_id = Uuid::new_v4();
        let mut props = Map::new();
        props.insert("name".into(), json!(name));
        props.insert("description".into(), json!(description));
        props.insert("generalizedFrom".into(), json!(accepted.len()));
        props.insert(
            SUM_KEY.into(),
            Value::Array(final_sum.iter().map(|v| json!(v)).collect()),
        );
        props.insert(COUNT_KEY.into(), json!(count));

        let mut node = Node::new(
            NodeKind::Concept.as_str(),
            Provenance::new("ksg.generalize_concepts", trace_id),
        )
        .with_props(props)
        .with_embedding(final_embedding);
        let generalized_id = node.id;
        node.status = NodeStatus::Active;
        self.store.upsert(Entity::Node(node)).await?;

        let instance_edge = Edge::new(generalized_id, prototype_id, rel::INSTANCE_OF, Provenance::new("ksg.generalize_concepts", trace_id));
        self.store.upsert(Entity::Edge(instance_edge)).await?;

        for (exemplar, _, sim) in &accepted {
            let mut edge = Edge::new(
                generalized_id,
                exemplar.id,
                rel::HAS_EXEMPLAR,
                Provenance::new("ksg.generalize_concepts", trace_id),
            );
            edge.props.insert("similarity".into(), json!(sim));
            self.store.upsert(Entity::Edge(edge)).await?;

            let gen_by = Edge::new(
                exemplar.id,
                generalized_id,
                rel::GENERALIZED_BY,
                Provenance::new("ksg.generalize_concepts", trace_id),
            );
            self.store.upsert(Entity::Edge(gen_by)).await?;
        }

        Ok(generalized_id)
    }

    /// `recordPatternSuccess(uuid, context)` (spec §4.2): increments
    /// `successCount`, recomputes the centroid, and triggers
    /// `autoGeneralize` once `successCount >= threshold` and at least two
    /// similar concepts exist above `minSimilarity`.
    pub async fn record_pattern_success(
        &self,
        concept_id: Uuid,
        context: &str,
        threshold: u32,
    ) -> Result<Option<Uuid>> {
        let mut node = self
            .store
            .get_node(concept_id)
            .await?
            .ok_or(Error::NotFound(concept_id))?;
        let success_count = node.props.get("successCount").and_then(Value::as_u64).unwrap_or(0) + 1;
        node.props.insert("successCount".into(), json!(success_count));
        node.updated_at = chrono::Utc::now();
        self.store.upsert(Entity::Node(node)).await?;
        self.recompute_centroid(concept_id).await?;

        if success_count < u64::from(threshold) {
            return Ok(None);
        }

        let similar = self
            .find_similar_patterns(context, 8, DEFAULT_PATTERN_MIN_SIMILARITY)
            .await?;
        let mut exemplar_ids: Vec<Uuid> = similar
            .iter()
            .filter(|m| m.concept.id != concept_id)
            .map(|m| m.concept.id)
            .collect();
        exemplar_ids.push(concept_id);
        exemplar_ids.dedup();

        if exemplar_ids.len() < 2 {
            return Ok(None);
        }

        let similarity_sum: f32 = self.mean_pairwise_similarity(&exemplar_ids).await?;
        if similarity_sum < super::DEFAULT_GENERALIZE_MIN_SIMILARITY {
            return Ok(None);
        }

        let name = node_name_or(&self.store.get_node(concept_id).await?.unwrap_or_else(|| {
            Node::new(NodeKind::Concept.as_str(), Provenance::new("ksg", Uuid::new_v4()))
        }), "Generalized pattern");
        let generalized = self
            .generalize_concepts(
                &exemplar_ids,
                &format!("{name} (generalized)"),
                context,
                super::DEFAULT_GENERALIZE_MIN_SIMILARITY,
            )
            .await?;
        Ok(Some(generalized))
    }

    /// Average pairwise cosine similarity across a set of concept
    /// embeddings, used to gate auto-generalization (spec §4.3).
    async fn mean_pairwise_similarity(&self, ids: &[Uuid]) -> Result<f32> {
        let mut embeddings = Vec::new();
        for id in ids {
            if let Some(node) = self.store.get_node(*id).await? {
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
                total += cosine_similarity(&embeddings[i], &embeddings[j]);
                pairs += 1;
            }
        }
        Ok(if pairs == 0 { 0.0 } else { total / pairs as f32 })
    }

    /// `findSimilarPatterns(query, topK, minSimilarity=0.6)` (spec §4.2).
    pub async fn find_similar_patterns(
        &self,
        query: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<super::PatternMatch>> {
        let query_embedding = self.llm.embed(query).await?;
        let filter = SearchFilter::by_kind(NodeKind::Concept.as_str());
        let hits = self
            .store
            .search(&filter, Some(&query_embedding), top_k, min_similarity)
            .await?;
        Ok(hits
            .into_iter()
            .map(|scored| super::PatternMatch {
                concept: scored.node,
                score: scored.score,
            })
            .collect())
    }

    /// `transferPattern(sourceUuid, targetContext, llm?)` (spec §4.2):
    /// adapts a matched pattern's description to a new context by asking
    /// the LLM for a textual adaptation; the caller decides whether to
    /// materialize it as a new concept.
    pub async fn transfer_pattern(
        &self,
        source_id: Uuid,
        target_context: &str,
    ) -> Result<super::TransferredPattern> {
        let source = self
            .store
            .get_node(source_id)
            .await?
            .ok_or(Error::NotFound(source_id))?;
        let source_desc = source
            .get_str("description")
            .or_else(|| source.get_str("name"))
            .unwrap_or("pattern")
            .to_string();
        let prompt = format!(
            "Adapt this pattern to a new context.\nPattern: {source_desc}\nNew context: {target_context}\nRespond with the adapted description only."
        );
        let adapted = self
            .llm
            .chat(
                &[crate::llm::ChatMessage::user(prompt)],
                &crate::llm::ChatOptions::default(),
            )
            .await?;
        Ok(super::TransferredPattern {
            source_id,
            adapted_description: adapted,
        })
    }
}

fn node_name_or(node: &Node, fallback: &str) -> String {
    node.get_str("name").unwrap_or(fallback).to_string()
}
