//! `createFromJson` and `hydrate` (spec §4.3): materializing a validated
//! plan into a procedure DAG, and reconstructing an executable plan from
//! that graph rather than from the stored JSON blob, so selector
//! mutations (§4.3 `persistWinningSelector`) are reflected on reuse.

use std::collections::HashMap;

use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::Entity;
use crate::types::{rel, Edge, Node, NodeKind, Provenance};

use super::plan::{OnFail, Plan, PlanStep, StepKind};
use super::ProcedureSubsystem;

impl ProcedureSubsystem {
    pub fn validate(&self, plan: &Plan) -> Result<()> {
        super::validate_plan(plan, &self.tools)
    }

    /// `createFromJson(plan, embedding?) -> procedureUuid` (spec §4.3).
    pub async fn create_from_json(&self, plan: &Plan, embedding: Option<Vec<f32>>) -> Result<Uuid> {
        self.validate(plan)?;

        let procedure_proto = self
            .ksg
            .find_prototype_by_name("Procedure")
            .await?
            .ok_or_else(|| Error::InvariantViolation("Procedure prototype not seeded".into()))?;
        let step_proto = self
            .ksg
            .find_prototype_by_name("ProcedureStep")
            .await?
            .ok_or_else(|| Error::InvariantViolation("ProcedureStep prototype not seeded".into()))?;

        let summary_embedding = match embedding {
            Some(e) => e,
            None => {
                let step_names: Vec<&str> = plan
                    .steps
                    .iter()
                    .map(|s| s.name.as_deref().unwrap_or(s.tool.as_str()))
                    .collect();
                let text = format!(
                    "{} {} {}",
                    plan.name,
                    plan.description.as_deref().unwrap_or(""),
                    step_names.join(" ")
                );
                self.ksg.llm.embed(&text).await?
            }
        };

        let mut procedure_props = Map::new();
        procedure_props.insert("name".into(), json!(plan.name));
        procedure_props.insert("description".into(), json!(plan.description.clone().unwrap_or_default()));
        procedure_props.insert("planJson".into(), serde_json::to_value(plan)?);
        procedure_props.insert("tested".into(), json!(0));
        procedure_props.insert("success".into(), json!(0));
        procedure_props.insert("failure".into(), json!(0));

        let procedure_id = self
            .ksg
            .create_concept(procedure_proto.id, procedure_props, Some(summary_embedding), None)
            .await?;

        let mut step_ids: HashMap<String, Uuid> = HashMap::new();
        for step in &plan.steps {
            let mut step_props = Map::new();
            step_props.insert("stepId".into(), json!(step.id));
            step_props.insert("name".into(), json!(step.name.clone().unwrap_or_else(|| step.id.clone())));
            step_props.insert("tool".into(), json!(step.tool));
            step_props.insert("params".into(), Value::Object(step.params.clone()));
            step_props.insert("on_fail".into(), json!(step.on_fail));
            step_props.insert("kind".into(), json!(step.kind));
            let embedding = crate::llm::deterministic_embedding(&step.tool, self.ksg.embedding_dim);
            let concept_id = self
                .ksg
                .create_concept(step_proto.id, step_props, Some(embedding), None)
                .await?;
            step_ids.insert(step.id.clone(), concept_id);

            let has_step = Edge::new(
                procedure_id,
                concept_id,
                rel::HAS_STEP,
                Provenance::new("procedure.create_from_json", Uuid::new_v4()),
            );
            self.ksg.store().upsert(Entity::Edge(has_step)).await?;
        }

        for step in &plan.steps {
            let Some(&step_concept_id) = step_ids.get(&step.id) else {
                continue;
            };
            for dep in &step.depends_on {
                let Some(&dep_concept_id) = step_ids.get(dep) else {
                    continue;
                };
                let edge = Edge::new(
                    step_concept_id,
                    dep_concept_id,
                    rel::DEPENDS_ON,
                    Provenance::new("procedure.create_from_json", Uuid::new_v4()),
                );
                self.ksg.store().upsert(Entity::Edge(edge)).await?;
            }
        }

        Ok(procedure_id)
    }

    /// `hydrate(procedureUuid) -> plan` (spec §4.3): reconstructs the
    /// executable plan from the graph, not the stored `planJson` blob.
    pub async fn hydrate(&self, procedure_id: Uuid) -> Result<Plan> {
        let procedure = self
            .ksg
            .store()
            .get_node(procedure_id)
            .await?
            .ok_or(Error::NotFound(procedure_id))?;

        let has_step_edges = self.ksg.store().edges_from(procedure_id, Some(rel::HAS_STEP)).await?;
        let mut steps = Vec::with_capacity(has_step_edges.len());
        let mut concept_to_step_id: HashMap<Uuid, String> = HashMap::new();

        let mut step_nodes = Vec::new();
        for edge in &has_step_edges {
            let Some(node) = self.ksg.store().get_node(edge.to).await? else {
                continue;
            };
            let step_id = node.get_str("stepId").unwrap_or_default().to_string();
            concept_to_step_id.insert(node.id, step_id);
            step_nodes.push(node);
        }

        for node in &step_nodes {
            let step_id = concept_to_step_id.get(&node.id).cloned().unwrap_or_default();
            let depends_on_edges = self.ksg.store().edges_from(node.id, Some(rel::DEPENDS_ON)).await?;
            let depends_on: Vec<String> = depends_on_edges
                .iter()
                .filter_map(|e| concept_to_step_id.get(&e.to).cloned())
                .collect();

            let params = node
                .props
                .get("params")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let on_fail: OnFail = node
                .props
                .get("on_fail")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default();
            let kind: StepKind = node
                .props
                .get("kind")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default();

            steps.push(PlanStep {
                id: step_id,
                name: node.get_str("name").map(str::to_string),
                tool: node.get_str("tool").unwrap_or_default().to_string(),
                params,
                depends_on,
                on_fail,
                kind,
            });
        }

        Ok(Plan {
            name: procedure.get_str("name").unwrap_or_default().to_string(),
            description: procedure.get_str("description").map(str::to_string),
            steps,
            subprocedures: Vec::new(),
            edges: Vec::new(),
        })
    }
}
