//! Agent loop (C9, spec §4.9): the per-request pipeline tying every
//! other component together — classify, retrieve, plan, reuse-check,
//! confidence-gate, execute with adaptation, and always persist.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ksg::Ksg;
use crate::learning::LearningEngine;
use crate::llm::{ChatMessage, ChatOptions, ResponseFormat};
use crate::parser::{DeterministicParser, Intent};
use crate::procedure::{LlmPlanResponse, Plan, ProcedureSubsystem, ReuseHint, StepOutcome};
use crate::tools::{CancellationCtx, ToolRegistry};
use crate::working_memory::WorkingMemory;
use tracing::{debug, info, instrument, warn};

/// Per-step execution state (spec §4.9 state machine: `PENDING ->
/// RUNNING -> {SUCCESS, TOOL_ERROR, TIMEOUT}`, with `TOOL_ERROR` looping
/// back through adaptation up to `MAX_ADAPT_ATTEMPTS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Running,
    Success,
    ToolError,
    Timeout,
    Failure,
}

/// What the agent loop decided to do with a request, and why, surfaced
/// to callers that want to display or log the decision (spec §4.9).
#[derive(Debug, Clone)]
pub enum AgentOutcome {
    /// The plan ran to completion (possibly after adaptation).
    Completed { trace_id: Uuid, run_id: Uuid, step_states: Vec<(String, StepState)> },
    /// Confidence was below `PLAN_MIN_CONFIDENCE`, or every adaptation
    /// attempt was exhausted: the loop surfaces the request back to a
    /// human rather than guessing (spec §4.9 `ASK_USER`).
    AskUser { trace_id: Uuid, reason: String },
    /// The deterministic parser classified the request with high
    /// confidence and no procedure planning was needed (e.g. a bare
    /// recall query satisfied entirely by retrieval).
    Answered { trace_id: Uuid, intent: Intent, retrieved: Vec<Uuid> },
}

/// Ties together every component for one request (spec §4.9). Callers
/// construct one per process (or per session, for the working-memory
/// instance) and call [`AgentLoop::handle`] per incoming request.
pub struct AgentLoop {
    ksg: Arc<Ksg>,
    procedures: Arc<ProcedureSubsystem>,
    tools: Arc<ToolRegistry>,
    learning: Arc<LearningEngine>,
    working_memory: Arc<WorkingMemory>,
    parser: DeterministicParser,
    config: Config,
}

impl AgentLoop {
    #[must_use]
    pub fn new(
        ksg: Arc<Ksg>,
        procedures: Arc<ProcedureSubsystem>,
        tools: Arc<ToolRegistry>,
        learning: Arc<LearningEngine>,
        working_memory: Arc<WorkingMemory>,
        config: Config,
    ) -> Self {
        Self {
            ksg,
            procedures,
            tools,
            learning,
            working_memory,
            parser: DeterministicParser::new(),
            config,
        }
    }

    /// Runs the full pipeline for one piece of user input (spec §4.9):
    /// classify → retrieve (+ working-memory boost) → plan → reuse check
    /// → confidence gate → execute (with adaptation) → persist.
    #[instrument(skip(self, input))]
    pub async fn handle(&self, input: &str) -> Result<AgentOutcome> {
        let trace_id = Uuid::new_v4();
        debug!(%trace_id, "handling request");

        let classification = self.parser.classify(input);
        let retrieved = self.retrieve(input).await?;
        for id in &retrieved {
            self.working_memory.link(*id);
            self.working_memory.access(*id);
        }

        if classification.intent == Intent::Recall
            && classification.confidence >= crate::parser::SHORT_CIRCUIT_CONFIDENCE
        {
            debug!(%trace_id, "recall query short-circuited to retrieval only");
            return Ok(AgentOutcome::Answered {
                trace_id,
                intent: classification.intent,
                retrieved,
            });
        }

        let skip_llm = self.config.skip_llm_for_obvious_intents
            && classification.confidence >= crate::parser::SHORT_CIRCUIT_CONFIDENCE
            && classification.intent != Intent::Ambiguous;

        let reuse_hints = self.procedures.find_reusable(input, self.config.reuse_threshold).await?;
        if let Some(hint) = reuse_hints.iter().find(|h| matches!(h, ReuseHint::Execute { .. })) {
            if hint.score() > self.config.reuse_threshold {
                info!(%trace_id, procedure_id = %hint.procedure_id(), score = hint.score(), "reusing stored procedure");
                let plan = self.procedures.hydrate(hint.procedure_id()).await?;
                return self.execute_plan(hint.procedure_id(), &plan, trace_id).await;
            }
        }

        let plan_response = self.plan(input, skip_llm).await?;
        let Some(plan_response) = plan_response else {
            warn!(%trace_id, "LLM plan response failed to parse, asking user");
            return Ok(AgentOutcome::AskUser {
                trace_id,
                reason: "could not parse a plan from the LLM response".into(),
            });
        };

        if plan_response.confidence < self.config.plan_min_confidence {
            warn!(%trace_id, confidence = plan_response.confidence, "plan confidence below threshold, asking user");
            return Ok(AgentOutcome::AskUser {
                trace_id,
                reason: format!(
                    "plan confidence {:.2} below threshold {:.2}",
                    plan_response.confidence, self.config.plan_min_confidence
                ),
            });
        }

        let plan = plan_response.into_plan();
        let procedure_id = self.procedures.create_from_json(&plan, None).await?;
        self.execute_plan(procedure_id, &plan, trace_id).await
    }

    /// Retrieval: concept search plus reusable-procedure search, unioned
    /// by id and ranked by score after a working-memory boost (spec §4.9
    /// "search memory by embedded query, search KSG concepts, search
    /// procedures. Boost each result's score through C7").
    async fn retrieve(&self, query: &str) -> Result<Vec<Uuid>> {
        let query_embedding = self.ksg.llm.embed(query).await?;
        let concept_filter = crate::store::SearchFilter::by_kind(crate::types::NodeKind::Concept.as_str());
        let concept_hits = self
            .ksg
            .store()
            .search(&concept_filter, Some(&query_embedding), 8, 0.3)
            .await?;
        let procedure_hints = self.procedures.find_reusable(query, 0.0).await?;

        let mut best_score: std::collections::HashMap<Uuid, f32> = std::collections::HashMap::new();
        for hit in concept_hits {
            best_score
                .entry(hit.node.id)
                .and_modify(|s| *s = s.max(hit.score))
                .or_insert(hit.score);
        }
        for hint in procedure_hints {
            best_score
                .entry(hint.procedure_id())
                .and_modify(|s| *s = s.max(hint.score()))
                .or_insert(hint.score());
        }

        let mut boosted: Vec<(Uuid, f32)> = best_score
            .into_iter()
            .map(|(id, score)| (id, self.working_memory.boost(score, id)))
            .collect();
        boosted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(boosted.into_iter().map(|(id, _)| id).collect())
    }

    /// Asks the LLM for a JSON plan unless the deterministic parser
    /// already resolved the intent with high confidence, in which case a
    /// single-step plan is synthesized directly from the classification
    /// (spec §4.9 `SKIP_LLM_FOR_OBVIOUS_INTENTS`).
    async fn plan(&self, input: &str, skip_llm: bool) -> Result<Option<LlmPlanResponse>> {
        if skip_llm {
            return Ok(Some(synthesize_plan_from_intent(input, self.parser.classify(input).intent)));
        }

        let messages = [
            ChatMessage::system(
                "Produce a JSON plan: {\"name\":...,\"description\":...,\"confidence\":0..1,\"steps\":[...]}. \
                 Respond with JSON only.",
            ),
            ChatMessage::user(input),
        ];
        let options = ChatOptions {
            response_format: ResponseFormat::Json,
            ..Default::default()
        };
        let reply = self.ksg.llm.chat(&messages, &options).await?;
        Ok(LlmPlanResponse::parse(&reply))
    }

    /// Executes a validated plan step-by-step, adapting on `TOOL_ERROR`
    /// up to `MAX_ADAPT_ATTEMPTS` before surfacing `ASK_USER` (spec
    /// §4.9). Independent branches of the DAG (no shared dependency)
    /// could run concurrently (spec §5); this executor runs topologically
    /// sorted batches so that guarantee holds without requiring it.
    #[instrument(skip(self, plan), fields(procedure_id = %procedure_id, step_count = plan.steps.len()))]
    async fn execute_plan(&self, procedure_id: Uuid, plan: &Plan, trace_id: Uuid) -> Result<AgentOutcome> {
        let order = topological_order(plan);
        let mut step_states: Vec<(String, StepState)> = Vec::new();
        let mut step_outcomes: Vec<StepOutcome> = Vec::new();
        let mut overall_success = true;

        'steps: for step_id in order {
            let Some(step) = plan.steps.iter().find(|s| s.id == step_id) else {
                continue;
            };
            let mut state = StepState::Pending;
            let mut attempts = 0;
            let mut last_error = String::new();

            loop {
                state = StepState::Running;
                let ctx = CancellationCtx::with_timeout(self.config.tool_timeout);
                let Some(descriptor) = self.tools.get(&step.tool) else {
                    return Err(Error::UnknownTool(step.tool.clone()));
                };

                match descriptor.invoke.invoke(&step.params, &ctx).await {
                    Ok(_) => {
                        state = StepState::Success;
                        break;
                    }
                    Err(err) if matches!(err, Error::Timeout) => {
                        state = StepState::Timeout;
                        last_error = err.to_string();
                        break;
                    }
                    Err(err) => {
                        state = StepState::ToolError;
                        last_error = err.to_string();
                        attempts += 1;
                        warn!(%trace_id, step_id = %step.id, attempt = attempts, error = %last_error, "step failed, adapting");
                        if attempts > self.config.max_adapt_attempts {
                            state = StepState::Failure;
                            warn!(%trace_id, step_id = %step.id, "adaptation attempts exhausted");
                            break;
                        }
                        self.adapt(procedure_id, &step.id, &last_error).await?;
                        continue;
                    }
                }
            }

            let success = state == StepState::Success;
            step_states.push((step.id.clone(), state));
            step_outcomes.push(StepOutcome {
                step_id: step.id.clone(),
                success,
                error: (!success).then(|| last_error.clone()),
            });

            if !success {
                overall_success = false;
                if matches!(step.on_fail, crate::procedure::OnFail::Stop) {
                    self.learning
                        .analyze_failure(step.name.as_deref().unwrap_or(&step.id), &last_error, &plan.name, &[])
                        .await?;
                    break 'steps;
                }
            }
        }

        if step_outcomes.iter().all(|o| !o.success) && !step_outcomes.is_empty() {
            let run_id = self.procedures.record_run(procedure_id, false, &step_outcomes, trace_id).await?;
            return Ok(AgentOutcome::AskUser {
                trace_id,
                reason: format!("all adaptation attempts exhausted for run {run_id}"),
            });
        }

        let run_id = self.procedures.record_run(procedure_id, overall_success, &step_outcomes, trace_id).await?;
        if overall_success {
            self.learning.learn_from_success(&plan.name, "completed").await?;
        }
        for (step_id, _) in &step_states {
            self.working_memory.link(Uuid::new_v5(&Uuid::NAMESPACE_OID, step_id.as_bytes()));
        }

        Ok(AgentOutcome::Completed {
            trace_id,
            run_id,
            step_states,
        })
    }

    /// Selector/parameter adaptation after a `TOOL_ERROR` (spec §4.9
    /// "adapt"): asks the LLM for a replacement selector and persists it
    /// via `persistWinningSelector` so the next attempt (and future
    /// reuse) picks it up.
    #[instrument(skip(self, error))]
    async fn adapt(&self, procedure_id: Uuid, step_id: &str, error: &str) -> Result<()> {
        let prompt = format!(
            "A tool step failed with error: {error}\nSuggest a single CSS selector that might work instead. \
             Respond with the selector only, nothing else."
        );
        let reply = self
            .ksg
            .llm
            .chat(&[ChatMessage::user(prompt)], &ChatOptions::default())
            .await?;
        let selector = reply.trim();
        if selector.is_empty() {
            return Ok(());
        }
        debug!(%procedure_id, step_id, selector, "persisting adapted selector");
        self.procedures.persist_winning_selector(procedure_id, step_id, selector).await
    }
}

/// Kahn's-algorithm topological sort over `depends_on`. Plans are
/// already validated acyclic by [`crate::procedure::validate_plan`], so
/// this never needs to report a cycle itself.
fn topological_order(plan: &Plan) -> Vec<String> {
    use std::collections::{HashMap, VecDeque};

    let mut in_degree: HashMap<&str, usize> = plan.steps.iter().map(|s| (s.id.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in &plan.steps {
        for dep in &step.depends_on {
            *in_degree.get_mut(step.id.as_str()).unwrap_or(&mut 0) += 1;
            dependents.entry(dep.as_str()).or_default().push(step.id.as_str());
        }
    }

    let mut queue: VecDeque<&str> = plan
        .steps
        .iter()
        .map(|s| s.id.as_str())
        .filter(|id| in_degree.get(id).copied().unwrap_or(0) == 0)
        .collect();
    let mut order = Vec::with_capacity(plan.steps.len());
    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        if let Some(deps) = dependents.get(id) {
            for &dependent in deps {
                if let Some(d) = in_degree.get_mut(dependent) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }
    }
    order
}

/// Synthesizes a trivial single-step plan directly from a high-confidence
/// deterministic classification, bypassing LLM planning entirely (spec
/// §4.9 `SKIP_LLM_FOR_OBVIOUS_INTENTS`).
fn synthesize_plan_from_intent(input: &str, intent: Intent) -> LlmPlanResponse {
    let (name, tool): (&str, &str) = match intent {
        Intent::Reminder => ("Set reminder", "queue.enqueue"),
        Intent::CalendarCreate => ("Create calendar event", "queue.enqueue"),
        Intent::TaskCreate => ("Create task", "queue.enqueue"),
        Intent::Recall | Intent::Ambiguous => ("Recall", "memory.recall"),
    };
    let mut params = serde_json::Map::new();
    params.insert("item".into(), json!({"text": input}));
    let step = crate::procedure::PlanStep {
        id: "s1".into(),
        name: Some(name.to_string()),
        tool: tool.into(),
        params: match tool {
            "memory.recall" => {
                let mut p = serde_json::Map::new();
                p.insert("query".into(), Value::String(input.to_string()));
                p
            }
            _ => params,
        },
        depends_on: Vec::new(),
        on_fail: crate::procedure::OnFail::Stop,
        kind: crate::procedure::StepKind::Operation,
    };
    LlmPlanResponse {
        name: name.to_string(),
        description: Some(input.to_string()),
        confidence: 0.95,
        steps: vec![step],
    }
}
