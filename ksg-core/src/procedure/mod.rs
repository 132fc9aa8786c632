//! Procedure subsystem (C3, spec §4.3): conversion of LLM JSON plans into
//! directed-acyclic procedure graphs, storage, reuse, selector adaptation,
//! and auto-generalization from exemplars.

mod graph;
mod plan;
mod reuse;
mod validate;

pub use plan::{LlmPlanResponse, OnFail, Plan, PlanEdge, PlanEdgeRel, PlanStep, StepKind};
pub use reuse::{ReuseHint, StepOutcome};
pub use validate::validate as validate_plan;

use std::sync::Arc;

use crate::ksg::Ksg;
use crate::tools::ToolRegistry;

/// Similarity floor above which `findReusable` considers a stored
/// procedure a candidate (spec §4.9's `REUSE_THRESHOLD` default).
pub const DEFAULT_REUSE_THRESHOLD: f32 = 0.8;

/// Similarity floor and mean-pairwise-similarity floor used by the
/// generalization trigger after a successful run (spec §4.3).
pub const GENERALIZE_SIMILARITY_THRESHOLD: f32 = 0.8;
pub const GENERALIZE_MEAN_PAIRWISE_THRESHOLD: f32 = 0.75;

/// Wraps C2 (KSG) with the procedure-specific operations of spec §4.3.
pub struct ProcedureSubsystem {
    pub(crate) ksg: Arc<Ksg>,
    pub(crate) tools: Arc<ToolRegistry>,
}

impl ProcedureSubsystem {
    #[must_use]
    pub fn new(ksg: Arc<Ksg>, tools: Arc<ToolRegistry>) -> Self {
        Self { ksg, tools }
    }

    #[must_use]
    pub fn ksg(&self) -> &Arc<Ksg> {
        &self.ksg
    }
}
