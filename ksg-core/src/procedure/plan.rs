//! JSON plan schema (spec §4.3 input schema, §6.1 LLM plan shape, §9
//! extended control-flow schema).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `on_fail` policy for a plan step (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnFail {
    #[default]
    Stop,
    Continue,
    Retry,
}

/// Extended control-flow node type (spec §4.3 "Extended graph schema").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    #[default]
    Operation,
    ProcedureCall,
    Conditional,
    Loop,
    Return,
    Noop,
}

/// One step in an LLM JSON plan (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub tool: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub on_fail: OnFail,
    #[serde(default)]
    pub kind: StepKind,
}

/// An explicit control-flow edge in the extended schema (spec §4.3):
/// `rel in {depends_on, branch_true, branch_false, loop_back}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanEdgeRel {
    DependsOn,
    BranchTrue,
    BranchFalse,
    LoopBack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEdge {
    pub from: String,
    pub to: String,
    pub rel: PlanEdgeRel,
}

/// The procedure-subsystem plan shape (spec §4.3): name, optional
/// description, steps, plus the extended schema's `subprocedures` and
/// explicit `edges`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Plan {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub subprocedures: Vec<Plan>,
    #[serde(default)]
    pub edges: Vec<PlanEdge>,
}

/// The LLM's top-level plan response (spec §6.1): adds `confidence` to
/// [`Plan`]. Also accepts the legacy `{intent, steps}` compatibility
/// shape per spec §6.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmPlanResponse {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub confidence: f32,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

impl LlmPlanResponse {
    /// Parses a raw JSON string from the LLM, falling back to the legacy
    /// `{intent, steps}` shape when the strict shape doesn't match.
    /// Parse errors never crash the loop (spec §6.1); they return `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if let Ok(strict) = serde_json::from_str::<Self>(raw) {
            return Some(strict);
        }
        #[derive(Deserialize)]
        struct Legacy {
            intent: String,
            #[serde(default)]
            steps: Vec<PlanStep>,
        }
        serde_json::from_str::<Legacy>(raw).ok().map(|legacy| Self {
            name: legacy.intent,
            description: None,
            confidence: 0.5,
            steps: legacy.steps,
        })
    }

    #[must_use]
    pub fn into_plan(self) -> Plan {
        Plan {
            name: self.name,
            description: self.description,
            steps: self.steps,
            subprocedures: Vec::new(),
            edges: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strict_shape() {
        let raw = r#"{"name":"Login","confidence":0.9,"steps":[]}"#;
        let plan = LlmPlanResponse::parse(raw).unwrap();
        assert_eq!(plan.name, "Login");
        assert!((plan.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn parses_legacy_intent_shape() {
        let raw = r#"{"intent":"reminder","steps":[]}"#;
        let plan = LlmPlanResponse::parse(raw).unwrap();
        assert_eq!(plan.name, "reminder");
        assert!((plan.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn garbage_input_parses_to_none() {
        assert!(LlmPlanResponse::parse("not json").is_none());
    }
}
