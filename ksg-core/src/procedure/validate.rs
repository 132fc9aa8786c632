//! `validate(plan)` (spec §4.3): fails `InvalidPlan` for duplicate step
//! ids, unknown tool, dependency on an unknown id, a cycle in
//! `depends_on`, or missing required params for a declared tool.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::tools::ToolRegistry;

use super::plan::Plan;

pub fn validate(plan: &Plan, tools: &ToolRegistry) -> Result<()> {
    let mut seen_ids = HashSet::new();
    for step in &plan.steps {
        if !seen_ids.insert(step.id.clone()) {
            return Err(Error::InvalidPlan(format!("duplicate step id '{}'", step.id)));
        }
    }

    for step in &plan.steps {
        if !tools.contains(&step.tool) {
            return Err(Error::InvalidPlan(format!(
                "step '{}' references unknown tool '{}'",
                step.id, step.tool
            )));
        }
        for dep in &step.depends_on {
            if !seen_ids.contains(dep) {
                return Err(Error::InvalidPlan(format!(
                    "step '{}' depends on unknown step id '{dep}'",
                    step.id
                )));
            }
        }
        if !tools.params_satisfy(&step.tool, &step.params) {
            return Err(Error::InvalidPlan(format!(
                "step '{}' is missing required params for tool '{}'",
                step.id, step.tool
            )));
        }
    }

    assert_no_depends_on_cycle(plan)?;
    Ok(())
}

fn assert_no_depends_on_cycle(plan: &Plan) -> Result<()> {
    let adjacency: HashMap<&str, &[String]> = plan
        .steps
        .iter()
        .map(|s| (s.id.as_str(), s.depends_on.as_slice()))
        .collect();

    #[derive(PartialEq, Clone, Copy)]
    enum Mark {
        Visiting,
        Done,
    }
    let mut marks: HashMap<&str, Mark> = HashMap::new();

    fn visit<'a>(
        node: &'a str,
        adjacency: &HashMap<&'a str, &'a [String]>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Result<()> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(Error::InvalidPlan(format!(
                    "cycle detected in depends_on graph at step '{node}'"
                )))
            }
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        if let Some(deps) = adjacency.get(node) {
            for dep in deps.iter() {
                visit(dep, adjacency, marks)?;
            }
        }
        marks.insert(node, Mark::Done);
        Ok(())
    }

    for step in plan.steps.iter().map(|s| s.id.as_str()) {
        visit(step, &adjacency, &mut marks)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedure::plan::PlanStep;
    use crate::tools::{NullToolInvoker, ToolRegistry};
    use serde_json::{json, Map};
    use std::sync::Arc;

    fn tools() -> ToolRegistry {
        ToolRegistry::with_canonical_tools(Arc::new(NullToolInvoker))
    }

    fn step(id: &str, tool: &str, deps: &[&str]) -> PlanStep {
        let mut params = Map::new();
        if tool == "web.fill" {
            params.insert("url".into(), json!("https://example.com"));
            params.insert("selector".into(), json!("#email"));
            params.insert("text".into(), json!("a@b.com"));
        }
        PlanStep {
            id: id.into(),
            name: None,
            tool: tool.into(),
            params,
            depends_on: deps.iter().map(|s| (*s).to_string()).collect(),
            on_fail: Default::default(),
            kind: Default::default(),
        }
    }

    #[test]
    fn rejects_duplicate_ids() {
        let plan = Plan {
            name: "p".into(),
            steps: vec![step("s1", "web.fill", &[]), step("s1", "web.fill", &[])],
            ..Default::default()
        };
        assert!(validate(&plan, &tools()).is_err());
    }

    #[test]
    fn rejects_unknown_tool() {
        let plan = Plan {
            name: "p".into(),
            steps: vec![step("s1", "nonexistent.tool", &[])],
            ..Default::default()
        };
        assert!(validate(&plan, &tools()).is_err());
    }

    #[test]
    fn rejects_dependency_on_unknown_id() {
        let plan = Plan {
            name: "p".into(),
            steps: vec![step("s1", "web.fill", &["ghost"])],
            ..Default::default()
        };
        assert!(validate(&plan, &tools()).is_err());
    }

    #[test]
    fn rejects_cycles() {
        let plan = Plan {
            name: "p".into(),
            steps: vec![step("s1", "web.fill", &["s2"]), step("s2", "web.fill", &["s1"])],
            ..Default::default()
        };
        assert!(validate(&plan, &tools()).is_err());
    }

    #[test]
    fn rejects_missing_required_params() {
        let plan = Plan {
            name: "p".into(),
            steps: vec![PlanStep {
                id: "s1".into(),
                name: None,
                tool: "web.fill".into(),
                params: Map::new(),
                depends_on: vec![],
                on_fail: Default::default(),
                kind: Default::default(),
            }],
            ..Default::default()
        };
        assert!(validate(&plan, &tools()).is_err());
    }

    #[test]
    fn accepts_a_well_formed_dag() {
        let plan = Plan {
            name: "p".into(),
            steps: vec![step("s1", "web.fill", &[]), step("s2", "web.fill", &["s1"])],
            ..Default::default()
        };
        assert!(validate(&plan, &tools()).is_ok());
    }
}
