//! Tool registry and external tool-invoker contract (spec §6.2, §9
//! "Dynamic dispatch over tool names").
//!
//! Canonical tools the core must know the shapes of (spec §6.2) are
//! registered by [`ToolRegistry::with_canonical_tools`]; the plan
//! validator (§4.3) and the agent loop's executor (§4.9) both consult the
//! same registry so an unknown tool name is a first-class `UnknownTool`
//! error rather than a runtime crash.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Cancellation context threaded through every tool call (spec §5).
#[derive(Clone)]
pub struct CancellationCtx {
    pub deadline: Instant,
    pub token: CancellationToken,
}

impl CancellationCtx {
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline || self.token.is_cancelled()
    }
}

/// A named external tool the core dispatches to by string name (spec
/// §6.2). Implementations wrap the actual collaborator (web automation,
/// calendar, shell, forms, ...); the core only ever sees this trait.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, params: &Map<String, Value>, ctx: &CancellationCtx) -> Result<Value>;
}

/// Declares a tool's required parameter names and its invoker.
pub struct ToolDescriptor {
    pub required_params: Vec<String>,
    pub invoke: Arc<dyn ToolInvoker>,
}

/// Maps tool name to descriptor. Unknown names produce `Error::UnknownTool`
/// (spec §6.2) rather than panicking.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, descriptor: ToolDescriptor) {
        self.tools.insert(name.into(), descriptor);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registers the canonical tool shapes named in spec §6.2 with the
    /// given invoker for each (callers typically wire distinct invokers
    /// per tool; this helper is for tests and simple deployments that use
    /// one invoker for everything).
    #[must_use]
    pub fn with_canonical_tools(invoker: Arc<dyn ToolInvoker>) -> Self {
        let mut registry = Self::new();
        let canonical: &[(&str, &[&str])] = &[
            ("web.get_dom", &["url"]),
            ("web.screenshot", &["url"]),
            ("web.fill", &["url", "selector", "text"]),
            ("web.click_selector", &["url", "selector"]),
            ("web.wait_for", &["url", "selector"]),
            ("form.autofill", &["url"]),
            ("memory.remember", &["key", "value"]),
            ("memory.recall", &["query"]),
            ("procedure.create", &["plan"]),
            ("procedure.search", &["query"]),
            ("procedure.run", &["uuid"]),
            ("dag.execute", &["concept_uuid"]),
            ("queue.enqueue", &["item"]),
            ("queue.update", &["uuid", "state"]),
        ];
        for (name, params) in canonical {
            registry.register(
                *name,
                ToolDescriptor {
                    required_params: params.iter().map(|s| (*s).to_string()).collect(),
                    invoke: Arc::clone(&invoker),
                },
            );
        }
        registry
    }

    /// `true` if `params` includes every name in the descriptor's
    /// `required_params` (used by `validate`, spec §4.3).
    #[must_use]
    pub fn params_satisfy(&self, tool: &str, params: &Map<String, Value>) -> bool {
        match self.get(tool) {
            Some(descriptor) => descriptor.required_params.iter().all(|p| params.contains_key(p)),
            None => false,
        }
    }
}

/// No-op invoker used by tests and as a safe default before a real
/// collaborator is wired in.
pub struct NullToolInvoker;

#[async_trait]
impl ToolInvoker for NullToolInvoker {
    async fn invoke(&self, _params: &Map<String, Value>, _ctx: &CancellationCtx) -> Result<Value> {
        Ok(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_tool_is_not_registered() {
        let registry = ToolRegistry::with_canonical_tools(Arc::new(NullToolInvoker));
        assert!(!registry.contains("totally.unknown"));
        assert!(registry.contains("web.fill"));
    }

    #[test]
    fn params_satisfy_checks_required_keys() {
        let registry = ToolRegistry::with_canonical_tools(Arc::new(NullToolInvoker));
        let mut params = Map::new();
        params.insert("url".into(), json!("https://example.com"));
        assert!(!registry.params_satisfy("web.fill", &params));
        params.insert("selector".into(), json!("#email"));
        params.insert("text".into(), json!("ada@example.com"));
        assert!(registry.params_satisfy("web.fill", &params));
    }

    #[tokio::test]
    async fn cancellation_ctx_expires_after_timeout() {
        let ctx = CancellationCtx::with_timeout(Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(ctx.is_expired());
    }
}
