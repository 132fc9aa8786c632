//! Form engine (C4, spec §4.4): URL+HTML fingerprinting, pattern reuse,
//! fallback selector trial, and credential lookup by domain.

mod fingerprint;
mod pattern;
mod vault;

pub use fingerprint::{fingerprint, FormShape};
pub use pattern::{match_score, PatternLookup, DEFAULT_MIN_SCORE};
pub use vault::VaultKind;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::ksg::Ksg;
use crate::tools::{CancellationCtx, ToolInvoker};
use tracing::{debug, instrument, warn};

/// The web-tool surface the form engine drives (spec §6.2
/// `web.get_dom`/`web.fill`). Callers wire a real adapter; the engine
/// only ever sees this trait.
#[async_trait]
pub trait WebTool: Send + Sync {
    async fn get_dom(&self, url: &str) -> Result<FormShape>;
    async fn fill(&self, url: &str, selector: &str, text: &str) -> Result<()>;
}

/// Recognized field-type synonyms (spec §4.4 step 6): a requested field
/// name is resolved to its canonical vaulted-value key before lookup.
#[must_use]
pub fn canonical_field(field: &str) -> &str {
    match field {
        "username" => "email",
        "pass" => "password",
        "cc-number" => "cardNumber",
        "cc-exp" => "expiry",
        "cc-csc" => "cvv",
        other => other,
    }
}

/// Ordered fallback selectors keyed by field type (spec §4.4 step 4).
/// Tried in order after the pattern's stored selector fails.
#[must_use]
pub fn fallback_selectors(field: &str) -> &'static [&'static str] {
    match canonical_field(field) {
        "email" => &[
            "input[type=email]",
            "input[name*=email i]",
            "input[name*=user i]",
            "input[id*=email i]",
            "input[id*=user i]",
        ],
        "password" => &[
            "input[type=password]",
            "input[name*=pass i]",
            "input[id*=pass i]",
        ],
        "cardNumber" => &["[autocomplete=cc-number]", "input[name*=card i]"],
        "expiry" => &["[autocomplete=cc-exp]", "input[name*=exp i]"],
        "cvv" => &["[autocomplete=cc-csc]", "input[name*=cvv i]", "input[name*=csc i]"],
        _ => &[],
    }
}

/// Outcome of [`FormEngine::autofill`]: which fields were filled (and
/// with which selector) versus which required values were missing
/// (spec §6.2 `form.autofill` shape `{filled[], missing[]}`).
#[derive(Debug, Clone, Default)]
pub struct AutofillOutcome {
    pub filled: Vec<String>,
    pub missing: Vec<String>,
}

/// The form-pattern / autofill engine (C4).
pub struct FormEngine {
    pub(crate) ksg: Arc<Ksg>,
    pub(crate) web: Option<Arc<dyn WebTool>>,
}

impl FormEngine {
    #[must_use]
    pub fn new(ksg: Arc<Ksg>, web: Option<Arc<dyn WebTool>>) -> Self {
        Self { ksg, web }
    }

    /// Autofill algorithm (spec §4.4):
    /// 1. fetch DOM, 2. select a vaulted credential set by domain/recency,
    /// 3. enumerate required fields, 4. fill with stored selector or
    /// fallbacks, 5. persist the first successful fallback, 6. resolve
    /// synonyms.
    #[instrument(skip(self, values), fields(field_count = required_fields.len()))]
    pub async fn autofill(
        &self,
        url: &str,
        form_type: &str,
        domain: &str,
        required_fields: &[String],
        values: &HashMap<String, String>,
    ) -> Result<AutofillOutcome> {
        let web = self
            .web
            .clone()
            .ok_or_else(|| Error::AdapterUnavailable("web tool not configured".into()))?;

        let shape = web.get_dom(url).await?;
        let lookup = self.lookup_pattern(&shape, form_type, DEFAULT_MIN_SCORE).await?;

        let vaulted = self.find_vaulted(VaultKind::Credential, domain).await?;

        let mut resolved_values: HashMap<String, String> = HashMap::new();
        for field in required_fields {
            let canonical = canonical_field(field);
            if let Some(v) = values.get(field).or_else(|| values.get(canonical)) {
                resolved_values.insert(field.clone(), v.clone());
            } else if let Some(node) = &vaulted {
                if let Some(v) = node.get_str(canonical) {
                    resolved_values.insert(field.clone(), v.to_string());
                }
            }
        }

        let mut outcome = AutofillOutcome::default();
        let mut selectors: HashMap<String, String> = match &lookup {
            PatternLookup::Exact { selectors, .. } | PatternLookup::BestMatch { selectors, .. } => selectors.clone(),
            PatternLookup::NotFound => HashMap::new(),
        };
        let pattern_id = match &lookup {
            PatternLookup::Exact { pattern_id, .. } | PatternLookup::BestMatch { pattern_id, .. } => Some(*pattern_id),
            PatternLookup::NotFound => None,
        };

        for field in required_fields {
            let Some(value) = resolved_values.get(field) else {
                outcome.missing.push(field.clone());
                continue;
            };

            if let Some(selector) = selectors.get(field) {
                if web.fill(url, selector, value).await.is_ok() {
                    outcome.filled.push(field.clone());
                    continue;
                }
                warn!(field, selector, "stored selector failed, trying fallbacks");
            }

            let mut filled_with_fallback = None;
            for candidate in fallback_selectors(field) {
                if web.fill(url, candidate, value).await.is_ok() {
                    filled_with_fallback = Some((*candidate).to_string());
                    break;
                }
            }

            match filled_with_fallback {
                Some(selector) => {
                    debug!(field, selector, "filled via fallback selector");
                    outcome.filled.push(field.clone());
                    selectors.insert(field.clone(), selector.clone());
                    if let Some(id) = pattern_id {
                        self.update_selector(id, field, &selector).await?;
                    }
                }
                None => {
                    warn!(field, "all selectors failed");
                    return Err(Error::AllSelectorsFailed(field.clone()));
                }
            }
        }

        if pattern_id.is_none() && !outcome.filled.is_empty() {
            self.store_pattern(&shape, form_type, &selectors).await?;
        }

        if let Some(node) = vaulted {
            self.record_vault_recall(node.id).await?;
        }

        Ok(outcome)
    }

    pub fn ksg(&self) -> &Arc<Ksg> {
        &self.ksg
    }
}

/// No-op web tool used by tests and as a safe default when no real
/// browser adapter is wired in.
pub struct NullWebTool;

#[async_trait]
impl WebTool for NullWebTool {
    async fn get_dom(&self, _url: &str) -> Result<FormShape> {
        Ok(FormShape {
            domain: String::new(),
            path: String::new(),
            labels: Vec::new(),
            input_types: Vec::new(),
            placeholders: Vec::new(),
        })
    }

    async fn fill(&self, _url: &str, _selector: &str, _text: &str) -> Result<()> {
        Ok(())
    }
}

/// Adapts a [`ToolInvoker`] registered under the canonical `web.*` tool
/// names (spec §6.2) into a [`WebTool`], so the form engine can drive
/// whichever browser adapter the agent loop's tool registry already
/// wires in rather than needing a second, parallel collaborator wired
/// separately.
pub struct ToolInvokerWebTool {
    pub get_dom: Arc<dyn ToolInvoker>,
    pub fill: Arc<dyn ToolInvoker>,
}

#[async_trait]
impl WebTool for ToolInvokerWebTool {
    async fn get_dom(&self, url: &str) -> Result<FormShape> {
        let mut params = Map::new();
        params.insert("url".into(), Value::String(url.to_string()));
        let ctx = CancellationCtx::with_timeout(std::time::Duration::from_secs(30));
        let result = self.get_dom.invoke(&params, &ctx).await?;
        Ok(shape_from_dom_result(url, &result))
    }

    async fn fill(&self, url: &str, selector: &str, text: &str) -> Result<()> {
        let mut params = Map::new();
        params.insert("url".into(), Value::String(url.to_string()));
        params.insert("selector".into(), Value::String(selector.to_string()));
        params.insert("text".into(), Value::String(text.to_string()));
        let ctx = CancellationCtx::with_timeout(std::time::Duration::from_secs(30));
        let result = self.fill.invoke(&params, &ctx).await?;
        if result.get("error").is_some() {
            return Err(Error::ToolError {
                tool: "web.fill".into(),
                message: result.get("error").and_then(Value::as_str).unwrap_or("fill failed").to_string(),
            });
        }
        Ok(())
    }
}

fn shape_from_dom_result(url: &str, result: &Value) -> FormShape {
    let (domain, path) = split_url(url);
    FormShape {
        domain,
        path,
        labels: string_array(result, "labels"),
        input_types: string_array(result, "input_types"),
        placeholders: string_array(result, "placeholders"),
    }
}

/// Splits a URL into `(domain, path)` for fingerprinting (spec §4.4).
/// Falls back to the raw string as the domain if it doesn't parse.
fn split_url(raw: &str) -> (String, String) {
    match url::Url::parse(raw) {
        Ok(parsed) => (parsed.host_str().unwrap_or(raw).to_string(), parsed.path().to_string()),
        Err(_) => (raw.to_string(), String::new()),
    }
}

fn string_array(result: &Value, key: &str) -> Vec<String> {
    result
        .get(key)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synonyms_resolve_to_canonical_field() {
        assert_eq!(canonical_field("username"), "email");
        assert_eq!(canonical_field("cc-number"), "cardNumber");
        assert_eq!(canonical_field("cvv"), "cvv");
    }

    #[test]
    fn fallback_selectors_follow_declared_order() {
        let email = fallback_selectors("email");
        assert_eq!(email[0], "input[type=email]");
        assert_eq!(email.last(), Some(&"input[id*=user i]"));
    }
}
