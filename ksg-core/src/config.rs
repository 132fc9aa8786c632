//! Environment-driven configuration (spec §6.4). Every knob has a typed
//! default so the agent loop, form engine, and working memory behave
//! sensibly with no environment configured at all; [`Config::from_env`]
//! overrides defaults from process environment variables when present.

use std::env;
use std::time::Duration;

use crate::working_memory::{DEFAULT_ALPHA, DEFAULT_GAMMA, DEFAULT_MAX_WEIGHT};

/// `LLM_PROVIDER` (spec §6.4): which backend [`crate::llm::LlmClient`] is
/// wired to. The core itself is provider-agnostic; this only documents
/// the caller's choice for logging/config display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Local,
    Mock,
}

impl LlmProvider {
    fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "openai" => Self::OpenAi,
            "anthropic" => Self::Anthropic,
            "local" => Self::Local,
            _ => Self::Mock,
        }
    }
}

/// `EMBEDDING_BACKEND` (spec §6.4): which backend produces embeddings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingBackend {
    Provider,
    Deterministic,
}

impl EmbeddingBackend {
    fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "provider" => Self::Provider,
            _ => Self::Deterministic,
        }
    }
}

/// The full set of environment-tunable knobs (spec §6.4 table).
#[derive(Debug, Clone)]
pub struct Config {
    pub llm_provider: LlmProvider,
    pub embedding_backend: EmbeddingBackend,
    /// `USE_PLAYWRIGHT` — whether the web tool adapter drives a real
    /// browser rather than a null/mock implementation.
    pub use_playwright: bool,
    /// `USE_CPMS_FOR_FORMS` — whether an external form-detection
    /// collaborator backs [`crate::form::FormEngine`]'s fallback path.
    pub use_cpms_for_forms: bool,
    /// `KSG_PATTERN_REUSE_MIN_SCORE` (spec §4.4 default 2.0).
    pub pattern_reuse_min_score: f32,
    /// `WORKING_MEMORY_REINFORCE_DELTA` (spec §4.7 default 1.0).
    pub working_memory_reinforce_delta: f32,
    /// `WORKING_MEMORY_MAX_WEIGHT` (spec §4.7 default 100.0).
    pub working_memory_max_weight: f32,
    pub working_memory_gamma: f32,
    pub working_memory_alpha: f32,
    /// `ASYNC_REPLICATION` — whether working-memory snapshots are
    /// mirrored to durable storage via [`crate::replicator::AsyncReplicator`].
    pub async_replication: bool,
    /// `SKIP_LLM_FOR_OBVIOUS_INTENTS` (spec §4.9): short-circuit full LLM
    /// planning when the deterministic parser is confident.
    pub skip_llm_for_obvious_intents: bool,
    /// `PLAN_MIN_CONFIDENCE` (spec §4.9 default 0.9): plans below this
    /// confidence trigger `ask_user` instead of execution.
    pub plan_min_confidence: f32,
    /// `MAX_ADAPT_ATTEMPTS` (spec §4.9 default 3).
    pub max_adapt_attempts: u32,
    /// `REUSE_THRESHOLD` (spec §4.9 default 0.8, mirrors
    /// [`crate::procedure::DEFAULT_REUSE_THRESHOLD`]).
    pub reuse_threshold: f32,
    /// Default tool-call timeout (spec §5 cancellation contexts).
    pub tool_timeout: Duration,
    /// Persistent-store connection string (e.g. a redb file path),
    /// interpreted by the storage backend in use.
    pub store_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_provider: LlmProvider::Mock,
            embedding_backend: EmbeddingBackend::Deterministic,
            use_playwright: false,
            use_cpms_for_forms: false,
            pattern_reuse_min_score: crate::form::DEFAULT_MIN_SCORE,
            working_memory_reinforce_delta: crate::working_memory::DEFAULT_DELTA,
            working_memory_max_weight: DEFAULT_MAX_WEIGHT,
            working_memory_gamma: DEFAULT_GAMMA,
            working_memory_alpha: DEFAULT_ALPHA,
            async_replication: false,
            skip_llm_for_obvious_intents: true,
            plan_min_confidence: 0.9,
            max_adapt_attempts: 3,
            reuse_threshold: crate::procedure::DEFAULT_REUSE_THRESHOLD,
            tool_timeout: Duration::from_secs(30),
            store_path: None,
        }
    }
}

impl Config {
    /// Builds a [`Config`] from process environment variables, falling
    /// back to defaults for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            llm_provider: env_or(defaults.llm_provider, "LLM_PROVIDER", LlmProvider::parse),
            embedding_backend: env_or(defaults.embedding_backend, "EMBEDDING_BACKEND", EmbeddingBackend::parse),
            use_playwright: env_bool("USE_PLAYWRIGHT", defaults.use_playwright),
            use_cpms_for_forms: env_bool("USE_CPMS_FOR_FORMS", defaults.use_cpms_for_forms),
            pattern_reuse_min_score: env_f32("KSG_PATTERN_REUSE_MIN_SCORE", defaults.pattern_reuse_min_score),
            working_memory_reinforce_delta: env_f32(
                "WORKING_MEMORY_REINFORCE_DELTA",
                defaults.working_memory_reinforce_delta,
            ),
            working_memory_max_weight: env_f32("WORKING_MEMORY_MAX_WEIGHT", defaults.working_memory_max_weight),
            working_memory_gamma: env_f32("WORKING_MEMORY_GAMMA", defaults.working_memory_gamma),
            working_memory_alpha: env_f32("WORKING_MEMORY_ALPHA", defaults.working_memory_alpha),
            async_replication: env_bool("ASYNC_REPLICATION", defaults.async_replication),
            skip_llm_for_obvious_intents: env_bool(
                "SKIP_LLM_FOR_OBVIOUS_INTENTS",
                defaults.skip_llm_for_obvious_intents,
            ),
            plan_min_confidence: env_f32("PLAN_MIN_CONFIDENCE", defaults.plan_min_confidence),
            max_adapt_attempts: env::var("MAX_ADAPT_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_adapt_attempts),
            reuse_threshold: env_f32("REUSE_THRESHOLD", defaults.reuse_threshold),
            tool_timeout: env::var("TOOL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map_or(defaults.tool_timeout, Duration::from_secs),
            store_path: env::var("KSG_STORE_PATH").ok().or(defaults.store_path),
        }
    }

    /// Matching [`crate::working_memory::WorkingMemoryConfig`] for this
    /// configuration.
    #[must_use]
    pub fn working_memory_config(&self) -> crate::working_memory::WorkingMemoryConfig {
        crate::working_memory::WorkingMemoryConfig {
            delta: self.working_memory_reinforce_delta,
            max_weight: self.working_memory_max_weight,
            gamma: self.working_memory_gamma,
            alpha: self.working_memory_alpha,
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_or<T>(default: T, key: &str, parse: impl Fn(&str) -> T) -> T {
    env::var(key).ok().map_or(default, |v| parse(&v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let cfg = Config::default();
        assert!((cfg.plan_min_confidence - 0.9).abs() < 1e-6);
        assert_eq!(cfg.max_adapt_attempts, 3);
        assert!((cfg.reuse_threshold - 0.8).abs() < 1e-6);
    }

    #[test]
    fn unparseable_provider_falls_back_to_mock() {
        assert_eq!(LlmProvider::parse("not-a-provider"), LlmProvider::Mock);
    }
}
