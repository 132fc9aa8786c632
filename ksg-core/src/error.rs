//! Error taxonomy for the procedural learning agent core.
//!
//! Mirrors the kinds from spec §7: `InvalidInput`, `NotFound`,
//! `SchemaViolation`, `ToolError`, `Timeout`/`Cancelled`,
//! `AdapterUnavailable`, `InvariantViolation`, plus the storage/serialization
//! wrapping every crate needs.

use uuid::Uuid;

/// Result type alias used throughout `ksg-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds produced by the knowledge graph, procedure subsystem, form
/// engine, queue, scheduler, working memory, parser, agent loop, and
/// learning engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(Uuid),

    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("cycle detected: {0}")]
    CycleDetected(String),

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("tool error on '{tool}': {message}")]
    ToolError { tool: String, message: String },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("execution timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("collaborator unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("pattern not found")]
    PatternNotFound,

    #[error("credential missing for domain: {0}")]
    CredentialMissing(String),

    #[error("all selectors failed for field: {0}")]
    AllSelectorsFailed(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}

impl Error {
    /// Whether the agent loop may retry the operation that produced this
    /// error (spec §7 propagation policy).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ToolError { .. }
                | Error::Timeout
                | Error::AdapterUnavailable(_)
                | Error::PatternNotFound
                | Error::AllSelectorsFailed(_)
                | Error::Storage(_)
        )
    }

    /// Whether this error must abort the whole request rather than being
    /// locally recovered (spec §7: `InvariantViolation` is always fatal).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InvariantViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_is_recoverable() {
        let err = Error::ToolError {
            tool: "web.fill".into(),
            message: "selector not found".into(),
        };
        assert!(err.is_recoverable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn invariant_violation_is_fatal_and_not_recoverable() {
        let err = Error::InvariantViolation("run linked before outcomes persisted".into());
        assert!(err.is_fatal());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn not_found_carries_uuid() {
        let id = Uuid::new_v4();
        let err = Error::NotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }
}
