use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provenance header carried by every node and edge (spec §3): where it
/// came from, when, how confident the producer was, and the trace id
/// threading it back to the request that created it (spec §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub confidence: f32,
    pub trace_id: Uuid,
}

impl Provenance {
    #[must_use]
    pub fn new(source: impl Into<String>, trace_id: Uuid) -> Self {
        Self {
            source: source.into(),
            timestamp: Utc::now(),
            confidence: 1.0,
            trace_id,
        }
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}
