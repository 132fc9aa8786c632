//! Working memory (C7, spec §4.7): a session-scoped directed weighted
//! activation graph keyed by concept UUID, reinforced Hebbian-style to
//! bias long-term retrieval ranking.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

/// Reinforcement step per `access` (spec §4.7 default).
pub const DEFAULT_DELTA: f32 = 1.0;
/// Saturation ceiling for any node's weight (spec §4.7 default).
pub const DEFAULT_MAX_WEIGHT: f32 = 100.0;
/// Multiplicative decay applied to every *other* node on each `access`
/// (spec §4.7 default).
pub const DEFAULT_GAMMA: f32 = 0.001;
/// Scales the activation nudge applied by `boost` (spec §4.7 default).
pub const DEFAULT_ALPHA: f32 = 0.1;
/// Floor weight `link` guarantees for a newly-linked node.
const MIN_LINK_WEIGHT: f32 = 0.0;

/// Tunable constants, overridable via `WORKING_MEMORY_REINFORCE_DELTA` /
/// `_MAX_WEIGHT` (spec §6.4) and friends.
#[derive(Debug, Clone, Copy)]
pub struct WorkingMemoryConfig {
    pub delta: f32,
    pub max_weight: f32,
    pub gamma: f32,
    pub alpha: f32,
}

impl Default for WorkingMemoryConfig {
    fn default() -> Self {
        Self {
            delta: DEFAULT_DELTA,
            max_weight: DEFAULT_MAX_WEIGHT,
            gamma: DEFAULT_GAMMA,
            alpha: DEFAULT_ALPHA,
        }
    }
}

/// Session-scoped activation graph (spec §4.7). One instance per session;
/// internally serialized since a session's own turns are sequential.
pub struct WorkingMemory {
    config: WorkingMemoryConfig,
    weights: RwLock<HashMap<Uuid, f32>>,
}

impl WorkingMemory {
    #[must_use]
    pub fn new(config: WorkingMemoryConfig) -> Self {
        Self {
            config,
            weights: RwLock::new(HashMap::new()),
        }
    }

    /// `link(uuid)` (spec §4.7): ensures a node exists with weight at
    /// least `MIN_LINK_WEIGHT`, without disturbing an already-reinforced
    /// weight.
    pub fn link(&self, id: Uuid) {
        self.weights.write().entry(id).or_insert(MIN_LINK_WEIGHT);
    }

    /// `access(uuid)` (spec §4.7): `w ← min(w + Δ, W_max)` for `id`; every
    /// other linked node decays by `(1 − γ)`.
    pub fn access(&self, id: Uuid) {
        let mut weights = self.weights.write();
        for (node_id, w) in weights.iter_mut() {
            if *node_id == id {
                continue;
            }
            *w *= 1.0 - self.config.gamma;
        }
        let entry = weights.entry(id).or_insert(0.0);
        *entry = (*entry + self.config.delta).min(self.config.max_weight);
    }

    /// `boost(score, uuid) -> score'` (spec §4.7): `score + α ·
    /// normalize(w)`, where `normalize` scales by `W_max` so the nudge
    /// stays in `[0, α]` and never dominates similarity ranking.
    #[must_use]
    pub fn boost(&self, score: f32, id: Uuid) -> f32 {
        let w = self.weights.read().get(&id).copied().unwrap_or(0.0);
        let normalized = w / self.config.max_weight;
        score + self.config.alpha * normalized
    }

    #[must_use]
    pub fn weight(&self, id: Uuid) -> f32 {
        self.weights.read().get(&id).copied().unwrap_or(0.0)
    }

    /// A snapshot of every linked node's weight, for mirroring to
    /// long-term storage via an `AsyncReplicator` (spec §3, §9).
    #[must_use]
    pub fn snapshot(&self) -> HashMap<Uuid, f32> {
        self.weights.read().clone()
    }
}

impl Default for WorkingMemory {
    fn default() -> Self {
        Self::new(WorkingMemoryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_is_monotonic_until_saturation() {
        let wm = WorkingMemory::new(WorkingMemoryConfig { max_weight: 3.0, ..Default::default() });
        let id = Uuid::new_v4();
        wm.access(id);
        let w1 = wm.weight(id);
        wm.access(id);
        let w2 = wm.weight(id);
        assert!(w2 >= w1);
        wm.access(id);
        wm.access(id);
        assert_eq!(wm.weight(id), 3.0);
    }

    #[test]
    fn access_decays_other_nodes() {
        let wm = WorkingMemory::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        wm.access(a);
        let before = wm.weight(a);
        wm.access(b);
        assert!(wm.weight(a) < before);
    }

    #[test]
    fn boost_nudges_score_without_dominating() {
        let wm = WorkingMemory::default();
        let id = Uuid::new_v4();
        for _ in 0..200 {
            wm.access(id);
        }
        let boosted = wm.boost(0.5, id);
        assert!(boosted > 0.5);
        assert!(boosted <= 0.5 + DEFAULT_ALPHA + 1e-6);
    }

    #[test]
    fn link_does_not_overwrite_existing_weight() {
        let wm = WorkingMemory::default();
        let id = Uuid::new_v4();
        wm.access(id);
        let before = wm.weight(id);
        wm.link(id);
        assert_eq!(wm.weight(id), before);
    }
}
