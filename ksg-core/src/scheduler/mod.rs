//! Scheduler (C6, spec §4.6): holds a set of `TimeRule`s; a single-
//! threaded cooperative tick evaluates rules against wall-clock and
//! produces enqueue commands handed to C5. The scheduler never executes
//! tool commands itself.

mod timerule;

pub use timerule::{TimeRule, TimeRuleKind};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::queue::{EnqueueRequest, TaskQueue};
use tracing::{debug, instrument};

/// Holds registered [`TimeRule`]s and their last-fire bookkeeping, and
/// drives ticks against a [`TaskQueue`].
pub struct Scheduler {
    queue: Arc<TaskQueue>,
    rules: RwLock<HashMap<Uuid, TimeRule>>,
    last_fire: RwLock<HashMap<Uuid, DateTime<Utc>>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self {
            queue,
            rules: RwLock::new(HashMap::new()),
            last_fire: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_rule(&self, rule: TimeRule) -> Uuid {
        let id = rule.id;
        self.rules.write().insert(id, rule);
        id
    }

    pub fn remove_rule(&self, id: Uuid) {
        self.rules.write().remove(&id);
        self.last_fire.write().remove(&id);
    }

    /// Evaluates every rule against `now`, enqueueing one `QueueItem` per
    /// fire instant (spec §4.6). Returns the ids of every item enqueued
    /// this tick, in rule-then-chronological order.
    #[instrument(skip(self))]
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let due: Vec<(TimeRule, Option<DateTime<Utc>>, Vec<DateTime<Utc>>)> = {
            let rules = self.rules.read();
            let last_fire = self.last_fire.read();
            rules
                .values()
                .map(|rule| {
                    let last = last_fire.get(&rule.id).copied();
                    let fires = rule.fire_times(last, now);
                    (rule.clone(), last, fires)
                })
                .collect()
        };

        let mut enqueued = Vec::new();
        for (rule, _last, fires) in due {
            if fires.is_empty() {
                continue;
            }
            for _fire_at in &fires {
                let item_id = self
                    .queue
                    .enqueue(EnqueueRequest {
                        priority: 0,
                        not_before: None,
                        task_ref: None,
                        runs_procedure: None,
                        payload: Some(rule.payload.clone()),
                    })
                    .await?;
                enqueued.push(item_id);
            }
            if let Some(last) = fires.last() {
                self.last_fire.write().insert(rule.id, *last);
            }
        }
        debug!(enqueued = enqueued.len(), "scheduler tick complete");
        Ok(enqueued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::ksg::Ksg;
    use crate::seed::seed_prototypes;
    use crate::store::InMemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn interval_rule_enqueues_exactly_two_items_after_125_seconds() {
        let ksg = Arc::new(Ksg::new(Arc::new(InMemoryStore::new()), Arc::new(MockLlmClient::default()), 4));
        seed_prototypes(&ksg).await.unwrap();
        let queue = Arc::new(TaskQueue::new(ksg, "scheduler").await.unwrap());
        let scheduler = Scheduler::new(Arc::clone(&queue));

        let anchor = Utc::now();
        scheduler.add_rule(TimeRule::interval(60, json!({"task": "remind_to_drink_water"}), anchor));

        let enqueued = scheduler.tick(anchor + chrono::Duration::seconds(125)).await.unwrap();
        assert_eq!(enqueued.len(), 2);

        let items = queue.list_items().await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.get_str("state") == Some("queued")));
    }

    #[tokio::test]
    async fn second_tick_does_not_refire_already_fired_instants() {
        let ksg = Arc::new(Ksg::new(Arc::new(InMemoryStore::new()), Arc::new(MockLlmClient::default()), 4));
        seed_prototypes(&ksg).await.unwrap();
        let queue = Arc::new(TaskQueue::new(ksg, "scheduler").await.unwrap());
        let scheduler = Scheduler::new(Arc::clone(&queue));

        let anchor = Utc::now();
        scheduler.add_rule(TimeRule::interval(60, json!({}), anchor));
        scheduler.tick(anchor + chrono::Duration::seconds(65)).await.unwrap();
        let second = scheduler.tick(anchor + chrono::Duration::seconds(66)).await.unwrap();
        assert!(second.is_empty());
    }
}
