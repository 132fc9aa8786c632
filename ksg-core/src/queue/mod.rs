//! Task queue (C5, spec §4.5): priority-ordered, delay-aware enqueue of
//! tool commands feeding execution.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ksg::Ksg;
use crate::store::{Entity, SearchFilter};
use crate::types::{rel, Edge, Node, NodeKind, Provenance};
use tracing::{debug, instrument};

/// Not in `types::rel` because it is specific to queue items (spec §3
/// lists it alongside the canonical relations but it is only ever used
/// here).
pub const RUNS_PROCEDURE: &str = "runsProcedure";

/// Monotonic lifecycle states (spec §3, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Queued,
    Running,
    Done,
    Failed,
}

impl QueueState {
    fn rank(self) -> u8 {
        match self {
            QueueState::Queued => 0,
            QueueState::Running => 1,
            QueueState::Done | QueueState::Failed => 2,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QueueState::Queued => "queued",
            QueueState::Running => "running",
            QueueState::Done => "done",
            QueueState::Failed => "failed",
        }
    }
}

/// Request to enqueue one `QueueItem` (spec §4.5). `not_before` defaults
/// to now; `priority` defaults to 0 (higher = sooner).
#[derive(Debug, Clone, Default)]
pub struct EnqueueRequest {
    pub priority: i64,
    pub not_before: Option<DateTime<Utc>>,
    pub task_ref: Option<Uuid>,
    pub runs_procedure: Option<Uuid>,
    pub payload: Option<Value>,
}

/// Priority-ordered task queue backed by a `Queue` container concept and
/// `QueueItem` concepts linked by `contains` edges (spec §3: "items are
/// referenced by edges, not embedded in props").
pub struct TaskQueue {
    ksg: Arc<Ksg>,
    queue_id: Uuid,
    /// Serializes enqueue/dequeue/update so concurrent callers observe a
    /// total order consistent with spec §4.5's ordering (spec §5: "Queue:
    /// totally ordered operations").
    lock: Mutex<()>,
}

impl TaskQueue {
    /// Finds or creates the named `Queue` container concept.
    pub async fn new(ksg: Arc<Ksg>, name: &str) -> Result<Self> {
        let queue_proto = ksg
            .find_prototype_by_name("Queue")
            .await?
            .ok_or_else(|| Error::InvariantViolation("Queue prototype not seeded".into()))?;
        let existing = ksg
            .store()
            .search(
                &SearchFilter::by_kind(NodeKind::Queue.as_str()).with_prop("name", Value::String(name.to_string())),
                None,
                1,
                0.0,
            )
            .await?;
        let queue_id = if let Some(hit) = existing.into_iter().next() {
            hit.node.id
        } else {
            let mut props = Map::new();
            props.insert("name".into(), json!(name));
            ksg.create_concept(queue_proto.id, props, Some(vec![0.0; ksg.embedding_dim]), None).await?
        };
        Ok(Self { ksg, queue_id, lock: Mutex::new(()) })
    }

    /// `enqueue(item)` (spec §4.5).
    #[instrument(skip(self, req))]
    pub async fn enqueue(&self, req: EnqueueRequest) -> Result<Uuid> {
        let _guard = self.lock.lock().await;
        let queue_item_proto = self
            .ksg
            .find_prototype_by_name("QueueItem")
            .await?
            .ok_or_else(|| Error::InvariantViolation("QueueItem prototype not seeded".into()))?;

        let now = Utc::now();
        let not_before = req.not_before.unwrap_or(now);
        let mut props = Map::new();
        props.insert("state".into(), json!(QueueState::Queued));
        props.insert("priority".into(), json!(req.priority));
        props.insert("notBefore".into(), json!(not_before.to_rfc3339()));
        props.insert("enqueuedAt".into(), json!(now.to_rfc3339()));
        if let Some(payload) = req.payload {
            props.insert("payload".into(), payload);
        }

        let item_id = self
            .ksg
            .create_concept(queue_item_proto.id, props, Some(vec![0.0; self.ksg.embedding_dim]), None)
            .await?;

        let contains = Edge::new(self.queue_id, item_id, rel::CONTAINS, Provenance::new("queue.enqueue", Uuid::new_v4()));
        self.ksg.store().upsert(Entity::Edge(contains)).await?;
        debug!(%item_id, priority = req.priority, "enqueued item");

        if let Some(task_ref) = req.task_ref {
            let reference = Edge::new(item_id, task_ref, rel::REFERENCES, Provenance::new("queue.enqueue", Uuid::new_v4()));
            self.ksg.store().upsert(Entity::Edge(reference)).await?;
        }
        if let Some(procedure_id) = req.runs_procedure {
            let runs = Edge::new(item_id, procedure_id, RUNS_PROCEDURE, Provenance::new("queue.enqueue", Uuid::new_v4()));
            self.ksg.store().upsert(Entity::Edge(runs)).await?;
        }

        Ok(item_id)
    }

    /// `listItems(filter?)` (spec §4.5): queued items whose `notBefore`
    /// has arrived, ordered by priority desc, `notBefore` asc, `enqueuedAt`
    /// asc, uuid asc.
    pub async fn list_items(&self) -> Result<Vec<Node>> {
        let contains = self.ksg.store().edges_from(self.queue_id, Some(rel::CONTAINS)).await?;
        let now = Utc::now();
        let mut items = Vec::new();
        for edge in contains {
            let Some(node) = self.ksg.store().get_node(edge.to).await? else {
                continue;
            };
            if node.get_str("state") != Some(QueueState::Queued.as_str()) {
                continue;
            }
            let not_before = parse_time(node.get_str("notBefore"));
            if not_before > now {
                continue;
            }
            items.push(node);
        }
        items.sort_by(|a, b| {
            let pa = a.get_f64("priority").unwrap_or(0.0);
            let pb = b.get_f64("priority").unwrap_or(0.0);
            pb.partial_cmp(&pa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| parse_time(a.get_str("notBefore")).cmp(&parse_time(b.get_str("notBefore"))))
                .then_with(|| parse_time(a.get_str("enqueuedAt")).cmp(&parse_time(b.get_str("enqueuedAt"))))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(items)
    }

    /// `dequeue()` (spec §4.5): atomically returns the head and
    /// transitions it `queued -> running`.
    pub async fn dequeue(&self) -> Result<Option<Node>> {
        let _guard = self.lock.lock().await;
        let items = self.list_items_unlocked().await?;
        let Some(head) = items.into_iter().next() else {
            return Ok(None);
        };
        self.transition_unlocked(head.id, QueueState::Running).await?;
        let node = self.ksg.store().get_node(head.id).await?.ok_or(Error::NotFound(head.id))?;
        Ok(Some(node))
    }

    /// `updateStatus(uuid, state)` (spec §4.5): enforces the monotonic
    /// lifecycle `queued -> running -> {done|failed}`.
    pub async fn update_status(&self, item_id: Uuid, state: QueueState) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.transition_unlocked(item_id, state).await
    }

    async fn transition_unlocked(&self, item_id: Uuid, state: QueueState) -> Result<()> {
        let node = self.ksg.store().get_node(item_id).await?.ok_or(Error::NotFound(item_id))?;
        let current: QueueState = node
            .props
            .get("state")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or(QueueState::Queued);
        if state.rank() < current.rank() {
            return Err(Error::InvalidTransition(format!(
                "cannot move queue item {item_id} from {} back to {}",
                current.as_str(),
                state.as_str()
            )));
        }
        let mut patch = Map::new();
        patch.insert("state".into(), json!(state));
        self.ksg.update_properties(item_id, patch).await
    }

    async fn list_items_unlocked(&self) -> Result<Vec<Node>> {
        self.list_items().await
    }
}

fn parse_time(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}
