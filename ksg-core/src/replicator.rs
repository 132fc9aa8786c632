//! Async replication of working-memory snapshots to durable storage
//! (spec §3, §9; SPEC_FULL §2 "AsyncReplicator contract"). Working
//! memory itself never blocks on storage — a snapshot is handed off to
//! a replicator that flushes out-of-band.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

/// One working-memory snapshot to persist.
pub type Snapshot = HashMap<Uuid, f32>;

/// Receives working-memory snapshots off the hot path (spec §9: working
/// memory mutation must not block on storage I/O).
#[async_trait]
pub trait AsyncReplicator: Send + Sync {
    async fn replicate(&self, snapshot: Snapshot) -> Result<()>;

    /// Flushes any buffered snapshots before shutdown. Default is a
    /// no-op for replicators with nothing to buffer.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Default [`AsyncReplicator`]: a bounded mpsc channel feeding a
/// background task that calls a persistence closure per snapshot.
/// `replicate` never blocks the caller on the sink actually writing —
/// it only blocks if the channel itself is full, which is the
/// backpressure boundary between working memory and storage.
pub struct ChannelReplicator {
    sender: mpsc::Sender<Snapshot>,
    worker: Arc<tokio::task::JoinHandle<()>>,
}

impl ChannelReplicator {
    /// Spawns the background flush task. `capacity` bounds how many
    /// snapshots may be in flight before `replicate` applies
    /// backpressure; `sink` is called once per snapshot, in submission
    /// order, on the background task.
    pub fn spawn<F, Fut>(capacity: usize, sink: F) -> Self
    where
        F: Fn(Snapshot) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let (sender, mut receiver) = mpsc::channel::<Snapshot>(capacity);
        let sink = Arc::new(sink);
        let worker = tokio::spawn(async move {
            while let Some(snapshot) = receiver.recv().await {
                if let Err(err) = sink(snapshot).await {
                    tracing::warn!(error = %err, "working memory snapshot replication failed");
                }
            }
        });
        Self {
            sender,
            worker: Arc::new(worker),
        }
    }
}

#[async_trait]
impl AsyncReplicator for ChannelReplicator {
    async fn replicate(&self, snapshot: Snapshot) -> Result<()> {
        if self.sender.send(snapshot).await.is_err() {
            tracing::warn!("working memory replication channel closed; dropping snapshot");
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        // Best-effort drain: give the background worker a chance to
        // empty the channel before shutdown without closing it (closing
        // would stop the worker mid-session).
        while self.sender.capacity() < self.sender.max_capacity() && !self.worker.is_finished() {
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

/// No-op replicator for callers that haven't enabled `ASYNC_REPLICATION`
/// (spec §6.4).
pub struct NullReplicator;

#[async_trait]
impl AsyncReplicator for NullReplicator {
    async fn replicate(&self, _snapshot: Snapshot) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[tokio::test]
    async fn channel_replicator_delivers_snapshots_to_sink() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        let replicator = ChannelReplicator::spawn(4, move |snapshot| {
            let received = Arc::clone(&received_clone);
            async move {
                received.lock().await.push(snapshot);
                Ok(())
            }
        });

        let mut snapshot = Snapshot::new();
        snapshot.insert(Uuid::new_v4(), 1.0);
        replicator.replicate(snapshot).await.unwrap();

        for _ in 0..50 {
            if !received.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(received.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn null_replicator_always_succeeds() {
        let replicator = NullReplicator;
        assert!(replicator.replicate(Snapshot::new()).await.is_ok());
    }
}
