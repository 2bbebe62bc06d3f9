use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone)]
pub struct EnqueuedJob {
    pub id: String,
    pub payload: Value,
    pub delay: Option<Duration>,
}

/// Bucket counts for `getQueueStatistics` (spec §4.A).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
    pub paused: u64,
}

/// The distributed-stream backend's wire contract. Real deployments speak
/// to a Redis-streams-like service; that network client is an external
/// collaborator this core only consumes through this trait (spec §1 "the
/// core consumes these as typed interfaces"), so no concrete network
/// implementation ships here — only the in-memory stand-in used for tests
/// and the inline-mode default.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    async fn enqueue(&self, queue: &str, job: EnqueuedJob) -> Result<(), TransportError>;
    async fn stats(&self, queue: &str) -> Result<QueueCounts, TransportError>;
    async fn verify_connectivity(&self, timeout: Duration) -> Result<(), TransportError>;
    async fn close(&self) -> Result<(), TransportError>;
}

/// In-process transport: an immediately-drained queue, used by inline mode
/// and by tests of queue mode that don't want a real network dependency.
/// Mirrors `durable::persistence::InMemoryWorkflowEventStore`'s role as the
/// store stand-in.
#[derive(Default)]
pub struct InMemoryTransport {
    counts: parking_lot::RwLock<std::collections::HashMap<String, QueueCounts>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueTransport for InMemoryTransport {
    async fn enqueue(&self, queue: &str, job: EnqueuedJob) -> Result<(), TransportError> {
        let mut counts = self.counts.write();
        let entry = counts.entry(queue.to_string()).or_default();
        if job.delay.is_some() {
            entry.delayed += 1;
        } else {
            entry.waiting += 1;
        }
        Ok(())
    }

    async fn stats(&self, queue: &str) -> Result<QueueCounts, TransportError> {
        Ok(self.counts.read().get(queue).cloned().unwrap_or_default())
    }

    async fn verify_connectivity(&self, _timeout: Duration) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
