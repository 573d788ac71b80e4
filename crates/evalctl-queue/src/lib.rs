//! The Queue: holds evaluations between `eval.queued` and the Dispatcher
//! claiming one for a live Runner. Claim semantics are exactly-once per
//! claim (never exactly-once overall — the Dispatcher must still handle a
//! Runner it hands work to never acknowledging).

mod memory;
mod pg;

pub use memory::InMemoryQueue;
pub use pg::PgQueue;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone)]
pub struct QueuedItem {
    pub eval_id: Uuid,
    pub resource_class: String,
    pub attempts: u32,
}

/// Narrow claim-queue seam. `claim` must be exactly-once under concurrent
/// callers — the Postgres backing enforces this with `FOR UPDATE SKIP
/// LOCKED`; the in-memory backing enforces it with a single mutex.
#[async_trait]
pub trait Queue: Send + Sync {
    async fn enqueue(&self, eval_id: Uuid, resource_class: &str) -> Result<(), QueueError>;

    /// Claims up to `batch_size` pending items for `resource_class`,
    /// transitioning them out of the claimable set so no other caller can
    /// claim the same item concurrently.
    async fn claim(
        &self,
        resource_class: &str,
        batch_size: u32,
        claimed_by: &str,
    ) -> Result<Vec<QueuedItem>, QueueError>;

    /// Acknowledges successful dispatch; the item is removed from the queue.
    async fn ack(&self, eval_id: Uuid) -> Result<(), QueueError>;

    /// Reverts a claimed item back to pending for retry, or moves it to the
    /// dead-letter set if it has exhausted `retry_max` attempts. Returns
    /// `true` if the item will be retried, `false` if it was dead-lettered.
    /// `retry_base_s` is the base of the `retry_base_s * 2^attempts`
    /// backoff applied before the item becomes claimable again.
    async fn nack(
        &self,
        eval_id: Uuid,
        retry_max: u32,
        retry_base_s: u64,
        reason: &str,
    ) -> Result<bool, QueueError>;

    /// Count of pending (unclaimed) items across all resource classes, used
    /// by the Gateway's high-water-mark backpressure check.
    async fn depth(&self) -> Result<u64, QueueError>;
}

pub async fn connect(queue_url: &str) -> Result<Box<dyn Queue>, QueueError> {
    if queue_url.starts_with("mem://") {
        Ok(Box::new(InMemoryQueue::new()))
    } else {
        Ok(Box::new(PgQueue::connect(queue_url).await?))
    }
}
