//! The Routing Index: a short-TTL key/value store recording which Runner
//! currently owns an evaluation's slot, plus a membership set of
//! currently-claimed evaluation ids. Entries expire on their own — the
//! Reactor's reconciler treats a missing entry for a `running` evaluation
//! as evidence its Runner vanished.

mod memory;
mod redis_index;

pub use memory::InMemoryIndex;
pub use redis_index::RedisIndex;

use async_trait::async_trait;
use evalctl_schemas::RoutingIndexEntry;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Index: Send + Sync {
    /// Sets (or refreshes) the routing entry for `eval_id` with `ttl`.
    async fn set(
        &self,
        eval_id: Uuid,
        entry: RoutingIndexEntry,
        ttl: Duration,
    ) -> Result<(), IndexError>;

    /// Returns `None` if the entry is absent or has expired.
    async fn get(&self, eval_id: Uuid) -> Result<Option<RoutingIndexEntry>, IndexError>;

    async fn del(&self, eval_id: Uuid) -> Result<(), IndexError>;

    /// All evaluation ids with a currently-live entry.
    async fn members(&self) -> Result<Vec<Uuid>, IndexError>;
}

pub async fn connect(index_url: &str) -> Result<Box<dyn Index>, IndexError> {
    if index_url.starts_with("mem://") {
        Ok(Box::new(InMemoryIndex::new()))
    } else {
        Ok(Box::new(RedisIndex::connect(index_url).await?))
    }
}
