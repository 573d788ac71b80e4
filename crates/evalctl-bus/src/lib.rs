//! The Event Bus: best-effort, at-least-once, no durable replay. Every
//! subscriber only ever sees events published after it subscribed — the
//! Store (not the Bus) is the system of record for anything a late
//! subscriber needs to catch up on.

mod memory;
mod redis_bus;

pub use memory::InMemoryBus;
pub use redis_bus::RedisBus;

use async_trait::async_trait;
use evalctl_schemas::{EventEnvelope, Topic};
use serde_json::Value;
use thiserror::Error;
use tokio_stream::wrappers::BroadcastStream;

pub type Envelope = EventEnvelope<Value>;
pub type EnvelopeStream =
    std::pin::Pin<Box<dyn futures_util::Stream<Item = Envelope> + Send>>;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus publish failed: {0}")]
    Publish(String),
    #[error("bus subscribe failed: {0}")]
    Subscribe(String),
}

/// Narrow publish/subscribe seam every service depends on instead of a
/// concrete broadcast channel or Redis client, so tests can swap in
/// [`InMemoryBus`] and production can swap in [`RedisBus`] without any
/// caller code changing.
#[async_trait]
pub trait Bus: Send + Sync {
    async fn publish(&self, envelope: Envelope) -> Result<(), BusError>;

    /// Subscribes to a single topic. The returned stream only yields
    /// events published after this call returns.
    async fn subscribe(&self, topic: Topic) -> Result<EnvelopeStream, BusError>;
}

/// Builds the [`Bus`] implementation named by `bus_url`: `mem://` selects
/// [`InMemoryBus`], anything else is treated as a `redis://` URL.
pub async fn connect(bus_url: &str) -> Result<Box<dyn Bus>, BusError> {
    if bus_url.starts_with("mem://") {
        Ok(Box::new(InMemoryBus::new()))
    } else {
        Ok(Box::new(RedisBus::connect(bus_url).await?))
    }
}

pub(crate) fn broadcast_stream_to_envelope_stream(
    rx: tokio::sync::broadcast::Receiver<Envelope>,
) -> EnvelopeStream {
    use futures_util::StreamExt;
    Box::pin(BroadcastStream::new(rx).filter_map(|r| async move { r.ok() }))
}
