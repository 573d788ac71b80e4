use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use evalctl_schemas::Topic;
use tokio::sync::broadcast;

use crate::{broadcast_stream_to_envelope_stream, Bus, BusError, Envelope, EnvelopeStream};

const CHANNEL_CAPACITY: usize = 1024;

/// One `tokio::sync::broadcast` channel per topic, created lazily on first
/// use. Suitable for a single process (tests, the `BUS_URL=mem://` dev
/// mode) — not for cross-process fan-out, which is what [`crate::RedisBus`]
/// is for.
pub struct InMemoryBus {
    channels: Mutex<HashMap<Topic, broadcast::Sender<Envelope>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        InMemoryBus {
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn sender_for(&self, topic: Topic) -> broadcast::Sender<Envelope> {
        let mut channels = self.channels.lock().expect("bus mutex poisoned");
        channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for InMemoryBus {
    async fn publish(&self, envelope: Envelope) -> Result<(), BusError> {
        let sender = self.sender_for(envelope.topic);
        // No subscribers is not an error: at-least-once delivery only
        // applies to subscribers that exist when the event is published.
        let _ = sender.send(envelope);
        Ok(())
    }

    async fn subscribe(&self, topic: Topic) -> Result<EnvelopeStream, BusError> {
        let rx = self.sender_for(topic).subscribe();
        Ok(broadcast_stream_to_envelope_stream(rx))
    }
}
