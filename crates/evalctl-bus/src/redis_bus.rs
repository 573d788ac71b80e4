use async_trait::async_trait;
use evalctl_schemas::Topic;
use futures_util::StreamExt;
use redis::AsyncCommands;

use crate::{Bus, BusError, Envelope, EnvelopeStream};

/// Cross-process Bus backing over Redis `PUBLISH`/`SUBSCRIBE`, one channel
/// per topic. Chosen over the teacher's stack (which has no pub/sub
/// backend at all) because Redis pub/sub is the smallest viable primitive
/// for "fan out a best-effort, non-durable event to every live
/// subscriber" — exactly the Bus's contract; durability belongs to the
/// Store, not here.
pub struct RedisBus {
    client: redis::Client,
}

impl RedisBus {
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client =
            redis::Client::open(url).map_err(|e| BusError::Publish(e.to_string()))?;
        // fail fast if the server is unreachable rather than on first use.
        let _ = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;
        Ok(RedisBus { client })
    }
}

#[async_trait]
impl Bus for RedisBus {
    async fn publish(&self, envelope: Envelope) -> Result<(), BusError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;
        let payload =
            serde_json::to_string(&envelope).map_err(|e| BusError::Publish(e.to_string()))?;
        conn.publish::<_, _, ()>(envelope.topic.as_str(), payload)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self, topic: Topic) -> Result<EnvelopeStream, BusError> {
        let conn = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;
        let mut pubsub = conn;
        pubsub
            .subscribe(topic.as_str())
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let raw: String = msg.get_payload().ok()?;
            serde_json::from_str(&raw).ok()
        });
        Ok(Box::pin(stream))
    }
}
