use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use evalctl_schemas::RoutingIndexEntry;
use uuid::Uuid;

use crate::{Index, IndexError};

struct Slot {
    entry: RoutingIndexEntry,
    expires_at: Instant,
}

/// In-process Index used for tests and the `INDEX_URL=mem://` dev mode.
/// Expiry is checked lazily on read rather than by a background sweep task,
/// which is sufficient for a single-process deployment.
pub struct InMemoryIndex {
    slots: Mutex<HashMap<Uuid, Slot>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        InMemoryIndex {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Index for InMemoryIndex {
    async fn set(
        &self,
        eval_id: Uuid,
        entry: RoutingIndexEntry,
        ttl: Duration,
    ) -> Result<(), IndexError> {
        self.slots.lock().expect("index mutex poisoned").insert(
            eval_id,
            Slot {
                entry,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, eval_id: Uuid) -> Result<Option<RoutingIndexEntry>, IndexError> {
        let mut slots = self.slots.lock().expect("index mutex poisoned");
        match slots.get(&eval_id) {
            Some(slot) if slot.expires_at > Instant::now() => Ok(Some(slot.entry.clone())),
            Some(_) => {
                slots.remove(&eval_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn del(&self, eval_id: Uuid) -> Result<(), IndexError> {
        self.slots.lock().expect("index mutex poisoned").remove(&eval_id);
        Ok(())
    }

    async fn members(&self) -> Result<Vec<Uuid>, IndexError> {
        let now = Instant::now();
        Ok(self
            .slots
            .lock()
            .expect("index mutex poisoned")
            .iter()
            .filter(|(_, slot)| slot.expires_at > now)
            .map(|(id, _)| *id)
            .collect())
    }
}
