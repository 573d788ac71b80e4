use std::sync::Arc;

use evalctl_bus::{Bus, InMemoryBus};
use evalctl_index::{Index, InMemoryIndex};
use evalctl_queue::{InMemoryQueue, Queue};
use evalctl_store::{InMemoryStore, Store};

/// Fully in-memory wiring of the four narrow interfaces, used by every
/// multi-component scenario test so none of them need a real Postgres or
/// Redis instance.
pub struct Harness {
    pub store: Arc<dyn Store>,
    pub queue: Arc<dyn Queue>,
    pub index: Arc<dyn Index>,
    pub bus: Arc<dyn Bus>,
}

impl Harness {
    pub fn new() -> Self {
        Harness {
            store: Arc::new(InMemoryStore::new()),
            queue: Arc::new(InMemoryQueue::new()),
            index: Arc::new(InMemoryIndex::new()),
            bus: Arc::new(InMemoryBus::new()),
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
