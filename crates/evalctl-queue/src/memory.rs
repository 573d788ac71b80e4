use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{Queue, QueueError, QueuedItem};

#[derive(Clone)]
struct Entry {
    resource_class: String,
    attempts: u32,
}

struct State {
    pending: HashMap<String, VecDeque<Uuid>>,
    entries: HashMap<Uuid, Entry>,
    claimed: HashMap<Uuid, ()>,
    dead: HashMap<Uuid, Entry>,
}

/// In-process Queue used for tests and the `QUEUE_URL=mem://` dev mode.
/// One FIFO deque per resource class, guarded by a single mutex — claim is
/// trivially exactly-once because the whole operation runs under the lock.
pub struct InMemoryQueue {
    state: Mutex<State>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        InMemoryQueue {
            state: Mutex::new(State {
                pending: HashMap::new(),
                entries: HashMap::new(),
                claimed: HashMap::new(),
                dead: HashMap::new(),
            }),
        }
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn enqueue(&self, eval_id: Uuid, resource_class: &str) -> Result<(), QueueError> {
        let mut st = self.state.lock().expect("queue mutex poisoned");
        st.entries.insert(
            eval_id,
            Entry {
                resource_class: resource_class.to_string(),
                attempts: 0,
            },
        );
        st.pending
            .entry(resource_class.to_string())
            .or_default()
            .push_back(eval_id);
        Ok(())
    }

    async fn claim(
        &self,
        resource_class: &str,
        batch_size: u32,
        _claimed_by: &str,
    ) -> Result<Vec<QueuedItem>, QueueError> {
        let mut st = self.state.lock().expect("queue mutex poisoned");
        let mut out = Vec::new();
        if let Some(queue) = st.pending.get_mut(resource_class) {
            for _ in 0..batch_size {
                let Some(id) = queue.pop_front() else {
                    break;
                };
                st.claimed.insert(id, ());
                let entry = st
                    .entries
                    .get(&id)
                    .cloned()
                    .unwrap_or(Entry {
                        resource_class: resource_class.to_string(),
                        attempts: 0,
                    });
                out.push(QueuedItem {
                    eval_id: id,
                    resource_class: entry.resource_class,
                    attempts: entry.attempts,
                });
            }
        }
        Ok(out)
    }

    async fn ack(&self, eval_id: Uuid) -> Result<(), QueueError> {
        let mut st = self.state.lock().expect("queue mutex poisoned");
        st.claimed.remove(&eval_id);
        st.entries.remove(&eval_id);
        Ok(())
    }

    async fn nack(
        &self,
        eval_id: Uuid,
        retry_max: u32,
        _retry_base_s: u64,
        _reason: &str,
    ) -> Result<bool, QueueError> {
        let mut st = self.state.lock().expect("queue mutex poisoned");
        st.claimed.remove(&eval_id);
        let Some(entry) = st.entries.get_mut(&eval_id) else {
            return Ok(false);
        };
        entry.attempts += 1;
        if entry.attempts > retry_max {
            let dead = entry.clone();
            st.entries.remove(&eval_id);
            st.dead.insert(eval_id, dead);
            Ok(false)
        } else {
            let rc = entry.resource_class.clone();
            st.pending.entry(rc).or_default().push_back(eval_id);
            Ok(true)
        }
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let st = self.state.lock().expect("queue mutex poisoned");
        Ok(st.pending.values().map(|q| q.len() as u64).sum())
    }
}
