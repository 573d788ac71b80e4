use std::sync::Arc;
use std::time::Duration;

use evalctl_bus::Bus;
use evalctl_sandbox::{CapturedOutput, KillSwitch, Sandbox};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::slot::SlotStatus;

pub struct Slot {
    pub status: SlotStatus,
    pub eval_id: Option<Uuid>,
    /// Cheap to hold behind the same lock as `status`: killing only ever
    /// sends a signal through this, it never blocks on the evaluation's
    /// result the way holding the `SandboxHandle` itself would.
    pub kill_switch: Option<Arc<dyn KillSwitch>>,
    /// Set once the sandbox has produced a final result. Absent while the
    /// evaluation is still running — this Runner doesn't support tailing
    /// output mid-flight, only fetching it once captured.
    pub final_output: Option<CapturedOutput>,
    /// Set alongside `final_output`; `None` for outcomes that never produced
    /// a process exit code (timeout, signal, OOM kill).
    pub exit_code: Option<i32>,
}

impl Slot {
    fn new() -> Self {
        Slot {
            status: SlotStatus::Idle,
            eval_id: None,
            kill_switch: None,
            final_output: None,
            exit_code: None,
        }
    }
}

pub struct AppState {
    pub runner_id: String,
    pub sandbox: Arc<dyn Sandbox>,
    pub bus: Arc<dyn Bus>,
    pub heartbeat_interval: Duration,
    pub slots: Vec<Mutex<Slot>>,
}

impl AppState {
    pub fn new(
        runner_id: String,
        sandbox: Arc<dyn Sandbox>,
        bus: Arc<dyn Bus>,
        heartbeat_interval: Duration,
        slot_count: usize,
    ) -> Self {
        AppState {
            runner_id,
            sandbox,
            bus,
            heartbeat_interval,
            slots: (0..slot_count).map(|_| Mutex::new(Slot::new())).collect(),
        }
    }

    /// Finds the first idle slot and marks it `Spawning`, returning its
    /// index. `None` means the Runner is at capacity.
    pub async fn claim_idle_slot(&self, eval_id: Uuid) -> Option<usize> {
        for (idx, slot_lock) in self.slots.iter().enumerate() {
            let mut slot = slot_lock.lock().await;
            if slot.status == SlotStatus::Idle {
                if let Ok(next) = slot.status.apply(crate::slot::SlotEvent::Claim) {
                    slot.status = next;
                    slot.eval_id = Some(eval_id);
                    return Some(idx);
                }
            }
        }
        None
    }

    pub async fn free_slots(&self) -> usize {
        let mut n = 0;
        for slot_lock in &self.slots {
            if slot_lock.lock().await.status == SlotStatus::Idle {
                n += 1;
            }
        }
        n
    }

    pub async fn slot_index_for(&self, eval_id: Uuid) -> Option<usize> {
        for (idx, slot_lock) in self.slots.iter().enumerate() {
            let slot = slot_lock.lock().await;
            if slot.eval_id == Some(eval_id) {
                return Some(idx);
            }
        }
        None
    }
}
