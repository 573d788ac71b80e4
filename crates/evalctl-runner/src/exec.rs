use std::sync::Arc;
use std::time::Duration;

use evalctl_bus::Envelope;
use evalctl_schemas::{EvalEvent, EventEnvelope, Topic};
use evalctl_sandbox::ResourceCaps;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::slot::SlotEvent;
use crate::state::AppState;

pub struct RunRequest {
    pub eval_id: Uuid,
    pub language_tag: String,
    pub source_text: String,
    pub timeout_s: u32,
    pub max_memory_bytes: Option<u64>,
    pub max_output_bytes: u64,
}

/// Drives one evaluation from spawn to terminal event on the slot claimed
/// for it. Runs as a detached task so the HTTP handler that accepted the
/// request can return immediately — the caller learns the outcome only
/// through the Bus, never through this call's return value.
pub async fn run_on_slot(state: Arc<AppState>, slot_idx: usize, req: RunRequest) {
    let started_event = EventEnvelope::new(
        req.eval_id,
        Topic::EvalStarted,
        None,
        json!({"runner_id": state.runner_id, "slot": slot_idx}),
    );
    let start_event_id = started_event.event_id;

    let (mut handle, kill_switch) = match state
        .sandbox
        .spawn(
            &req.language_tag,
            &req.source_text,
            ResourceCaps {
                max_memory_bytes: req.max_memory_bytes,
                max_output_bytes: req.max_output_bytes,
            },
        )
        .await
    {
        Ok(pair) => pair,
        Err(e) => {
            warn!(eval_id = %req.eval_id, error = %e, "sandbox spawn failed");
            publish_terminal(
                &state,
                req.eval_id,
                Some(start_event_id),
                EvalEvent::Failed {
                    reason: format!("sandbox spawn failed: {e}"),
                    exit_code: None,
                },
                "",
            )
            .await;
            reset_slot(&state, slot_idx).await;
            return;
        }
    };

    {
        let mut slot = state.slots[slot_idx].lock().await;
        slot.status = slot
            .status
            .apply(SlotEvent::Spawned)
            .unwrap_or(slot.status);
        slot.kill_switch = Some(kill_switch);
    }

    let _ = state.bus.publish(started_event).await;
    info!(eval_id = %req.eval_id, slot = slot_idx, "evaluation started");

    let heartbeat_state = state.clone();
    let heartbeat_eval_id = req.eval_id;
    let heartbeat_interval = state.heartbeat_interval;
    let heartbeat_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat_interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            let env: Envelope = EventEnvelope::new(
                heartbeat_eval_id,
                Topic::EvalHeartbeat,
                None,
                json!({"runner_id": heartbeat_state.runner_id, "slot": slot_idx}),
            );
            if heartbeat_state.bus.publish(env).await.is_err() {
                break;
            }
        }
    });

    // `handle` is owned exclusively by this task — kill requests reach the
    // sandbox through `kill_switch` instead, so they're never blocked
    // behind this wait.
    let exit = handle.wait(Duration::from_secs(req.timeout_s as u64)).await;

    heartbeat_task.abort();

    let event = exit.exit_class.into_event();
    let exit_code = event.exit_code();
    {
        let mut slot = state.slots[slot_idx].lock().await;
        slot.final_output = Some(exit.output.clone());
        slot.exit_code = exit_code;
    }

    publish_terminal(&state, req.eval_id, Some(start_event_id), event, &exit.output).await;
    reset_slot(&state, slot_idx).await;
}

/// Carries `output` inline on the terminal event itself rather than leaving
/// the Reactor to fetch it back over HTTP: `reset_slot` runs immediately
/// after this publish and clears the slot's captured output, so a
/// fetch-after-the-fact would race it.
async fn publish_terminal(
    state: &Arc<AppState>,
    eval_id: Uuid,
    causation_id: Option<Uuid>,
    event: EvalEvent,
    output: &str,
) {
    let topic = match &event {
        EvalEvent::Completed { .. } => Topic::EvalCompleted,
        EvalEvent::Failed { .. } => Topic::EvalFailed,
        EvalEvent::Cancelled { .. } => Topic::EvalCancelled,
        EvalEvent::Dispatched | EvalEvent::Started => return,
    };
    let payload = match &event {
        EvalEvent::Completed { exit_code } => json!({"exit_code": exit_code, "output": output}),
        EvalEvent::Failed { reason, exit_code } => {
            json!({"reason": reason, "exit_code": exit_code, "output": output})
        }
        EvalEvent::Cancelled { exit_code } => json!({"exit_code": exit_code, "output": output}),
        _ => json!({}),
    };
    let envelope = EventEnvelope::new(eval_id, topic, causation_id, payload);
    let _ = state.bus.publish(envelope).await;
}

async fn reset_slot(state: &Arc<AppState>, slot_idx: usize) {
    let mut slot = state.slots[slot_idx].lock().await;
    slot.status = slot
        .status
        .apply(SlotEvent::Finished)
        .unwrap_or(slot.status);
    slot.status = slot.status.apply(SlotEvent::Reset).unwrap_or(slot.status);
    slot.eval_id = None;
    slot.kill_switch = None;
    slot.final_output = None;
    slot.exit_code = None;
}
