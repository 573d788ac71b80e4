use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::exec::{run_on_slot, RunRequest};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/run", post(run))
        .route("/running", get(running))
        .route("/eval/:id/logs", get(logs))
        .route("/eval/:id/kill", post(kill))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    runner_id: String,
    free_slots: usize,
    total_slots: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        runner_id: state.runner_id.clone(),
        free_slots: state.free_slots().await,
        total_slots: state.slots.len(),
    })
}

#[derive(Deserialize)]
struct RunBody {
    eval_id: Uuid,
    language_tag: String,
    source_text: String,
    timeout_s: u32,
    max_memory_bytes: Option<u64>,
    max_output_bytes: u64,
}

async fn run(State(state): State<Arc<AppState>>, Json(body): Json<RunBody>) -> impl IntoResponse {
    // Redelivery of a request the Runner already accepted: the Dispatcher
    // may retry a `/run` call it never got a response for. Binding to the
    // same slot is a no-op success rather than a second spawn.
    if state.slot_index_for(body.eval_id).await.is_some() {
        return StatusCode::OK.into_response();
    }

    let Some(slot_idx) = state.claim_idle_slot(body.eval_id).await else {
        return (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response();
    };

    let req = RunRequest {
        eval_id: body.eval_id,
        language_tag: body.language_tag,
        source_text: body.source_text,
        timeout_s: body.timeout_s,
        max_memory_bytes: body.max_memory_bytes,
        max_output_bytes: body.max_output_bytes,
    };

    tokio::spawn(run_on_slot(state, slot_idx, req));
    StatusCode::ACCEPTED.into_response()
}

#[derive(Serialize)]
struct RunningResponse {
    eval_id: Option<Uuid>,
}

/// At most one entry on this Runner build (one slot's worth of interest to
/// the Dispatcher's liveness probe); reports the first occupied slot, if any.
async fn running(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    for slot_lock in &state.slots {
        let slot = slot_lock.lock().await;
        if let Some(eval_id) = slot.eval_id {
            return Json(RunningResponse {
                eval_id: Some(eval_id),
            });
        }
    }
    Json(RunningResponse { eval_id: None })
}

#[derive(Serialize)]
struct LogsResponse {
    stdout_tail: String,
    stderr_tail: String,
    is_running: bool,
    exit_code: Option<i32>,
}

/// Returns the sandbox's captured output once the evaluation has produced
/// a final result. This Runner doesn't tail output mid-flight — the
/// Gateway's SSE stream (fed by the Bus) is the live-progress surface;
/// this endpoint exists for the Dispatcher/Reactor to pull the final
/// bytes right after a terminal event, before the slot is reused.
async fn logs(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> impl IntoResponse {
    let Some(idx) = state.slot_index_for(id).await else {
        return (StatusCode::NOT_FOUND, "no active slot for this evaluation").into_response();
    };
    let slot = state.slots[idx].lock().await;
    let Some(output) = &slot.final_output else {
        return Json(LogsResponse {
            stdout_tail: String::new(),
            stderr_tail: String::new(),
            is_running: true,
            exit_code: None,
        })
        .into_response();
    };
    Json(LogsResponse {
        stdout_tail: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr_tail: String::from_utf8_lossy(&output.stderr).into_owned(),
        is_running: false,
        exit_code: slot.exit_code,
    })
    .into_response()
}

async fn kill(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> impl IntoResponse {
    let Some(idx) = state.slot_index_for(id).await else {
        return (StatusCode::NOT_FOUND, "no active slot for this evaluation").into_response();
    };
    let kill_switch = {
        let slot = state.slots[idx].lock().await;
        slot.kill_switch.clone()
    };
    if let Some(switch) = kill_switch {
        let _ = switch.kill().await;
    }
    StatusCode::ACCEPTED.into_response()
}
