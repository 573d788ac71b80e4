//! Axum router and HTTP handlers for evalctl-gateway — the external
//! surface of the control plane. Built the same way as the grounding
//! daemon's `routes::build_router`: a free function taking `Arc<AppState>`
//! so scenario tests can compose the bare router without the process-level
//! middleware `main.rs` attaches.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use evalctl_bus::Envelope;
use evalctl_schemas::{EventEnvelope, NewEvaluation, Status, Topic, SUPPORTED_LANGUAGE_TAGS};
use evalctl_store::StoreError;
use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api_types::{
    EvaluationResponse, KillResponse, ListQuery, ListResponse, LogsResponse, SubmitRequest,
    SubmitResponse,
};
use crate::errors::{GatewayError, SubmitError};
use crate::state::{AppState, RUNNER_CALL_DEADLINE};

/// Every topic carrying an `eval_id` worth relaying on the per-evaluation
/// SSE stream. `store.*` confirmation topics are reactor-internal and
/// deliberately excluded.
const STREAM_TOPICS: [Topic; 7] = [
    Topic::EvalQueued,
    Topic::EvalDispatched,
    Topic::EvalStarted,
    Topic::EvalHeartbeat,
    Topic::EvalCompleted,
    Topic::EvalFailed,
    Topic::EvalCancelled,
];

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/eval", post(submit).get(list))
        .route("/eval/:id", get(status))
        .route("/eval/:id/logs", get(logs))
        .route("/eval/:id/kill", post(kill))
        .route("/eval/:id/stream", get(stream))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// POST /eval
// ---------------------------------------------------------------------------

async fn submit(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitRequest>,
) -> Response {
    match submit_inner(&state, body).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn submit_inner(
    state: &Arc<AppState>,
    body: SubmitRequest,
) -> Result<SubmitResponse, SubmitError> {
    let source_bytes = body.source_text.as_bytes().len() as u64;
    if source_bytes > state.max_source_bytes {
        return Err(SubmitError::SourceTooLarge(state.max_source_bytes));
    }
    if !SUPPORTED_LANGUAGE_TAGS.contains(&body.language_tag.as_str()) {
        return Err(SubmitError::UnsupportedLanguage(body.language_tag));
    }
    if body.timeout_s < state.min_timeout_s || body.timeout_s > state.max_timeout_s {
        return Err(SubmitError::TimeoutOutOfRange {
            min: state.min_timeout_s,
            max: state.max_timeout_s,
            got: body.timeout_s,
        });
    }

    let depth = state
        .queue
        .depth()
        .await
        .map_err(|e| SubmitError::Infrastructure(e.to_string()))?;
    if depth > state.queue_high_watermark {
        return Err(SubmitError::Overloaded);
    }

    let id = Uuid::new_v4();
    let resource_class = body.resource_class.clone().unwrap_or_else(|| "default".to_string());
    let max_output_bytes = body.max_output_bytes.unwrap_or(state.default_output_bytes);

    let req = NewEvaluation {
        language_tag: body.language_tag.clone(),
        source_text: body.source_text.clone(),
        timeout_s: body.timeout_s,
        max_output_bytes,
        resource_class: Some(resource_class.clone()),
    };

    let payload = json!({
        "source_text": req.source_text,
        "language_tag": req.language_tag,
        "timeout_s": req.timeout_s,
        "max_output_bytes": req.max_output_bytes,
        "resource_class": req.resource_class,
    });
    let envelope: Envelope = EventEnvelope::new(id, Topic::EvalQueued, None, payload);
    state
        .bus
        .publish(envelope)
        .await
        .map_err(|e| SubmitError::Infrastructure(e.to_string()))?;

    state
        .queue
        .enqueue(id, &resource_class)
        .await
        .map_err(|e| SubmitError::Infrastructure(e.to_string()))?;

    info!(eval_id = %id, language = %req.language_tag, "evaluation submitted");
    Ok(SubmitResponse { id, status: "queued" })
}

// ---------------------------------------------------------------------------
// GET /eval/{id}
// ---------------------------------------------------------------------------

async fn status(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    match state.store.get(id).await {
        Ok(eval) => (StatusCode::OK, Json(EvaluationResponse::from(eval))).into_response(),
        Err(StoreError::NotFound(_)) => match state.index.get(id).await {
            Ok(Some(_entry)) => {
                // Invariant (spec §3): a live routing-index entry implies
                // `status == running`, even if the Store's own insert from
                // `eval.queued` hasn't landed yet. Report what the index
                // already knows rather than a bare 404.
                (
                    StatusCode::OK,
                    Json(json!({"id": id, "status": "running"})),
                )
                    .into_response()
            }
            _ => GatewayError::NotFound(id).into_response(),
        },
        Err(e) => GatewayError::Infrastructure(e.to_string()).into_response(),
    }
}

// ---------------------------------------------------------------------------
// GET /eval?status=&limit=&offset=
// ---------------------------------------------------------------------------

async fn list(State(state): State<Arc<AppState>>, Query(q): Query<ListQuery>) -> Response {
    let status_filter = match q.status.as_deref() {
        None => None,
        Some(s) => match Status::parse(s) {
            Some(parsed) => Some(parsed),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": format!("unknown status filter {s:?}")})),
                )
                    .into_response()
            }
        },
    };
    match state.store.list(status_filter, q.limit, q.offset).await {
        Ok(rows) => (
            StatusCode::OK,
            Json(ListResponse {
                items: rows.into_iter().map(EvaluationResponse::from).collect(),
                limit: q.limit,
                offset: q.offset,
            }),
        )
            .into_response(),
        Err(e) => GatewayError::Infrastructure(e.to_string()).into_response(),
    }
}

// ---------------------------------------------------------------------------
// GET /eval/{id}/logs
// ---------------------------------------------------------------------------

async fn logs(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    if let Ok(Some(entry)) = state.index.get(id).await {
        let url = format!("{}/eval/{id}/logs", entry.runner_url);
        let resp = state
            .http
            .get(&url)
            .timeout(RUNNER_CALL_DEADLINE)
            .send()
            .await;
        return match resp {
            Ok(r) if r.status().is_success() => match r.json::<LogsResponse>().await {
                Ok(body) => (StatusCode::OK, Json(body)).into_response(),
                Err(e) => GatewayError::Infrastructure(e.to_string()).into_response(),
            },
            _ => {
                warn!(eval_id = %id, runner = %entry.runner_url, "runner did not respond to logs proxy within deadline");
                GatewayError::RunnerUnavailable(id).into_response()
            }
        };
    }

    match state.store.get(id).await {
        Ok(eval) if eval.status.is_terminal() => (
            StatusCode::OK,
            Json(LogsResponse {
                stdout_tail: eval.output_preview.unwrap_or_default(),
                stderr_tail: String::new(),
                is_running: false,
                exit_code: eval.exit_code,
            }),
        )
            .into_response(),
        Ok(_queued_or_running) => (
            StatusCode::OK,
            Json(LogsResponse {
                stdout_tail: String::new(),
                stderr_tail: String::new(),
                is_running: false,
                exit_code: None,
            }),
        )
            .into_response(),
        Err(StoreError::NotFound(_)) => GatewayError::NotFound(id).into_response(),
        Err(e) => GatewayError::Infrastructure(e.to_string()).into_response(),
    }
}

// ---------------------------------------------------------------------------
// POST /eval/{id}/kill
// ---------------------------------------------------------------------------

async fn kill(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    let Ok(Some(entry)) = state.index.get(id).await else {
        return (
            StatusCode::OK,
            Json(KillResponse {
                killed: false,
                reason: Some("not_running"),
            }),
        )
            .into_response();
    };

    let url = format!("{}/eval/{id}/kill", entry.runner_url);
    let resp = state.http.post(&url).timeout(RUNNER_CALL_DEADLINE).send().await;
    match resp {
        Ok(r) if r.status().is_success() => {
            (StatusCode::OK, Json(KillResponse { killed: true, reason: None })).into_response()
        }
        _ => {
            warn!(eval_id = %id, runner = %entry.runner_url, "kill request to runner failed");
            (
                StatusCode::OK,
                Json(KillResponse {
                    killed: false,
                    reason: Some("runner_unreachable"),
                }),
            )
                .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// GET /eval/{id}/stream (SSE)
// ---------------------------------------------------------------------------

async fn stream(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    let (tx, rx) = mpsc::channel::<Envelope>(256);
    for topic in STREAM_TOPICS {
        let bus = state.bus.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let Ok(mut s) = bus.subscribe(topic).await else {
                return;
            };
            while let Some(envelope) = s.next().await {
                if envelope.eval_id == id && tx.send(envelope).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    let events = ReceiverStream::new(rx).map(|envelope| {
        let event_name = envelope.topic.as_str();
        let data = serde_json::to_string(&envelope).unwrap_or_default();
        Ok::<Event, Infallible>(Event::default().event(event_name).data(data))
    });

    Sse::new(events)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}
