//! Explicit topic -> handler dispatch table, built once at startup. No
//! language-level reflection: every Bus topic the Reactor reacts to is
//! registered here by hand, the same way the daemon hand-registers every
//! HTTP route rather than deriving routes from attributes.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use evalctl_bus::{Bus, Envelope};
use evalctl_index::Index;
use evalctl_schemas::{EvalEvent, EventEnvelope, NewEvaluation, RoutingIndexEntry, Topic};
use evalctl_store::{Store, StoreError};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditWriter;

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type Handler = Box<dyn Fn(Arc<ReactorCtx>, Envelope) -> BoxFuture + Send + Sync>;

/// Shared state every handler closes over. `dispatch_targets` is the one
/// piece of state that exists only here, not in the Store or Index: the
/// Dispatcher's `eval.dispatched` event is the only place a runner URL is
/// ever announced, and `eval.started` needs it a moment later to populate
/// the Routing Index entry.
pub struct ReactorCtx {
    pub store: Arc<dyn Store>,
    pub index: Arc<dyn Index>,
    pub bus: Arc<dyn Bus>,
    pub audit: Mutex<AuditWriter>,
    pub output_inline_max_bytes: u64,
    pub audit_log_dir: String,
    pub index_grace: Duration,
    dispatch_targets: Mutex<HashMap<Uuid, String>>,
}

impl ReactorCtx {
    pub fn new(
        store: Arc<dyn Store>,
        index: Arc<dyn Index>,
        bus: Arc<dyn Bus>,
        audit: AuditWriter,
        output_inline_max_bytes: u64,
        audit_log_dir: String,
        index_grace: Duration,
    ) -> Self {
        ReactorCtx {
            store,
            index,
            bus,
            audit: Mutex::new(audit),
            output_inline_max_bytes,
            audit_log_dir,
            index_grace,
            dispatch_targets: Mutex::new(HashMap::new()),
        }
    }
}

pub fn build_dispatch_table() -> HashMap<Topic, Handler> {
    let mut table: HashMap<Topic, Handler> = HashMap::new();
    table.insert(Topic::EvalQueued, Box::new(|ctx, env| Box::pin(on_queued(ctx, env))));
    table.insert(
        Topic::EvalDispatched,
        Box::new(|ctx, env| Box::pin(on_dispatched(ctx, env))),
    );
    table.insert(Topic::EvalStarted, Box::new(|ctx, env| Box::pin(on_started(ctx, env))));
    table.insert(
        Topic::EvalHeartbeat,
        Box::new(|ctx, env| Box::pin(on_heartbeat(ctx, env))),
    );
    table.insert(
        Topic::EvalCompleted,
        Box::new(|ctx, env| Box::pin(on_completed(ctx, env))),
    );
    table.insert(Topic::EvalFailed, Box::new(|ctx, env| Box::pin(on_failed(ctx, env))));
    table.insert(
        Topic::EvalCancelled,
        Box::new(|ctx, env| Box::pin(on_cancelled(ctx, env))),
    );
    table
}

#[derive(serde::Deserialize)]
struct QueuedPayload {
    source_text: String,
    language_tag: String,
    timeout_s: u32,
    max_output_bytes: u64,
    #[serde(default)]
    resource_class: Option<String>,
}

async fn on_queued(ctx: Arc<ReactorCtx>, env: Envelope) {
    let payload: QueuedPayload = match serde_json::from_value(env.payload.clone()) {
        Ok(p) => p,
        Err(e) => {
            warn!(eval_id = %env.eval_id, error = %e, "malformed eval.queued payload, dropping");
            return;
        }
    };
    let req = NewEvaluation {
        language_tag: payload.language_tag,
        source_text: payload.source_text,
        timeout_s: payload.timeout_s,
        max_output_bytes: payload.max_output_bytes,
        resource_class: payload.resource_class,
    };
    match ctx.store.insert(env.eval_id, env.ts_utc, req).await {
        Ok(_) => {
            publish_confirmation(&ctx, env.eval_id, Topic::StoreCreated, Some(env.event_id)).await;
            audit(&ctx, env.eval_id, &env).await;
        }
        Err(e) => warn!(eval_id = %env.eval_id, error = %e, "failed to persist queued evaluation"),
    }
}

async fn on_dispatched(ctx: Arc<ReactorCtx>, env: Envelope) {
    if let Some(url) = env.payload.get("runner_url").and_then(|v| v.as_str()) {
        ctx.dispatch_targets
            .lock()
            .await
            .insert(env.eval_id, url.to_string());
    }
    match ctx.store.update_if(env.eval_id, EvalEvent::Dispatched).await {
        Ok(_) => audit(&ctx, env.eval_id, &env).await,
        Err(StoreError::IllegalTransition { .. }) => {
            info!(eval_id = %env.eval_id, "late eval.dispatched redelivery ignored");
        }
        Err(e) => warn!(eval_id = %env.eval_id, error = %e, "failed to record dispatch"),
    }
}

async fn on_started(ctx: Arc<ReactorCtx>, env: Envelope) {
    match ctx.store.update_if(env.eval_id, EvalEvent::Started).await {
        Ok(eval) => {
            let runner_url = ctx
                .dispatch_targets
                .lock()
                .await
                .get(&env.eval_id)
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            let slot = env
                .payload
                .get("slot")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32;
            let entry = RoutingIndexEntry {
                eval_id: env.eval_id,
                runner_url,
                slot,
                last_heartbeat: Utc::now(),
            };
            let ttl = running_index_ttl(&ctx, eval.timeout_s);
            if let Err(e) = ctx.index.set(env.eval_id, entry, ttl).await {
                warn!(eval_id = %env.eval_id, error = %e, "failed to write routing index entry");
            }
            publish_confirmation(&ctx, env.eval_id, Topic::StoreUpdated, Some(env.event_id)).await;
            audit(&ctx, env.eval_id, &env).await;
        }
        Err(StoreError::IllegalTransition { .. }) => {
            info!(eval_id = %env.eval_id, "duplicate eval.started ignored");
        }
        Err(e) => warn!(eval_id = %env.eval_id, error = %e, "failed to persist eval.started"),
    }
}

/// TTL refresh only: per the heartbeat semantics decision, heartbeats never
/// touch the Store, only the Routing Index's expiry clock.
async fn on_heartbeat(ctx: Arc<ReactorCtx>, env: Envelope) {
    let Ok(Some(mut entry)) = ctx.index.get(env.eval_id).await else {
        return;
    };
    entry.last_heartbeat = Utc::now();
    let timeout_s = ctx
        .store
        .get(env.eval_id)
        .await
        .map(|eval| eval.timeout_s)
        .unwrap_or(0);
    let ttl = running_index_ttl(&ctx, timeout_s);
    let _ = ctx.index.set(env.eval_id, entry, ttl).await;
}

async fn on_completed(ctx: Arc<ReactorCtx>, env: Envelope) {
    let exit_code = env
        .payload
        .get("exit_code")
        .and_then(|v| v.as_i64())
        .unwrap_or(0) as i32;
    on_terminal(ctx, env, EvalEvent::Completed { exit_code }).await;
}

async fn on_failed(ctx: Arc<ReactorCtx>, env: Envelope) {
    let reason = env
        .payload
        .get("reason")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let exit_code = env.payload.get("exit_code").and_then(|v| v.as_i64()).map(|v| v as i32);
    on_terminal(ctx, env, EvalEvent::Failed { reason, exit_code }).await;
}

async fn on_cancelled(ctx: Arc<ReactorCtx>, env: Envelope) {
    let exit_code = env.payload.get("exit_code").and_then(|v| v.as_i64()).map(|v| v as i32);
    on_terminal(ctx, env, EvalEvent::Cancelled { exit_code }).await;
}

async fn on_terminal(ctx: Arc<ReactorCtx>, env: Envelope, event: EvalEvent) {
    match ctx.store.update_if(env.eval_id, event).await {
        Ok(_) => {
            if let Some(output) = env.payload.get("output").and_then(|v| v.as_str()) {
                persist_output(&ctx, env.eval_id, output).await;
            }
            ctx.dispatch_targets.lock().await.remove(&env.eval_id);
            let _ = ctx.index.del(env.eval_id).await;
            publish_confirmation(&ctx, env.eval_id, Topic::StoreUpdated, Some(env.event_id)).await;
            audit(&ctx, env.eval_id, &env).await;
        }
        Err(StoreError::IllegalTransition { .. }) => {
            info!(eval_id = %env.eval_id, topic = %env.topic, "duplicate terminal event ignored");
        }
        Err(e) => warn!(eval_id = %env.eval_id, error = %e, "failed to persist terminal event"),
    }
}

/// `timeout_s` plus twice the configured heartbeat grace: an evaluation is
/// allowed to miss one heartbeat outright before its routing entry expires.
fn running_index_ttl(ctx: &ReactorCtx, timeout_s: u32) -> Duration {
    Duration::from_secs(timeout_s as u64) + ctx.index_grace * 2
}

/// Inline cutover (see `OUTPUT_INLINE_MAX_BYTES`): output at or under the
/// limit is stored as the preview with no ref; larger output is spilled to
/// a file under the audit log directory and the preview is truncated to
/// the first N bytes on a char boundary.
async fn persist_output(ctx: &ReactorCtx, eval_id: Uuid, output: &str) {
    let bytes = output.as_bytes();
    if (bytes.len() as u64) <= ctx.output_inline_max_bytes {
        let _ = ctx.store.set_output(eval_id, Some(output.to_string()), None).await;
        return;
    }

    let mut cutoff = (ctx.output_inline_max_bytes as usize).min(bytes.len());
    while cutoff > 0 && !output.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    let preview = output[..cutoff].to_string();

    let dir = Path::new(&ctx.audit_log_dir).join("outputs");
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        warn!(eval_id = %eval_id, error = %e, "failed to create output spill directory");
        let _ = ctx.store.set_output(eval_id, Some(preview), None).await;
        return;
    }
    let path = dir.join(format!("{eval_id}.txt"));
    match tokio::fs::write(&path, output).await {
        Ok(()) => {
            let _ = ctx
                .store
                .set_output(eval_id, Some(preview), Some(path.display().to_string()))
                .await;
        }
        Err(e) => {
            warn!(eval_id = %eval_id, error = %e, "failed to spill full output to disk");
            let _ = ctx.store.set_output(eval_id, Some(preview), None).await;
        }
    }
}

async fn publish_confirmation(
    ctx: &ReactorCtx,
    eval_id: Uuid,
    topic: Topic,
    causation_id: Option<Uuid>,
) {
    let envelope: Envelope = EventEnvelope::new(
        eval_id,
        topic,
        causation_id,
        serde_json::json!({"id": eval_id}),
    );
    let _ = ctx.bus.publish(envelope).await;
}

async fn audit(ctx: &ReactorCtx, eval_id: Uuid, env: &Envelope) {
    let mut writer = ctx.audit.lock().await;
    if let Err(e) = writer.append(eval_id, env.topic.as_str(), env.payload.clone()) {
        warn!(eval_id = %eval_id, error = %e, "failed to append audit log entry");
    }
}
