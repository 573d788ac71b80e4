use std::sync::Arc;
use std::time::Duration;

use evalctl_bus::{Bus, Envelope};
use evalctl_queue::{Queue, QueuedItem};
use evalctl_schemas::{EventEnvelope, Topic};
use evalctl_store::Store;
use serde_json::json;
use tracing::{info, warn};

use crate::liveness::RunnerPools;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched,
    NoLiveRunner,
    AllRunnersRejected,
}

/// Hands `item` to one live Runner in its resource class, trying each live
/// candidate round-robin until one accepts or the list is exhausted. Acks
/// the Queue the moment a Runner accepts ownership; nacks (retry or
/// dead-letter, per the Queue's own backoff policy) on anything else so a
/// transient Runner outage never silently drops an evaluation.
pub async fn dispatch_one(
    http: &reqwest::Client,
    store: &Arc<dyn Store>,
    queue: &Arc<dyn Queue>,
    bus: &Arc<dyn Bus>,
    pools: &RunnerPools,
    retry_max: u32,
    retry_base_s: u64,
    dispatch_deadline: Duration,
    item: QueuedItem,
) -> DispatchOutcome {
    let eval = match store.get(item.eval_id).await {
        Ok(eval) => eval,
        Err(e) => {
            warn!(eval_id = %item.eval_id, error = %e, "could not read evaluation from store");
            let _ = queue
                .nack(item.eval_id, retry_max, retry_base_s, "store read failed")
                .await;
            return DispatchOutcome::NoLiveRunner;
        }
    };

    let candidates = pools.live_runners_round_robin(&item.resource_class);
    if candidates.is_empty() {
        let _ = queue
            .nack(item.eval_id, retry_max, retry_base_s, "no live runner in pool")
            .await;
        return DispatchOutcome::NoLiveRunner;
    }

    for runner_url in &candidates {
        let body = json!({
            "eval_id": eval.id,
            "language_tag": eval.language_tag,
            "source_text": eval.source_text,
            "timeout_s": eval.timeout_s,
            "max_memory_bytes": serde_json::Value::Null,
            "max_output_bytes": eval.max_output_bytes,
        });

        let resp = http
            .post(format!("{runner_url}/run"))
            .json(&body)
            .timeout(dispatch_deadline)
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                let _ = queue.ack(item.eval_id).await;
                let envelope: Envelope = EventEnvelope::new(
                    item.eval_id,
                    Topic::EvalDispatched,
                    None,
                    json!({"runner_url": runner_url}),
                );
                let _ = bus.publish(envelope).await;
                info!(eval_id = %item.eval_id, runner = %runner_url, "dispatched");
                return DispatchOutcome::Dispatched;
            }
            Ok(r) if r.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE => continue,
            Ok(r) => {
                warn!(
                    eval_id = %item.eval_id, runner = %runner_url, status = %r.status(),
                    "runner rejected run request"
                );
                continue;
            }
            Err(e) => {
                warn!(eval_id = %item.eval_id, runner = %runner_url, error = %e, "runner unreachable");
                continue;
            }
        }
    }

    let _ = queue
        .nack(
            item.eval_id,
            retry_max,
            retry_base_s,
            "all live runners busy or unreachable",
        )
        .await;
    DispatchOutcome::AllRunnersRejected
}
