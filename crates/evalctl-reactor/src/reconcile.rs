//! Stuck-evaluation reconciler: a periodic diff of the Store's `running`
//! set against the Routing Index's live set. Grounded on the source
//! repo's engine/gate/watermark trio, generalized from "local vs broker
//! snapshot" to "Store vs Index", with the same fail-closed-on-no-
//! timestamp posture as `SnapshotFreshness`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use evalctl_index::Index;
use evalctl_schemas::{EvalEvent, Evaluation};
use evalctl_store::Store;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("store error: {0}")]
    Store(#[from] evalctl_store::StoreError),
    #[error("index error: {0}")]
    Index(#[from] evalctl_index::IndexError),
}

/// A `running` evaluation with no `started_at` can never be aged
/// correctly, so it is always treated as already expired rather than
/// silently skipped — the same fail-closed rule the source repo's
/// `SnapshotFreshness` applies to a missing broker timestamp.
fn is_stuck(eval: &Evaluation, now: chrono::DateTime<Utc>, grace: Duration) -> bool {
    let Some(started_at) = eval.started_at else {
        return true;
    };
    let deadline = started_at
        + chrono::Duration::seconds(eval.timeout_s as i64)
        + chrono::Duration::from_std(grace * 2).unwrap_or(chrono::Duration::zero());
    now > deadline
}

/// One sweep: lists every `running` row, checks it against the Routing
/// Index, and fails any row whose Runner appears to have vanished (no
/// live index entry past `started_at + timeout_s + 2*grace`). `grace`
/// mirrors the Runner liveness window (`RUNNER_LIVENESS_S`) so an
/// evaluation is never declared lost before a Runner could plausibly have
/// missed two heartbeats. Returns the ids it failed.
pub async fn reconcile_once(
    store: &Arc<dyn Store>,
    index: &Arc<dyn Index>,
    grace: Duration,
) -> Result<Vec<Uuid>, ReconcileError> {
    let running = store.list_running().await?;
    let now = Utc::now();
    let mut lost = Vec::new();

    for eval in running {
        if index.get(eval.id).await?.is_some() {
            continue;
        }
        if !is_stuck(&eval, now, grace) {
            continue;
        }

        warn!(eval_id = %eval.id, "routing index entry missing past deadline, marking lost_runner");
        match store
            .update_if(
                eval.id,
                EvalEvent::Failed {
                    reason: "lost_runner".to_string(),
                    exit_code: None,
                },
            )
            .await
        {
            Ok(_) => {
                let _ = index.del(eval.id).await;
                lost.push(eval.id);
            }
            Err(e) => warn!(eval_id = %eval.id, error = %e, "failed to mark lost evaluation as failed"),
        }
    }

    if !lost.is_empty() {
        info!(count = lost.len(), "reconcile sweep failed stuck evaluations");
    }
    Ok(lost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalctl_schemas::{NewEvaluation, Status};
    use evalctl_store::InMemoryStore;
    use evalctl_index::InMemoryIndex;

    fn req() -> NewEvaluation {
        NewEvaluation {
            language_tag: "python3".to_string(),
            source_text: "print(1)".to_string(),
            timeout_s: 1,
            max_output_bytes: 1024,
            resource_class: None,
        }
    }

    #[tokio::test]
    async fn running_with_no_started_at_is_never_possible_but_missing_index_past_deadline_fails() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let index: Arc<dyn Index> = Arc::new(InMemoryIndex::new());

        let eval = store.insert(Uuid::new_v4(), Utc::now(), req()).await.unwrap();
        store.update_if(eval.id, EvalEvent::Started).await.unwrap();

        // no index entry ever written, deadline (1s timeout + 20s grace) has
        // not elapsed yet, so this sweep must be a no-op.
        let lost = reconcile_once(&store, &index, Duration::from_secs(10)).await.unwrap();
        assert!(lost.is_empty());
        let row = store.get(eval.id).await.unwrap();
        assert_eq!(row.status, Status::Running);
    }

    #[tokio::test]
    async fn live_index_entry_protects_a_running_evaluation() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let index: Arc<dyn Index> = Arc::new(InMemoryIndex::new());

        let eval = store.insert(Uuid::new_v4(), Utc::now(), req()).await.unwrap();
        store.update_if(eval.id, EvalEvent::Started).await.unwrap();
        index
            .set(
                eval.id,
                evalctl_schemas::RoutingIndexEntry {
                    eval_id: eval.id,
                    runner_url: "http://runner-1".to_string(),
                    slot: 0,
                    last_heartbeat: Utc::now(),
                },
                Duration::from_secs(30),
            )
            .await
            .unwrap();

        let lost = reconcile_once(&store, &index, Duration::from_secs(10)).await.unwrap();
        assert!(lost.is_empty());
    }

    #[tokio::test]
    async fn queued_evaluations_are_never_touched_by_the_running_sweep() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let index: Arc<dyn Index> = Arc::new(InMemoryIndex::new());
        let eval = store.insert(Uuid::new_v4(), Utc::now(), req()).await.unwrap();

        let lost = reconcile_once(&store, &index, Duration::from_secs(10)).await.unwrap();
        assert!(lost.is_empty());
        let row = store.get(eval.id).await.unwrap();
        assert_eq!(row.status, Status::Queued);
    }

    #[tokio::test]
    async fn missing_index_entry_past_a_near_zero_deadline_is_declared_lost() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let index: Arc<dyn Index> = Arc::new(InMemoryIndex::new());

        let eval = store.insert(Uuid::new_v4(), Utc::now(), req()).await.unwrap();
        store.update_if(eval.id, EvalEvent::Started).await.unwrap();

        // timeout_s is 1 and grace is 1ms: the deadline is already in the
        // past by the time this sweep runs.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let lost = reconcile_once(&store, &index, Duration::from_millis(1)).await.unwrap();
        assert_eq!(lost, vec![eval.id]);
        let row = store.get(eval.id).await.unwrap();
        assert_eq!(row.status, Status::Failed);
        assert_eq!(row.error_reason.as_deref(), Some("lost_runner"));
    }
}
