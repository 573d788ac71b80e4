//! The Durable Store: the single source of truth for an evaluation's
//! record. Written only by the Reactor, under a guarded, fetch-then-update
//! pattern that enforces the status DAG for every transition.

mod memory;
mod pg;

pub use memory::InMemoryStore;
pub use pg::PgStore;

use async_trait::async_trait;
use evalctl_schemas::{EvalEvent, Evaluation, NewEvaluation, Status};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("evaluation {0} not found")]
    NotFound(Uuid),
    #[error("illegal transition for evaluation {eval_id}: {source}")]
    IllegalTransition {
        eval_id: Uuid,
        #[source]
        source: evalctl_schemas::TransitionError,
    },
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Narrow persistence seam. `update_if` is the only mutation path: it
/// fetches the current row, applies `event` through [`Status::apply`], and
/// only commits the write if the transition was legal — mirroring the
/// fetch-then-guarded-UPDATE shape every lifecycle mutator in the teacher's
/// database layer uses.
#[async_trait]
pub trait Store: Send + Sync {
    /// Idempotent: if `id` already has a row (a redelivered `eval.queued`
    /// event), returns the existing row rather than erroring or duplicating.
    async fn insert(
        &self,
        id: Uuid,
        created_at: chrono::DateTime<chrono::Utc>,
        req: NewEvaluation,
    ) -> Result<Evaluation, StoreError>;
    async fn get(&self, id: Uuid) -> Result<Evaluation, StoreError>;
    async fn update_if(&self, id: Uuid, event: EvalEvent) -> Result<Evaluation, StoreError>;
    async fn list_running(&self) -> Result<Vec<Evaluation>, StoreError>;
    /// Page of records ordered newest-first, optionally filtered by status.
    /// Backs the Gateway's listing endpoint.
    async fn list(
        &self,
        status: Option<Status>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Evaluation>, StoreError>;
    /// Sets the captured-output fields directly; separate from `update_if`
    /// since output text isn't part of the status DAG.
    async fn set_output(
        &self,
        id: Uuid,
        preview: Option<String>,
        output_ref: Option<String>,
    ) -> Result<(), StoreError>;
}

/// Builds the [`Store`] implementation named by `store_url`: `mem://`
/// selects [`InMemoryStore`], anything else is a Postgres DSN.
pub async fn connect(store_url: &str) -> Result<Box<dyn Store>, StoreError> {
    if store_url.starts_with("mem://") {
        Ok(Box::new(InMemoryStore::new()))
    } else {
        Ok(Box::new(PgStore::connect(store_url).await?))
    }
}

/// Shared helper: applies `event` against `current.status`, mutating
/// `current` in place on success. Used by both backends so the DAG
/// enforcement logic lives in exactly one place.
pub(crate) fn apply_event(
    current: &mut Evaluation,
    event: EvalEvent,
) -> Result<(), StoreError> {
    let next = current
        .status
        .apply(&event)
        .map_err(|source| StoreError::IllegalTransition {
            eval_id: current.id,
            source,
        })?;
    current.status = next;
    match event {
        EvalEvent::Started => current.started_at = Some(chrono::Utc::now()),
        EvalEvent::Completed { exit_code } => {
            current.exit_code = Some(exit_code);
            current.finished_at = Some(chrono::Utc::now());
        }
        EvalEvent::Failed { reason, exit_code } => {
            current.error_reason = Some(reason);
            current.exit_code = exit_code;
            current.finished_at = Some(chrono::Utc::now());
        }
        EvalEvent::Cancelled { exit_code } => {
            current.exit_code = exit_code;
            current.finished_at = Some(chrono::Utc::now());
        }
        EvalEvent::Dispatched => {}
    }
    Ok(())
}
