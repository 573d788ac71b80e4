use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use evalctl_schemas::{EvalEvent, Evaluation, NewEvaluation, Status};
use uuid::Uuid;

use crate::{apply_event, Store, StoreError};

/// In-process Store used by scenario tests and the `STORE_URL=mem://` dev
/// mode. Holds the same DAG-guarded semantics as [`crate::PgStore`] without
/// a database.
pub struct InMemoryStore {
    rows: Mutex<HashMap<Uuid, Evaluation>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            rows: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert(
        &self,
        id: Uuid,
        created_at: chrono::DateTime<Utc>,
        req: NewEvaluation,
    ) -> Result<Evaluation, StoreError> {
        let mut rows = self.rows.lock().expect("store mutex poisoned");
        if let Some(existing) = rows.get(&id) {
            return Ok(existing.clone());
        }
        let eval = Evaluation::new(id, req, created_at);
        rows.insert(eval.id, eval.clone());
        Ok(eval)
    }

    async fn get(&self, id: Uuid) -> Result<Evaluation, StoreError> {
        self.rows
            .lock()
            .expect("store mutex poisoned")
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn update_if(&self, id: Uuid, event: EvalEvent) -> Result<Evaluation, StoreError> {
        let mut rows = self.rows.lock().expect("store mutex poisoned");
        let eval = rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        apply_event(eval, event)?;
        Ok(eval.clone())
    }

    async fn list_running(&self) -> Result<Vec<Evaluation>, StoreError> {
        Ok(self
            .rows
            .lock()
            .expect("store mutex poisoned")
            .values()
            .filter(|e| e.status == Status::Running)
            .cloned()
            .collect())
    }

    async fn list(
        &self,
        status: Option<Status>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Evaluation>, StoreError> {
        let rows = self.rows.lock().expect("store mutex poisoned");
        let mut matching: Vec<Evaluation> = rows
            .values()
            .filter(|e| status.map(|s| e.status == s).unwrap_or(true))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn set_output(
        &self,
        id: Uuid,
        preview: Option<String>,
        output_ref: Option<String>,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().expect("store mutex poisoned");
        let eval = rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        eval.output_preview = preview;
        eval.output_ref = output_ref;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req() -> NewEvaluation {
        NewEvaluation {
            language_tag: "python3".to_string(),
            source_text: "print('hi')".to_string(),
            timeout_s: 10,
            max_output_bytes: 1024,
            resource_class: None,
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = InMemoryStore::new();
        let eval = store.insert(Uuid::new_v4(), Utc::now(), req()).await.unwrap();
        let fetched = store.get(eval.id).await.unwrap();
        assert_eq!(fetched.id, eval.id);
        assert_eq!(fetched.status, Status::Queued);
    }

    #[tokio::test]
    async fn legal_transition_updates_status() {
        let store = InMemoryStore::new();
        let eval = store.insert(Uuid::new_v4(), Utc::now(), req()).await.unwrap();
        let updated = store.update_if(eval.id, EvalEvent::Started).await.unwrap();
        assert_eq!(updated.status, Status::Running);
        assert!(updated.started_at.is_some());
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected_and_row_unchanged() {
        let store = InMemoryStore::new();
        let eval = store.insert(Uuid::new_v4(), Utc::now(), req()).await.unwrap();
        let err = store
            .update_if(eval.id, EvalEvent::Completed { exit_code: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
        let row = store.get(eval.id).await.unwrap();
        assert_eq!(row.status, Status::Queued);
    }

    #[tokio::test]
    async fn list_running_only_returns_running_rows() {
        let store = InMemoryStore::new();
        let queued = store.insert(Uuid::new_v4(), Utc::now(), req()).await.unwrap();
        let running = store.insert(Uuid::new_v4(), Utc::now(), req()).await.unwrap();
        store
            .update_if(running.id, EvalEvent::Started)
            .await
            .unwrap();

        let rows = store.list_running().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, running.id);
        assert_ne!(rows[0].id, queued.id);
    }

    #[tokio::test]
    async fn get_missing_id_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_filters_by_status_and_paginates_newest_first() {
        let store = InMemoryStore::new();
        let older = store
            .insert(Uuid::new_v4(), Utc::now() - chrono::Duration::seconds(10), req())
            .await
            .unwrap();
        let newer = store.insert(Uuid::new_v4(), Utc::now(), req()).await.unwrap();
        let running = store.insert(Uuid::new_v4(), Utc::now(), req()).await.unwrap();
        store.update_if(running.id, EvalEvent::Started).await.unwrap();

        let queued = store.list(Some(Status::Queued), 10, 0).await.unwrap();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].id, newer.id);
        assert_eq!(queued[1].id, older.id);

        let page = store.list(Some(Status::Queued), 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, older.id);

        let all = store.list(None, 10, 0).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn redelivered_insert_returns_existing_row() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let first = store.insert(id, created_at, req()).await.unwrap();
        store
            .update_if(id, EvalEvent::Started)
            .await
            .unwrap();
        let second = store.insert(id, created_at, req()).await.unwrap();
        assert_eq!(second.status, Status::Running);
        assert_eq!(second.id, first.id);
    }
}
