use async_trait::async_trait;
use chrono::Utc;
use evalctl_schemas::{EvalEvent, Evaluation, NewEvaluation, ResourceClass, Status};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{apply_event, Store, StoreError};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(PgStore { pool })
    }

    fn row_to_eval(row: &sqlx::postgres::PgRow) -> Result<Evaluation, StoreError> {
        let status_str: String = row.try_get("status").map_err(backend_err)?;
        let status =
            Status::parse(&status_str).ok_or_else(|| StoreError::Backend(format!(
                "unrecognized status {status_str:?} in evaluations row"
            )))?;
        Ok(Evaluation {
            id: row.try_get("id").map_err(backend_err)?,
            language_tag: row.try_get("language_tag").map_err(backend_err)?,
            source_text: row.try_get("source_text").map_err(backend_err)?,
            timeout_s: row.try_get::<i32, _>("timeout_s").map_err(backend_err)? as u32,
            max_output_bytes: row
                .try_get::<i64, _>("max_output_bytes")
                .map_err(backend_err)? as u64,
            resource_class: ResourceClass(row.try_get("resource_class").map_err(backend_err)?),
            status,
            exit_code: row.try_get("exit_code").map_err(backend_err)?,
            error_reason: row.try_get("error_reason").map_err(backend_err)?,
            output_preview: row.try_get("output_preview").map_err(backend_err)?,
            output_ref: row.try_get("output_ref").map_err(backend_err)?,
            created_at: row.try_get("created_at").map_err(backend_err)?,
            started_at: row.try_get("started_at").map_err(backend_err)?,
            finished_at: row.try_get("finished_at").map_err(backend_err)?,
        })
    }
}

fn backend_err(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl Store for PgStore {
    async fn insert(
        &self,
        id: Uuid,
        created_at: chrono::DateTime<Utc>,
        req: NewEvaluation,
    ) -> Result<Evaluation, StoreError> {
        let eval = Evaluation::new(id, req, created_at);
        let row = sqlx::query(
            r#"
            insert into evaluations (
              id, language_tag, source_text, timeout_s, max_output_bytes,
              resource_class, status, created_at
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $8
            )
            on conflict (id) do nothing
            returning *
            "#,
        )
        .bind(eval.id)
        .bind(&eval.language_tag)
        .bind(&eval.source_text)
        .bind(eval.timeout_s as i32)
        .bind(eval.max_output_bytes as i64)
        .bind(&eval.resource_class.0)
        .bind(eval.status.as_str())
        .bind(eval.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;

        match row {
            Some(row) => Self::row_to_eval(&row),
            None => self.get(id).await,
        }
    }

    async fn get(&self, id: Uuid) -> Result<Evaluation, StoreError> {
        let row = sqlx::query("select * from evaluations where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_err)?
            .ok_or(StoreError::NotFound(id))?;
        Self::row_to_eval(&row)
    }

    async fn update_if(&self, id: Uuid, event: EvalEvent) -> Result<Evaluation, StoreError> {
        // fetch-then-guarded-update: the transition is validated in Rust,
        // then written under a row lock so a concurrent writer for the
        // same evaluation can't race the check.
        let mut tx = self.pool.begin().await.map_err(backend_err)?;
        let row = sqlx::query("select * from evaluations where id = $1 for update")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend_err)?
            .ok_or(StoreError::NotFound(id))?;
        let mut eval = Self::row_to_eval(&row)?;
        apply_event(&mut eval, event)?;

        sqlx::query(
            r#"
            update evaluations
            set status = $2,
                exit_code = $3,
                error_reason = $4,
                started_at = $5,
                finished_at = $6
            where id = $1
            "#,
        )
        .bind(eval.id)
        .bind(eval.status.as_str())
        .bind(eval.exit_code)
        .bind(&eval.error_reason)
        .bind(eval.started_at)
        .bind(eval.finished_at)
        .execute(&mut *tx)
        .await
        .map_err(backend_err)?;

        tx.commit().await.map_err(backend_err)?;
        Ok(eval)
    }

    async fn list_running(&self) -> Result<Vec<Evaluation>, StoreError> {
        let rows = sqlx::query("select * from evaluations where status = 'running'")
            .fetch_all(&self.pool)
            .await
            .map_err(backend_err)?;
        rows.iter().map(Self::row_to_eval).collect()
    }

    async fn list(
        &self,
        status: Option<Status>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Evaluation>, StoreError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "select * from evaluations where status = $1 \
                     order by created_at desc limit $2 offset $3",
                )
                .bind(status.as_str())
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "select * from evaluations order by created_at desc limit $1 offset $2",
                )
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(backend_err)?;
        rows.iter().map(Self::row_to_eval).collect()
    }

    async fn set_output(
        &self,
        id: Uuid,
        preview: Option<String>,
        output_ref: Option<String>,
    ) -> Result<(), StoreError> {
        sqlx::query("update evaluations set output_preview = $2, output_ref = $3 where id = $1")
            .bind(id)
            .bind(preview)
            .bind(output_ref)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(())
    }
}
