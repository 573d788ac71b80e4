use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{Queue, QueueError, QueuedItem};

pub struct PgQueue {
    pool: PgPool,
}

impl PgQueue {
    pub async fn connect(url: &str) -> Result<Self, QueueError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(to_err)?;
        Ok(PgQueue { pool })
    }
}

fn to_err(e: sqlx::Error) -> QueueError {
    QueueError::Backend(e.to_string())
}

#[async_trait]
impl Queue for PgQueue {
    async fn enqueue(&self, eval_id: Uuid, resource_class: &str) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            insert into eval_queue (eval_id, resource_class, status)
            values ($1, $2, 'pending')
            on conflict (eval_id) do nothing
            "#,
        )
        .bind(eval_id)
        .bind(resource_class)
        .execute(&self.pool)
        .await
        .map_err(to_err)?;
        Ok(())
    }

    async fn claim(
        &self,
        resource_class: &str,
        batch_size: u32,
        claimed_by: &str,
    ) -> Result<Vec<QueuedItem>, QueueError> {
        let rows = sqlx::query(
            r#"
            with to_claim as (
                select eval_id
                from eval_queue
                where status = 'pending'
                  and resource_class = $1
                  and not_before <= now()
                order by created_at asc
                limit $2
                for update skip locked
            )
            update eval_queue
               set status = 'claimed',
                   claimed_at = now(),
                   claimed_by = $3
             where eval_id in (select eval_id from to_claim)
            returning eval_id, resource_class, attempts
            "#,
        )
        .bind(resource_class)
        .bind(batch_size as i64)
        .bind(claimed_by)
        .fetch_all(&self.pool)
        .await
        .map_err(to_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(QueuedItem {
                    eval_id: row.try_get("eval_id").map_err(to_err)?,
                    resource_class: row.try_get("resource_class").map_err(to_err)?,
                    attempts: row.try_get::<i32, _>("attempts").map_err(to_err)? as u32,
                })
            })
            .collect()
    }

    async fn ack(&self, eval_id: Uuid) -> Result<(), QueueError> {
        sqlx::query("delete from eval_queue where eval_id = $1")
            .bind(eval_id)
            .execute(&self.pool)
            .await
            .map_err(to_err)?;
        Ok(())
    }

    async fn nack(
        &self,
        eval_id: Uuid,
        retry_max: u32,
        retry_base_s: u64,
        reason: &str,
    ) -> Result<bool, QueueError> {
        let mut tx = self.pool.begin().await.map_err(to_err)?;
        let row = sqlx::query(
            "select resource_class, attempts from eval_queue where eval_id = $1 for update",
        )
        .bind(eval_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(to_err)?;
        let Some(row) = row else {
            return Ok(false);
        };
        let resource_class: String = row.try_get("resource_class").map_err(to_err)?;
        let attempts: i32 = row.try_get("attempts").map_err(to_err)?;
        let attempts = attempts + 1;

        if attempts as u32 > retry_max {
            sqlx::query(
                r#"
                insert into eval_queue_dead (eval_id, resource_class, attempts, last_error)
                values ($1, $2, $3, $4)
                "#,
            )
            .bind(eval_id)
            .bind(&resource_class)
            .bind(attempts)
            .bind(reason)
            .execute(&mut *tx)
            .await
            .map_err(to_err)?;
            sqlx::query("delete from eval_queue where eval_id = $1")
                .bind(eval_id)
                .execute(&mut *tx)
                .await
                .map_err(to_err)?;
            tx.commit().await.map_err(to_err)?;
            Ok(false)
        } else {
            sqlx::query(
                r#"
                update eval_queue
                   set status = 'pending',
                       attempts = $2,
                       claimed_by = null,
                       claimed_at = null,
                       not_before = now() + (interval '1 second' * ($3 * 2 ^ $2))
                 where eval_id = $1
                "#,
            )
            .bind(eval_id)
            .bind(attempts)
            .bind(retry_base_s as f64)
            .execute(&mut *tx)
            .await
            .map_err(to_err)?;
            tx.commit().await.map_err(to_err)?;
            Ok(true)
        }
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let row = sqlx::query("select count(*) as n from eval_queue where status = 'pending'")
            .fetch_one(&self.pool)
            .await
            .map_err(to_err)?;
        let n: i64 = row.try_get("n").map_err(to_err)?;
        Ok(n as u64)
    }
}
