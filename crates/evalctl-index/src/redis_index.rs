use std::time::Duration;

use async_trait::async_trait;
use evalctl_schemas::RoutingIndexEntry;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::{Index, IndexError};

const KEY_PREFIX: &str = "evalctl:index:";

fn key(eval_id: Uuid) -> String {
    format!("{KEY_PREFIX}{eval_id}")
}

/// Redis-backed Index. TTL is native `SETEX`/`EXPIRE`, so an entry's expiry
/// requires no background sweep — Redis itself drops the key, which is
/// exactly the "absence signals a vanished Runner" contract the reconciler
/// relies on.
pub struct RedisIndex {
    client: redis::Client,
}

impl RedisIndex {
    pub async fn connect(url: &str) -> Result<Self, IndexError> {
        let client = redis::Client::open(url).map_err(to_err)?;
        let _ = client
            .get_multiplexed_async_connection()
            .await
            .map_err(to_err)?;
        Ok(RedisIndex { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, IndexError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(to_err)
    }
}

fn to_err(e: redis::RedisError) -> IndexError {
    IndexError::Backend(e.to_string())
}

#[async_trait]
impl Index for RedisIndex {
    async fn set(
        &self,
        eval_id: Uuid,
        entry: RoutingIndexEntry,
        ttl: Duration,
    ) -> Result<(), IndexError> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&entry).map_err(|e| IndexError::Backend(e.to_string()))?;
        conn.set_ex::<_, _, ()>(key(eval_id), payload, ttl.as_secs().max(1))
            .await
            .map_err(to_err)?;
        Ok(())
    }

    async fn get(&self, eval_id: Uuid) -> Result<Option<RoutingIndexEntry>, IndexError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(key(eval_id)).await.map_err(to_err)?;
        Ok(match raw {
            Some(s) => Some(
                serde_json::from_str(&s).map_err(|e| IndexError::Backend(e.to_string()))?,
            ),
            None => None,
        })
    }

    async fn del(&self, eval_id: Uuid) -> Result<(), IndexError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key(eval_id)).await.map_err(to_err)?;
        Ok(())
    }

    async fn members(&self) -> Result<Vec<Uuid>, IndexError> {
        let mut conn = self.conn().await?;
        let pattern = format!("{KEY_PREFIX}*");
        let keys: Vec<String> = conn.keys(pattern).await.map_err(to_err)?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(KEY_PREFIX).and_then(|s| Uuid::parse_str(s).ok()))
            .collect())
    }
}
