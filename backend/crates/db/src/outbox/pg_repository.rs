use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Row};

use crate::outbox::models::{FailureDisposition, OutboxItem, OutboxPayload};
use crate::outbox::repositories::OutboxRepository;
use opsdash_common::error::{OpsError, OpsResult};

/// Outbox table for one write type, selected by `P::TABLE`.
pub struct PgOutboxRepository<P> {
    pool: PgPool,
    _payload: PhantomData<fn() -> P>,
}

impl<P> Clone for PgOutboxRepository<P> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _payload: PhantomData,
        }
    }
}

impl<P: OutboxPayload> PgOutboxRepository<P> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _payload: PhantomData,
        }
    }

    /// Queue a write on a caller-owned connection or transaction, so the row
    /// commits together with the caller's own bookkeeping.
    pub async fn enqueue_in(conn: &mut PgConnection, payload: &P) -> OpsResult<i64> {
        let value =
            serde_json::to_value(payload).map_err(|e| OpsError::Validation(e.to_string()))?;

        let row = sqlx::query(&format!(
            "insert into {} (payload) values ($1) returning id",
            P::TABLE
        ))
        .bind(value)
        .fetch_one(conn)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))?;

        Ok(row.get("id"))
    }

    fn map_row(row: sqlx::postgres::PgRow) -> OpsResult<OutboxItem<P>> {
        let id: i64 = row.get("id");
        let raw: serde_json::Value = row.get("payload");
        let payload = serde_json::from_value(raw).map_err(|e| {
            OpsError::Internal(format!("undecodable {} row {id}: {e}", P::WRITE_TYPE))
        })?;

        Ok(OutboxItem {
            id,
            payload,
            attempts: row.get("attempts"),
            last_error: row.get("last_error"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl<P: OutboxPayload> OutboxRepository<P> for PgOutboxRepository<P> {
    async fn enqueue(&self, payload: &P) -> OpsResult<i64> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| OpsError::Database(e.to_string()))?;
        Self::enqueue_in(&mut conn, payload).await
    }

    async fn fetch_pending(&self, limit: i64) -> OpsResult<Vec<OutboxItem<P>>> {
        let rows = sqlx::query(&format!(
            "select id, payload, attempts, last_error, created_at
             from {}
             where dead_lettered_at is null
             order by created_at, id
             limit $1",
            P::TABLE
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_row).collect()
    }

    async fn delete(&self, id: i64) -> OpsResult<()> {
        sqlx::query(&format!("delete from {} where id = $1", P::TABLE))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| OpsError::Database(e.to_string()))?;
        Ok(())
    }

    async fn record_retry(&self, id: i64, error: &str) -> OpsResult<()> {
        let result = sqlx::query(&format!(
            "update {} set last_error = $2 where id = $1",
            P::TABLE
        ))
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(OpsError::NotFound(format!("{} row {id}", P::WRITE_TYPE)));
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        id: i64,
        error: &str,
        max_attempts: i32,
    ) -> OpsResult<FailureDisposition> {
        let row = sqlx::query(&format!(
            "update {}
             set attempts = attempts + 1,
                 last_error = $2,
                 dead_lettered_at = case when attempts + 1 >= $3 then now() else null end
             where id = $1
             returning attempts, dead_lettered_at is not null as dead",
            P::TABLE
        ))
        .bind(id)
        .bind(error)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))?
        .ok_or_else(|| OpsError::NotFound(format!("{} row {id}", P::WRITE_TYPE)))?;

        let attempts: i32 = row.get("attempts");
        if row.get::<bool, _>("dead") {
            Ok(FailureDisposition::DeadLettered { attempts })
        } else {
            Ok(FailureDisposition::Retry { attempts })
        }
    }

    async fn count_dead_lettered(&self) -> OpsResult<i64> {
        let row = sqlx::query(&format!(
            "select count(*) as cnt from {} where dead_lettered_at is not null",
            P::TABLE
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))?;
        Ok(row.get::<i64, _>("cnt"))
    }
}
