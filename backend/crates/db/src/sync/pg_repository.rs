use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::sync::models::{SyncStatus, SyncWatermark};
use crate::sync::repositories::SyncWatermarkRepository;
use opsdash_common::error::{OpsError, OpsResult};

const COLUMNS: &str =
    "id, entity_type, last_synced_at, cursor_value, status, error_message, created_at, updated_at";

#[derive(Clone)]
pub struct PgSyncRepository {
    pool: PgPool,
}

impl PgSyncRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: sqlx::postgres::PgRow) -> OpsResult<SyncWatermark> {
        let status_raw: String = row.get("status");
        let status = SyncStatus::from_str(&status_raw).map_err(OpsError::Internal)?;

        let cursor_value: Option<String> = row.get("cursor_value");
        let boundary_ids = match cursor_value.as_deref() {
            None | Some("") => Vec::new(),
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| OpsError::Internal(format!("corrupt watermark cursor: {e}")))?,
        };

        Ok(SyncWatermark {
            id: row.get("id"),
            entity_type: row.get("entity_type"),
            last_synced_at: row.get("last_synced_at"),
            boundary_ids,
            status,
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl SyncWatermarkRepository for PgSyncRepository {
    async fn get_or_create(&self, entity_type: &str) -> OpsResult<SyncWatermark> {
        // The no-op update keeps `updated_at` intact so a stale lease can still expire.
        let row = sqlx::query(&format!(
            "insert into sync_watermarks (id, entity_type)
             values ($1, $2)
             on conflict (entity_type) do update set entity_type = excluded.entity_type
             returning {COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(entity_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn acquire_lock(
        &self,
        entity_type: &str,
        lease: Duration,
    ) -> OpsResult<Option<SyncWatermark>> {
        let now = Utc::now();
        let lease = chrono::Duration::from_std(lease)
            .map_err(|e| OpsError::Internal(format!("invalid lock lease: {e}")))?;

        let row = sqlx::query(&format!(
            "update sync_watermarks
             set status = 'running', error_message = null, updated_at = $1
             where entity_type = $2 and (status != 'running' or updated_at < $3)
             returning {COLUMNS}"
        ))
        .bind(now)
        .bind(entity_type)
        .bind(now - lease)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::map_row(r)?)),
            None => Ok(None),
        }
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        last_synced_at: DateTime<Utc>,
        boundary_ids: &[Uuid],
    ) -> OpsResult<SyncWatermark> {
        let cursor = serde_json::to_string(boundary_ids)
            .map_err(|e| OpsError::Internal(e.to_string()))?;

        let row = sqlx::query(&format!(
            "update sync_watermarks
             set status = 'idle',
                 cursor_value = case when $1 >= last_synced_at then $2 else cursor_value end,
                 last_synced_at = greatest(last_synced_at, $1),
                 error_message = null,
                 updated_at = $3
             where id = $4
             returning {COLUMNS}"
        ))
        .bind(last_synced_at)
        .bind(cursor)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn mark_idle(&self, id: Uuid) -> OpsResult<SyncWatermark> {
        let row = sqlx::query(&format!(
            "update sync_watermarks
             set status = 'idle', error_message = null, updated_at = $1
             where id = $2
             returning {COLUMNS}"
        ))
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn mark_failed(&self, id: Uuid, error_message: &str) -> OpsResult<SyncWatermark> {
        let row = sqlx::query(&format!(
            "update sync_watermarks
             set status = 'failed', error_message = $1, updated_at = $2
             where id = $3
             returning {COLUMNS}"
        ))
        .bind(error_message)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))?;

        Self::map_row(row)
    }
}
