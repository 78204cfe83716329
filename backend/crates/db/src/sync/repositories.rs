use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::sync::models::SyncWatermark;
use opsdash_common::error::OpsResult;

#[async_trait]
pub trait SyncWatermarkRepository: Send + Sync {
    /// Get or create the watermark for an entity type (new rows start at the epoch).
    async fn get_or_create(&self, entity_type: &str) -> OpsResult<SyncWatermark>;

    /// Atomically set status to 'running' unless another run holds an unexpired lease.
    /// Returns `None` if the lock was not acquired.
    async fn acquire_lock(
        &self,
        entity_type: &str,
        lease: Duration,
    ) -> OpsResult<Option<SyncWatermark>>;

    /// Release the lock and advance the watermark. The stored value never moves backwards.
    async fn mark_completed(
        &self,
        id: Uuid,
        last_synced_at: DateTime<Utc>,
        boundary_ids: &[Uuid],
    ) -> OpsResult<SyncWatermark>;

    /// Release the lock without touching the watermark.
    async fn mark_idle(&self, id: Uuid) -> OpsResult<SyncWatermark>;

    /// Release the lock, recording why the cycle failed. The watermark is untouched.
    async fn mark_failed(&self, id: Uuid, error_message: &str) -> OpsResult<SyncWatermark>;
}
