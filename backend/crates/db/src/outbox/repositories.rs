use async_trait::async_trait;

use crate::outbox::models::{FailureDisposition, OutboxItem, OutboxPayload};
use opsdash_common::error::OpsResult;

#[async_trait]
pub trait OutboxRepository<P: OutboxPayload>: Send + Sync {
    /// Queue a write; returns the new row id.
    async fn enqueue(&self, payload: &P) -> OpsResult<i64>;

    /// Oldest pending rows first (creation time, then id), dead-lettered rows excluded.
    async fn fetch_pending(&self, limit: i64) -> OpsResult<Vec<OutboxItem<P>>>;

    /// Remove a row after its write was confirmed.
    async fn delete(&self, id: i64) -> OpsResult<()>;

    /// Keep the row pending with `error` as its last failure, without spending an attempt.
    async fn record_retry(&self, id: i64, error: &str) -> OpsResult<()>;

    /// Count a rejected replay; dead-letters the row once `max_attempts` is reached.
    async fn record_failure(
        &self,
        id: i64,
        error: &str,
        max_attempts: i32,
    ) -> OpsResult<FailureDisposition>;

    /// Rows parked after exhausting their attempts.
    async fn count_dead_lettered(&self) -> OpsResult<i64>;
}
