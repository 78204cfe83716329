use async_trait::async_trait;
use chrono::{DateTime, Utc};

use opsdash_common::error::OpsResult;
use opsdash_db::outbox::models::OutboxPayload;
use opsdash_db::projection::SyncRecord;

/// How a change query treats records edited exactly at the watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// `last_edited_at >= since`.
    Inclusive,
    /// `last_edited_at > since`.
    Exclusive,
}

/// Lists records changed in the source-of-record service.
#[async_trait]
pub trait ChangeSource<E: SyncRecord>: Send + Sync {
    /// Every record edited since the watermark, oldest edit first, across all pages.
    async fn list_changed(&self, since: DateTime<Utc>, boundary: Boundary) -> OpsResult<Vec<E>>;
}

/// Replays a locally originated write against the source-of-record service.
///
/// May be called more than once for the same payload.
#[async_trait]
pub trait WriteSink<P: OutboxPayload>: Send + Sync {
    async fn replay(&self, payload: &P) -> OpsResult<()>;
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, recipient: &str, message: &str) -> OpsResult<()>;
}
