use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::transaction::TransactionManager;
use opsdash_common::error::OpsResult;

/// A record mirrored from the source-of-record service.
pub trait SyncRecord: Clone + Send + Sync + 'static {
    /// Identifier shared by the external source and the local store.
    fn record_id(&self) -> Uuid;

    /// Modification time reported by the external source.
    fn last_edited_at(&self) -> DateTime<Utc>;
}

/// A record whose arrival must be announced to people.
pub trait Notifiable: SyncRecord {
    fn notification_message(&self) -> String;
}

/// Local read replica for one entity type.
#[async_trait]
pub trait ProjectionRepository<E: SyncRecord>: TransactionManager {
    /// Insert-or-update every column keyed by [`SyncRecord::record_id`].
    async fn upsert(&self, tx: &mut Self::Tx, record: &E) -> OpsResult<()>;
}

#[async_trait]
pub trait NotificationRepository<E: Notifiable>: TransactionManager {
    /// Records not yet notified whose last edit happened before `edited_before`,
    /// oldest first, at most `limit` rows.
    async fn list_pending_notifications(
        &self,
        edited_before: DateTime<Utc>,
        limit: i64,
    ) -> OpsResult<Vec<E>>;

    /// Flag the record as announced, but only while it is still at `edited_at`.
    /// A record edited since it was listed stays pending and errors with `NotFound`.
    async fn mark_notified(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        edited_at: DateTime<Utc>,
    ) -> OpsResult<()>;
}
