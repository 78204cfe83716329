use async_trait::async_trait;
use uuid::Uuid;

use crate::projection::ProjectionRepository;
use crate::time_entries::models::{TimeEntry, TimeEntryFilter};
use opsdash_common::error::OpsResult;

#[async_trait]
pub trait TimeEntryRepository: ProjectionRepository<TimeEntry> {
    async fn get_by_id(&self, id: Uuid) -> OpsResult<Option<TimeEntry>>;
    async fn list(&self, filter: TimeEntryFilter) -> OpsResult<Vec<TimeEntry>>;

    /// Sum of `total_hours` over the entries matching `filter` (limit/offset ignored).
    async fn total_hours(&self, filter: TimeEntryFilter) -> OpsResult<f64>;
}
