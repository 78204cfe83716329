use async_trait::async_trait;
use uuid::Uuid;

use crate::absences::models::{Absence, AbsenceFilter};
use crate::projection::{NotificationRepository, ProjectionRepository};
use opsdash_common::error::OpsResult;

#[async_trait]
pub trait AbsenceRepository:
    ProjectionRepository<Absence> + NotificationRepository<Absence>
{
    async fn get_by_id(&self, id: Uuid) -> OpsResult<Option<Absence>>;

    /// Ordered by period start.
    async fn list(&self, filter: AbsenceFilter) -> OpsResult<Vec<Absence>>;
}
