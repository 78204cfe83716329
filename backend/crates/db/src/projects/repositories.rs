use async_trait::async_trait;
use uuid::Uuid;

use crate::projection::ProjectionRepository;
use crate::projects::models::{Project, ProjectFilter};
use opsdash_common::error::OpsResult;

#[async_trait]
pub trait ProjectRepository: ProjectionRepository<Project> {
    async fn get_by_id(&self, id: Uuid) -> OpsResult<Option<Project>>;
    async fn list(&self, filter: ProjectFilter) -> OpsResult<Vec<Project>>;
}
