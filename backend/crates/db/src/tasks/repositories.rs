use async_trait::async_trait;
use uuid::Uuid;

use crate::projection::ProjectionRepository;
use crate::tasks::models::{Task, TaskFilter};
use opsdash_common::error::OpsResult;

#[async_trait]
pub trait TaskRepository: ProjectionRepository<Task> {
    async fn get_by_id(&self, id: Uuid) -> OpsResult<Option<Task>>;

    /// Newest edits first.
    async fn list(&self, filter: TaskFilter) -> OpsResult<Vec<Task>>;
}
