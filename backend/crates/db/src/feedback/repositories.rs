use async_trait::async_trait;
use uuid::Uuid;

use crate::feedback::models::{Feedback, FeedbackFilter};
use crate::projection::ProjectionRepository;
use opsdash_common::error::OpsResult;

#[async_trait]
pub trait FeedbackRepository: ProjectionRepository<Feedback> {
    async fn get_by_id(&self, id: Uuid) -> OpsResult<Option<Feedback>>;
    async fn list(&self, filter: FeedbackFilter) -> OpsResult<Vec<Feedback>>;
}
