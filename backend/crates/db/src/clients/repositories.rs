use async_trait::async_trait;
use uuid::Uuid;

use crate::clients::models::{Client, ClientFilter};
use crate::projection::ProjectionRepository;
use opsdash_common::error::OpsResult;

#[async_trait]
pub trait ClientRepository: ProjectionRepository<Client> {
    async fn get_by_id(&self, id: Uuid) -> OpsResult<Option<Client>>;
    async fn list(&self, filter: ClientFilter) -> OpsResult<Vec<Client>>;
}
