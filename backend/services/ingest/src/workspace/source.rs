use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use opsdash_common::error::OpsResult;
use opsdash_db::projection::SyncRecord;
use opsdash_sync::{Boundary, ChangeSource};

use super::client::WorkspaceClient;
use super::mapping::FromPage;
use super::query;

/// Lists changed rows of one workspace database as projection records.
pub struct WorkspaceSource<E> {
    client: WorkspaceClient,
    database_id: String,
    _record: PhantomData<fn() -> E>,
}

impl<E> WorkspaceSource<E> {
    pub fn new(client: WorkspaceClient, database_id: impl Into<String>) -> Self {
        Self {
            client,
            database_id: database_id.into(),
            _record: PhantomData,
        }
    }
}

#[async_trait]
impl<E> ChangeSource<E> for WorkspaceSource<E>
where
    E: SyncRecord + FromPage,
{
    async fn list_changed(&self, since: DateTime<Utc>, boundary: Boundary) -> OpsResult<Vec<E>> {
        let body = query::changed_since(since, boundary);
        let pages = self.client.query_database(&self.database_id, &body).await?;

        let mut records = Vec::with_capacity(pages.len());
        for page in &pages {
            match E::from_page(page) {
                Ok(record) => records.push(record),
                // An unreadable row is skipped; fixing it in the workspace re-edits it.
                Err(e) => tracing::warn!(
                    database_id = %self.database_id,
                    page_id = %page.id,
                    error = %e,
                    "skipping page that cannot be mapped"
                ),
            }
        }

        Ok(records)
    }
}
