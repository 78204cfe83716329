use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgConnection, PgPool, QueryBuilder, Row};
use uuid::Uuid;

use crate::clients::models::{Client, ClientFilter, ClientStatus};
use crate::clients::repositories::ClientRepository;
use crate::projection::ProjectionRepository;
use crate::transaction::{pg_transaction_manager, PgTx};
use opsdash_common::error::{OpsError, OpsResult};

const COLUMNS: &str =
    "id, name, status, source, unique_number, project_ids, created_at, last_edited_at";

#[derive(Clone)]
pub struct PgClientRepository {
    pool: PgPool,
}

impl PgClientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_in(conn: &mut PgConnection, client: &Client) -> OpsResult<()> {
        sqlx::query(
            "insert into clients
                (id, name, status, source, unique_number, project_ids, created_at, last_edited_at, synced_at)
             values ($1, $2, $3, $4, $5, $6, $7, $8, now())
             on conflict (id) do update set
                name = excluded.name,
                status = excluded.status,
                source = excluded.source,
                unique_number = excluded.unique_number,
                project_ids = excluded.project_ids,
                created_at = excluded.created_at,
                last_edited_at = excluded.last_edited_at,
                synced_at = now()",
        )
        .bind(client.id)
        .bind(&client.name)
        .bind(client.status.as_str())
        .bind(&client.source)
        .bind(client.unique_number)
        .bind(&client.project_ids)
        .bind(client.created_at)
        .bind(client.last_edited_at)
        .execute(conn)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))?;

        Ok(())
    }

    fn map_row(row: PgRow) -> Client {
        let status: String = row.get("status");
        Client {
            id: row.get("id"),
            name: row.get("name"),
            status: ClientStatus::from_label(&status),
            source: row.get("source"),
            unique_number: row.get("unique_number"),
            project_ids: row.get("project_ids"),
            created_at: row.get("created_at"),
            last_edited_at: row.get("last_edited_at"),
        }
    }
}

pg_transaction_manager!(PgClientRepository);

#[async_trait]
impl ProjectionRepository<Client> for PgClientRepository {
    async fn upsert(&self, tx: &mut PgTx, record: &Client) -> OpsResult<()> {
        Self::upsert_in(&mut **tx, record).await
    }
}

#[async_trait]
impl ClientRepository for PgClientRepository {
    async fn get_by_id(&self, id: Uuid) -> OpsResult<Option<Client>> {
        let row = sqlx::query(&format!("select {COLUMNS} from clients where id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| OpsError::Database(e.to_string()))?;

        Ok(row.map(Self::map_row))
    }

    async fn list(&self, filter: ClientFilter) -> OpsResult<Vec<Client>> {
        let mut qb = QueryBuilder::new(format!("select {COLUMNS} from clients where true"));

        if let Some(status) = &filter.status {
            qb.push(" and status = ").push_bind(status.as_str().to_string());
        }

        qb.push(" order by name");
        qb.push(" limit ").push_bind(filter.limit.unwrap_or(100));
        qb.push(" offset ").push_bind(filter.offset.unwrap_or(0));

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OpsError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Self::map_row).collect())
    }
}
