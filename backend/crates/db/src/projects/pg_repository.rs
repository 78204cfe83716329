use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgConnection, PgPool, QueryBuilder, Row};
use uuid::Uuid;

use crate::projection::ProjectionRepository;
use crate::projects::models::{Project, ProjectFilter};
use crate::projects::repositories::ProjectRepository;
use crate::transaction::{pg_transaction_manager, PgTx};
use opsdash_common::error::{OpsError, OpsResult};

const COLUMNS: &str =
    "id, name, status, project_type, manager_id, sheets_link, created_at, last_edited_at";

#[derive(Clone)]
pub struct PgProjectRepository {
    pool: PgPool,
}

impl PgProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_in(conn: &mut PgConnection, project: &Project) -> OpsResult<()> {
        sqlx::query(
            "insert into projects
                (id, name, status, project_type, manager_id, sheets_link, created_at, last_edited_at, synced_at)
             values ($1, $2, $3, $4, $5, $6, $7, $8, now())
             on conflict (id) do update set
                name = excluded.name,
                status = excluded.status,
                project_type = excluded.project_type,
                manager_id = excluded.manager_id,
                sheets_link = excluded.sheets_link,
                created_at = excluded.created_at,
                last_edited_at = excluded.last_edited_at,
                synced_at = now()",
        )
        .bind(project.id)
        .bind(&project.name)
        .bind(&project.status)
        .bind(&project.project_type)
        .bind(project.manager_id)
        .bind(&project.sheets_link)
        .bind(project.created_at)
        .bind(project.last_edited_at)
        .execute(conn)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))?;

        Ok(())
    }

    fn map_row(row: PgRow) -> Project {
        Project {
            id: row.get("id"),
            name: row.get("name"),
            status: row.get("status"),
            project_type: row.get("project_type"),
            manager_id: row.get("manager_id"),
            sheets_link: row.get("sheets_link"),
            created_at: row.get("created_at"),
            last_edited_at: row.get("last_edited_at"),
        }
    }
}

pg_transaction_manager!(PgProjectRepository);

#[async_trait]
impl ProjectionRepository<Project> for PgProjectRepository {
    async fn upsert(&self, tx: &mut PgTx, record: &Project) -> OpsResult<()> {
        Self::upsert_in(&mut **tx, record).await
    }
}

#[async_trait]
impl ProjectRepository for PgProjectRepository {
    async fn get_by_id(&self, id: Uuid) -> OpsResult<Option<Project>> {
        let row = sqlx::query(&format!("select {COLUMNS} from projects where id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| OpsError::Database(e.to_string()))?;

        Ok(row.map(Self::map_row))
    }

    async fn list(&self, filter: ProjectFilter) -> OpsResult<Vec<Project>> {
        let mut qb = QueryBuilder::new(format!("select {COLUMNS} from projects where true"));

        if let Some(status) = filter.status {
            qb.push(" and status = ").push_bind(status);
        }
        if let Some(manager_id) = filter.manager_id {
            qb.push(" and manager_id = ").push_bind(manager_id);
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
