use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgConnection, PgPool, QueryBuilder, Row};
use uuid::Uuid;

use crate::projection::ProjectionRepository;
use crate::tasks::models::{Task, TaskFilter};
use crate::tasks::repositories::TaskRepository;
use crate::transaction::{pg_transaction_manager, PgTx};
use opsdash_common::error::{OpsError, OpsResult};

const COLUMNS: &str = "id, title, status, priority, project_id, executor_id, responsible_id, \
     parent_id, estimate, tags, start_at, end_at, created_at, last_edited_at";

#[derive(Clone)]
pub struct PgTaskRepository {
    pool: PgPool,
}

impl PgTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_in(conn: &mut PgConnection, task: &Task) -> OpsResult<()> {
        sqlx::query(
            "insert into tasks
                (id, title, status, priority, project_id, executor_id, responsible_id, parent_id,
                 estimate, tags, start_at, end_at, created_at, last_edited_at, synced_at)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, now())
             on conflict (id) do update set
                title = excluded.title,
                status = excluded.status,
                priority = excluded.priority,
                project_id = excluded.project_id,
                executor_id = excluded.executor_id,
                responsible_id = excluded.responsible_id,
                parent_id = excluded.parent_id,
                estimate = excluded.estimate,
                tags = excluded.tags,
                start_at = excluded.start_at,
                end_at = excluded.end_at,
                created_at = excluded.created_at,
                last_edited_at = excluded.last_edited_at,
                synced_at = now()",
        )
        .bind(task.id)
        .bind(&task.title)
        .bind(&task.status)
        .bind(&task.priority)
        .bind(task.project_id)
        .bind(task.executor_id)
        .bind(task.responsible_id)
        .bind(task.parent_id)
        .bind(task.estimate)
        .bind(&task.tags)
        .bind(task.start_at)
        .bind(task.end_at)
        .bind(task.created_at)
        .bind(task.last_edited_at)
        .execute(conn)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))?;

        Ok(())
    }

    fn map_row(row: PgRow) -> Task {
        Task {
            id: row.get("id"),
            title: row.get("title"),
            status: row.get("status"),
            priority: row.get("priority"),
            project_id: row.get("project_id"),
            executor_id: row.get("executor_id"),
            responsible_id: row.get("responsible_id"),
            parent_id: row.get("parent_id"),
            estimate: row.get("estimate"),
            tags: row.get("tags"),
            start_at: row.get("start_at"),
            end_at: row.get("end_at"),
            created_at: row.get("created_at"),
            last_edited_at: row.get("last_edited_at"),
        }
    }
}

pg_transaction_manager!(PgTaskRepository);

#[async_trait]
impl ProjectionRepository<Task> for PgTaskRepository {
    async fn upsert(&self, tx: &mut PgTx, record: &Task) -> OpsResult<()> {
        Self::upsert_in(&mut **tx, record).await
    }
}

#[async_trait]
impl TaskRepository for PgTaskRepository {
    async fn get_by_id(&self, id: Uuid) -> OpsResult<Option<Task>> {
        let row = sqlx::query(&format!("select {COLUMNS} from tasks where id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| OpsError::Database(e.to_string()))?;

        Ok(row.map(Self::map_row))
    }

    async fn list(&self, filter: TaskFilter) -> OpsResult<Vec<Task>> {
        let mut qb = QueryBuilder::new(format!("select {COLUMNS} from tasks where true"));

        if let Some(project_id) = filter.project_id {
            qb.push(" and project_id = ").push_bind(project_id);
        }
        if let Some(executor_id) = filter.executor_id {
            qb.push(" and executor_id = ").push_bind(executor_id);
        }
        if let Some(status) = filter.status {
            qb.push(" and status = ").push_bind(status);
        }

        qb.push(" order by last_edited_at desc, id");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_pool;
    use crate::transaction::TransactionManager;
    use chrono::{TimeZone, Utc};

    async fn test_repo() -> Option<PgTaskRepository> {
        Some(PgTaskRepository::new(test_pool().await?))
    }

    fn task(project_id: Uuid, executor_id: Uuid, status: &str) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: "Wire up invoices".to_string(),
            status: Some(status.to_string()),
            priority: Some("Medium".to_string()),
            project_id: Some(project_id),
            executor_id: Some(executor_id),
            responsible_id: None,
            parent_id: None,
            estimate: Some(2.5),
            tags: vec!["Backend".to_string(), "Billing".to_string()],
            start_at: Some(Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap()),
            end_at: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            last_edited_at: Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn upsert_keeps_tags_and_overwrites_fields() {
        let Some(repo) = test_repo().await else {
            return;
        };
        let mut t = task(Uuid::new_v4(), Uuid::new_v4(), "To do");

        let mut tx = repo.begin().await.unwrap();
        repo.upsert(&mut tx, &t).await.unwrap();
        repo.commit(tx).await.unwrap();

        t.status = Some("Done".to_string());
        t.tags = vec!["Frontend".to_string()];
        let mut tx = repo.begin().await.unwrap();
        repo.upsert(&mut tx, &t).await.unwrap();
        repo.commit(tx).await.unwrap();

        assert_eq!(repo.get_by_id(t.id).await.unwrap(), Some(t));
    }

    #[tokio::test]
    async fn list_combines_filters() {
        let Some(repo) = test_repo().await else {
            return;
        };
        let project = Uuid::new_v4();
        let executor = Uuid::new_v4();
        let open = task(project, executor, "In progress");
        let done = task(project, executor, "Done");
        let elsewhere = task(Uuid::new_v4(), executor, "In progress");

        let mut tx = repo.begin().await.unwrap();
        for t in [&open, &done, &elsewhere] {
            repo.upsert(&mut tx, t).await.unwrap();
        }
        repo.commit(tx).await.unwrap();

        let found = repo
            .list(TaskFilter {
                project_id: Some(project),
                executor_id: Some(executor),
                status: Some("In progress".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, open.id);
    }
}
