use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgConnection, PgPool, QueryBuilder, Row};
use uuid::Uuid;

use crate::feedback::models::{Feedback, FeedbackFilter};
use crate::feedback::repositories::FeedbackRepository;
use crate::projection::ProjectionRepository;
use crate::transaction::{pg_transaction_manager, PgTx};
use opsdash_common::error::{OpsError, OpsResult};

const COLUMNS: &str = "id, text, feedback_type, priority, status, direction, task_id, project_id, \
     created_at, last_edited_at";

#[derive(Clone)]
pub struct PgFeedbackRepository {
    pool: PgPool,
}

impl PgFeedbackRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_in(conn: &mut PgConnection, feedback: &Feedback) -> OpsResult<()> {
        sqlx::query(
            "insert into feedback
                (id, text, feedback_type, priority, status, direction, task_id, project_id,
                 created_at, last_edited_at, synced_at)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now())
             on conflict (id) do update set
                text = excluded.text,
                feedback_type = excluded.feedback_type,
                priority = excluded.priority,
                status = excluded.status,
                direction = excluded.direction,
                task_id = excluded.task_id,
                project_id = excluded.project_id,
                created_at = excluded.created_at,
                last_edited_at = excluded.last_edited_at,
                synced_at = now()",
        )
        .bind(feedback.id)
        .bind(&feedback.text)
        .bind(&feedback.feedback_type)
        .bind(&feedback.priority)
        .bind(&feedback.status)
        .bind(&feedback.direction)
        .bind(feedback.task_id)
        .bind(feedback.project_id)
        .bind(feedback.created_at)
        .bind(feedback.last_edited_at)
        .execute(conn)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))?;

        Ok(())
    }

    fn map_row(row: PgRow) -> Feedback {
        Feedback {
            id: row.get("id"),
            text: row.get("text"),
            feedback_type: row.get("feedback_type"),
            priority: row.get("priority"),
            status: row.get("status"),
            direction: row.get("direction"),
            task_id: row.get("task_id"),
            project_id: row.get("project_id"),
            created_at: row.get("created_at"),
            last_edited_at: row.get("last_edited_at"),
        }
    }
}

pg_transaction_manager!(PgFeedbackRepository);

#[async_trait]
impl ProjectionRepository<Feedback> for PgFeedbackRepository {
    async fn upsert(&self, tx: &mut PgTx, record: &Feedback) -> OpsResult<()> {
        Self::upsert_in(&mut **tx, record).await
    }
}

#[async_trait]
impl FeedbackRepository for PgFeedbackRepository {
    async fn get_by_id(&self, id: Uuid) -> OpsResult<Option<Feedback>> {
        let row = sqlx::query(&format!("select {COLUMNS} from feedback where id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| OpsError::Database(e.to_string()))?;

        Ok(row.map(Self::map_row))
    }

    async fn list(&self, filter: FeedbackFilter) -> OpsResult<Vec<Feedback>> {
        let mut qb = QueryBuilder::new(format!("select {COLUMNS} from feedback where true"));

        if let Some(project_id) = filter.project_id {
            qb.push(" and project_id = ").push_bind(project_id);
        }
        if let Some(status) = filter.status {
            qb.push(" and status = ").push_bind(status);
        }

        qb.push(" order by created_at desc, id");
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
