use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgConnection, PgPool, QueryBuilder, Row};
use uuid::Uuid;

use crate::absences::models::{Absence, AbsenceCategory, AbsenceFilter};
use crate::absences::repositories::AbsenceRepository;
use crate::projection::{NotificationRepository, ProjectionRepository};
use crate::transaction::{pg_transaction_manager, PgTx};
use opsdash_common::error::{OpsError, OpsResult};

const COLUMNS: &str = "id, employee_id, employee_name, category, period_start, period_end, \
     reason, created_at, last_edited_at, notified";

#[derive(Clone)]
pub struct PgAbsenceRepository {
    pool: PgPool,
}

impl PgAbsenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert keyed by id. The stored `notified` flag survives a re-pull with an
    /// unchanged edit time and is replaced by the incoming one otherwise.
    pub async fn upsert_in(conn: &mut PgConnection, absence: &Absence) -> OpsResult<()> {
        sqlx::query(
            "insert into absences
                (id, employee_id, employee_name, category, period_start, period_end, reason,
                 created_at, last_edited_at, notified, synced_at)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now())
             on conflict (id) do update set
                employee_id = excluded.employee_id,
                employee_name = excluded.employee_name,
                category = excluded.category,
                period_start = excluded.period_start,
                period_end = excluded.period_end,
                reason = excluded.reason,
                created_at = excluded.created_at,
                last_edited_at = excluded.last_edited_at,
                notified = case
                    when excluded.last_edited_at is distinct from absences.last_edited_at
                    then excluded.notified
                    else absences.notified
                end,
                synced_at = now()",
        )
        .bind(absence.id)
        .bind(absence.employee_id)
        .bind(&absence.employee_name)
        .bind(absence.category.as_str())
        .bind(absence.period_start)
        .bind(absence.period_end)
        .bind(&absence.reason)
        .bind(absence.created_at)
        .bind(absence.last_edited_at)
        .bind(absence.notified)
        .execute(conn)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))?;

        Ok(())
    }

    fn map_row(row: PgRow) -> OpsResult<Absence> {
        let category_raw: String = row.get("category");
        let category = AbsenceCategory::from_str(&category_raw).map_err(OpsError::Internal)?;

        Ok(Absence {
            id: row.get("id"),
            employee_id: row.get("employee_id"),
            employee_name: row.get("employee_name"),
            category,
            period_start: row.get("period_start"),
            period_end: row.get("period_end"),
            reason: row.get("reason"),
            created_at: row.get("created_at"),
            last_edited_at: row.get("last_edited_at"),
            notified: row.get("notified"),
        })
    }
}

pg_transaction_manager!(PgAbsenceRepository);

#[async_trait]
impl ProjectionRepository<Absence> for PgAbsenceRepository {
    async fn upsert(&self, tx: &mut PgTx, record: &Absence) -> OpsResult<()> {
        Self::upsert_in(&mut **tx, record).await
    }
}

#[async_trait]
impl NotificationRepository<Absence> for PgAbsenceRepository {
    async fn list_pending_notifications(
        &self,
        edited_before: DateTime<Utc>,
        limit: i64,
    ) -> OpsResult<Vec<Absence>> {
        let rows = sqlx::query(&format!(
            "select {COLUMNS} from absences
             where not notified and last_edited_at < $1
             order by last_edited_at, id
             limit $2"
        ))
        .bind(edited_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_row).collect()
    }

    async fn mark_notified(
        &self,
        tx: &mut PgTx,
        id: Uuid,
        edited_at: DateTime<Utc>,
    ) -> OpsResult<()> {
        let result = sqlx::query(
            "update absences set notified = true where id = $1 and last_edited_at = $2",
        )
        .bind(id)
        .bind(edited_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(OpsError::NotFound(format!(
                "absence {id} not found as edited at {edited_at}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AbsenceRepository for PgAbsenceRepository {
    async fn get_by_id(&self, id: Uuid) -> OpsResult<Option<Absence>> {
        let row = sqlx::query(&format!("select {COLUMNS} from absences where id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| OpsError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn list(&self, filter: AbsenceFilter) -> OpsResult<Vec<Absence>> {
        let mut qb = QueryBuilder::new(format!("select {COLUMNS} from absences where true"));

        if let Some(employee_id) = filter.employee_id {
            qb.push(" and employee_id = ").push_bind(employee_id);
        }
        if let Some(to) = filter.to {
            qb.push(" and period_start <= ").push_bind(to);
        }
        if let Some(from) = filter.from {
            qb.push(" and coalesce(period_end, period_start) >= ")
                .push_bind(from);
        }
        if let Some(notified) = filter.notified {
            qb.push(" and notified = ").push_bind(notified);
        }

        qb.push(" order by period_start, id");
        qb.push(" limit ").push_bind(filter.limit.unwrap_or(100));

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OpsError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_row).collect()
    }
}
