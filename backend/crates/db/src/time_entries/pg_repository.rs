use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgConnection, PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::projection::ProjectionRepository;
use crate::time_entries::models::{TimeEntry, TimeEntryFilter};
use crate::time_entries::repositories::TimeEntryRepository;
use crate::transaction::{pg_transaction_manager, PgTx};
use opsdash_common::error::{OpsError, OpsResult};

const COLUMNS: &str = "id, task_id, employee_id, project_id, work_date, total_hours, \
     payable_hours, description, created_at, last_edited_at";

#[derive(Clone)]
pub struct PgTimeEntryRepository {
    pool: PgPool,
}

impl PgTimeEntryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_in(conn: &mut PgConnection, entry: &TimeEntry) -> OpsResult<()> {
        sqlx::query(
            "insert into time_entries
                (id, task_id, employee_id, project_id, work_date, total_hours, payable_hours,
                 description, created_at, last_edited_at, synced_at)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now())
             on conflict (id) do update set
                task_id = excluded.task_id,
                employee_id = excluded.employee_id,
                project_id = excluded.project_id,
                work_date = excluded.work_date,
                total_hours = excluded.total_hours,
                payable_hours = excluded.payable_hours,
                description = excluded.description,
                created_at = excluded.created_at,
                last_edited_at = excluded.last_edited_at,
                synced_at = now()",
        )
        .bind(entry.id)
        .bind(entry.task_id)
        .bind(entry.employee_id)
        .bind(entry.project_id)
        .bind(entry.work_date)
        .bind(entry.total_hours)
        .bind(entry.payable_hours)
        .bind(&entry.description)
        .bind(entry.created_at)
        .bind(entry.last_edited_at)
        .execute(conn)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))?;

        Ok(())
    }

    fn map_row(row: PgRow) -> TimeEntry {
        TimeEntry {
            id: row.get("id"),
            task_id: row.get("task_id"),
            employee_id: row.get("employee_id"),
            project_id: row.get("project_id"),
            work_date: row.get("work_date"),
            total_hours: row.get("total_hours"),
            payable_hours: row.get("payable_hours"),
            description: row.get("description"),
            created_at: row.get("created_at"),
            last_edited_at: row.get("last_edited_at"),
        }
    }

    fn push_conditions(qb: &mut QueryBuilder<'_, Postgres>, filter: &TimeEntryFilter) {
        if let Some(project_id) = filter.project_id {
            qb.push(" and project_id = ").push_bind(project_id);
        }
        if let Some(employee_id) = filter.employee_id {
            qb.push(" and employee_id = ").push_bind(employee_id);
        }
        if let Some(from) = filter.date_from {
            qb.push(" and work_date >= ").push_bind(from);
        }
        if let Some(to) = filter.date_to {
            qb.push(" and work_date <= ").push_bind(to);
        }
    }
}

pg_transaction_manager!(PgTimeEntryRepository);

#[async_trait]
impl ProjectionRepository<TimeEntry> for PgTimeEntryRepository {
    async fn upsert(&self, tx: &mut PgTx, record: &TimeEntry) -> OpsResult<()> {
        Self::upsert_in(&mut **tx, record).await
    }
}

#[async_trait]
impl TimeEntryRepository for PgTimeEntryRepository {
    async fn get_by_id(&self, id: Uuid) -> OpsResult<Option<TimeEntry>> {
        let row = sqlx::query(&format!("select {COLUMNS} from time_entries where id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| OpsError::Database(e.to_string()))?;

        Ok(row.map(Self::map_row))
    }

    async fn list(&self, filter: TimeEntryFilter) -> OpsResult<Vec<TimeEntry>> {
        let mut qb = QueryBuilder::new(format!("select {COLUMNS} from time_entries where true"));
        Self::push_conditions(&mut qb, &filter);

        qb.push(" order by work_date, id");
        qb.push(" limit ").push_bind(filter.limit.unwrap_or(500));
        qb.push(" offset ").push_bind(filter.offset.unwrap_or(0));

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OpsError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Self::map_row).collect())
    }

    async fn total_hours(&self, filter: TimeEntryFilter) -> OpsResult<f64> {
        let mut qb = QueryBuilder::new(
            "select coalesce(sum(total_hours), 0)::float8 as hours from time_entries where true",
        );
        Self::push_conditions(&mut qb, &filter);

        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| OpsError::Database(e.to_string()))?;

        Ok(row.get("hours"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_pool;
    use crate::transaction::TransactionManager;
    use chrono::{NaiveDate, TimeZone, Utc};

    async fn test_repo() -> Option<PgTimeEntryRepository> {
        Some(PgTimeEntryRepository::new(test_pool().await?))
    }

    fn entry(employee_id: Uuid, day: u32, hours: f64) -> TimeEntry {
        TimeEntry {
            id: Uuid::new_v4(),
            task_id: Some(Uuid::new_v4()),
            employee_id: Some(employee_id),
            project_id: None,
            work_date: NaiveDate::from_ymd_opt(2024, 6, day),
            total_hours: hours,
            payable_hours: hours,
            description: "code review".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 6, day, 18, 0, 0).unwrap(),
            last_edited_at: Utc.with_ymd_and_hms(2024, 6, day, 18, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn date_range_is_inclusive() {
        let Some(repo) = test_repo().await else {
            return;
        };
        let employee = Uuid::new_v4();
        let entries = [
            entry(employee, 3, 1.0),
            entry(employee, 4, 2.5),
            entry(employee, 5, 4.0),
            entry(employee, 6, 8.0),
        ];

        let mut tx = repo.begin().await.unwrap();
        for e in &entries {
            repo.upsert(&mut tx, e).await.unwrap();
        }
        repo.commit(tx).await.unwrap();

        let filter = TimeEntryFilter {
            employee_id: Some(employee),
            date_from: NaiveDate::from_ymd_opt(2024, 6, 4),
            date_to: NaiveDate::from_ymd_opt(2024, 6, 5),
            ..Default::default()
        };
        let found = repo.list(filter.clone()).await.unwrap();
        assert_eq!(
            found.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![entries[1].id, entries[2].id]
        );
        assert_eq!(repo.total_hours(filter).await.unwrap(), 6.5);
    }
}
