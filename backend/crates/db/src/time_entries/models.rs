use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::projection::SyncRecord;

/// Hours an employee logged against a task on one day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeEntry {
    pub id: Uuid,
    pub task_id: Option<Uuid>,
    pub employee_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub work_date: Option<NaiveDate>,
    pub total_hours: f64,
    /// Portion billed to the client.
    pub payable_hours: f64,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub last_edited_at: DateTime<Utc>,
}

impl SyncRecord for TimeEntry {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn last_edited_at(&self) -> DateTime<Utc> {
        self.last_edited_at
    }
}

/// `date_from` and `date_to` are both inclusive.
#[derive(Debug, Clone, Default)]
pub struct TimeEntryFilter {
    pub project_id: Option<Uuid>,
    pub employee_id: Option<Uuid>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
