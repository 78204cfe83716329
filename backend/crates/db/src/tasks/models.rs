use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::projection::SyncRecord;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub project_id: Option<Uuid>,
    pub executor_id: Option<Uuid>,
    pub responsible_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    /// Planned effort in hours.
    pub estimate: Option<f64>,
    pub tags: Vec<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_edited_at: DateTime<Utc>,
}

impl SyncRecord for Task {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn last_edited_at(&self) -> DateTime<Utc> {
        self.last_edited_at
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub project_id: Option<Uuid>,
    pub executor_id: Option<Uuid>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
