use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::projection::SyncRecord;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub status: Option<String>,
    pub project_type: Option<String>,
    pub manager_id: Option<Uuid>,
    /// Link to the project's reporting spreadsheet.
    pub sheets_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_edited_at: DateTime<Utc>,
}

impl SyncRecord for Project {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn last_edited_at(&self) -> DateTime<Utc> {
        self.last_edited_at
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub status: Option<String>,
    pub manager_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
