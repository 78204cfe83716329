use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::projection::SyncRecord;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feedback {
    pub id: Uuid,
    pub text: String,
    pub feedback_type: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    /// Who the feedback is addressed to, e.g. client or team.
    pub direction: Option<String>,
    pub task_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub last_edited_at: DateTime<Utc>,
}

impl SyncRecord for Feedback {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn last_edited_at(&self) -> DateTime<Utc> {
        self.last_edited_at
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeedbackFilter {
    pub project_id: Option<Uuid>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
