use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::projection::SyncRecord;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientStatus {
    Active,
    Paused,
    Done,
    /// Any status label the workspace adds later.
    Other(String),
}

impl ClientStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "Active",
            Self::Paused => "Paused",
            Self::Done => "Done",
            Self::Other(label) => label,
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label {
            "Active" => Self::Active,
            "Paused" => Self::Paused,
            "Done" => Self::Done,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub status: ClientStatus,
    /// Acquisition channel.
    pub source: Option<String>,
    pub unique_number: Option<i64>,
    pub project_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub last_edited_at: DateTime<Utc>,
}

impl SyncRecord for Client {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn last_edited_at(&self) -> DateTime<Utc> {
        self.last_edited_at
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientFilter {
    pub status: Option<ClientStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
