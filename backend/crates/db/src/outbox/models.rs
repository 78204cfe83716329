use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A write type that can be queued in its own outbox table.
pub trait OutboxPayload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Name used in logs and as the drain loop's identity.
    const WRITE_TYPE: &'static str;
    const TABLE: &'static str;
}

/// A pending write. Its existence means the external write is not yet confirmed.
#[derive(Debug, Clone)]
pub struct OutboxItem<P> {
    pub id: i64,
    pub payload: P,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What happened to a row after a failed replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Still pending; it will be retried on a later cycle.
    Retry { attempts: i32 },
    /// Parked after exhausting its attempts; no longer fetched.
    DeadLettered { attempts: i32 },
}

/// A task created locally (dashboard form or chat bot) that must appear in the workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCreation {
    pub title: String,
    pub project_id: Uuid,
    pub executor_id: Uuid,
    pub estimate: Option<f64>,
    pub priority: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub deadline_start: Option<DateTime<Utc>>,
    pub deadline_end: Option<DateTime<Utc>>,
}

impl OutboxPayload for TaskCreation {
    const WRITE_TYPE: &'static str = "task_creation";
    const TABLE: &'static str = "task_outbox";
}

/// Time logged against a task that must be written off in the workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWriteOff {
    pub task_id: Uuid,
    pub employee_id: Uuid,
    pub duration_secs: i64,
    pub description: String,
    pub work_date: NaiveDate,
}

impl TimeWriteOff {
    /// Hours to book, rounded up to the next quarter hour.
    pub fn billable_hours(&self) -> f64 {
        let hours = self.duration_secs.max(0) as f64 / 3600.0;
        (hours / 0.25).ceil() * 0.25
    }
}

impl OutboxPayload for TimeWriteOff {
    const WRITE_TYPE: &'static str = "time_write_off";
    const TABLE: &'static str = "time_outbox";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_off(duration_secs: i64) -> TimeWriteOff {
        TimeWriteOff {
            task_id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            duration_secs,
            description: "review".to_string(),
            work_date: NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
        }
    }

    #[test]
    fn billable_hours_rounds_up_to_quarter() {
        assert_eq!(write_off(60).billable_hours(), 0.25);
        assert_eq!(write_off(15 * 60).billable_hours(), 0.25);
        assert_eq!(write_off(16 * 60).billable_hours(), 0.5);
        assert_eq!(write_off(3600).billable_hours(), 1.0);
        assert_eq!(write_off(3601).billable_hours(), 1.25);
    }

    #[test]
    fn billable_hours_zero_for_empty_or_negative() {
        assert_eq!(write_off(0).billable_hours(), 0.0);
        assert_eq!(write_off(-30).billable_hours(), 0.0);
    }

    #[test]
    fn task_creation_tags_default_to_empty() {
        let json = serde_json::json!({
            "title": "Fix login",
            "project_id": Uuid::nil(),
            "executor_id": Uuid::nil(),
            "estimate": 2.0,
            "priority": null,
            "deadline_start": null,
            "deadline_end": null
        });
        let payload: TaskCreation = serde_json::from_value(json).unwrap();
        assert!(payload.tags.is_empty());
        assert_eq!(payload.estimate, Some(2.0));
    }
}
