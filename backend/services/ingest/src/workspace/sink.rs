use async_trait::async_trait;
use chrono::SecondsFormat;
use serde_json::{json, Value};

use opsdash_common::error::OpsResult;
use opsdash_db::outbox::models::{TaskCreation, TimeWriteOff};
use opsdash_sync::WriteSink;

use super::client::WorkspaceClient;

/// Status given to tasks created from the outbox.
const NEW_TASK_STATUS: &str = "Можно делать";

/// Creates queued tasks as rows of the tasks database.
#[derive(Clone)]
pub struct TaskCreationSink {
    client: WorkspaceClient,
    database_id: String,
}

impl TaskCreationSink {
    pub fn new(client: WorkspaceClient, database_id: impl Into<String>) -> Self {
        Self {
            client,
            database_id: database_id.into(),
        }
    }
}

#[async_trait]
impl WriteSink<TaskCreation> for TaskCreationSink {
    async fn replay(&self, payload: &TaskCreation) -> OpsResult<()> {
        let page_id = self
            .client
            .create_page(&self.database_id, task_properties(payload))
            .await?;
        tracing::info!(%page_id, title = %payload.title, "task created in workspace");
        Ok(())
    }
}

/// Writes queued time write-offs as rows of the time database.
#[derive(Clone)]
pub struct TimeWriteOffSink {
    client: WorkspaceClient,
    database_id: String,
}

impl TimeWriteOffSink {
    pub fn new(client: WorkspaceClient, database_id: impl Into<String>) -> Self {
        Self {
            client,
            database_id: database_id.into(),
        }
    }
}

#[async_trait]
impl WriteSink<TimeWriteOff> for TimeWriteOffSink {
    async fn replay(&self, payload: &TimeWriteOff) -> OpsResult<()> {
        let page_id = self
            .client
            .create_page(&self.database_id, time_properties(payload))
            .await?;
        tracing::info!(
            %page_id,
            task_id = %payload.task_id,
            hours = payload.billable_hours(),
            "time written off in workspace"
        );
        Ok(())
    }
}

fn title(text: &str) -> Value {
    json!({
        "type": "title",
        "title": [{ "type": "text", "text": { "content": text } }],
    })
}

fn people(id: uuid::Uuid) -> Value {
    json!({ "type": "people", "people": [{ "object": "user", "id": id }] })
}

pub(crate) fn task_properties(task: &TaskCreation) -> Value {
    let mut props = json!({
        "Task": title(&task.title),
        "Статус": { "type": "status", "status": { "name": NEW_TASK_STATUS } },
        "Теги": {
            "type": "multi_select",
            "multi_select": task.tags.iter().map(|t| json!({ "name": t })).collect::<Vec<_>>(),
        },
        "Исполнитель": people(task.executor_id),
        "Ответственный": people(task.executor_id),
        "Продукт": { "type": "relation", "relation": [{ "id": task.project_id }] },
    });

    if let Value::Object(map) = &mut props {
        if let Some(estimate) = task.estimate {
            map.insert(
                "Оценка".into(),
                json!({ "type": "number", "number": estimate }),
            );
        }
        if let Some(priority) = &task.priority {
            map.insert(
                "Приоритет".into(),
                json!({ "type": "select", "select": { "name": priority } }),
            );
        }
        if let Some(start) = task.deadline_start {
            let end = task
                .deadline_end
                .map(|e| e.to_rfc3339_opts(SecondsFormat::Secs, true));
            map.insert(
                "Дедлайн".into(),
                json!({
                    "type": "date",
                    "date": {
                        "start": start.to_rfc3339_opts(SecondsFormat::Secs, true),
                        "end": end,
                    },
                }),
            );
        }
    }

    props
}

pub(crate) fn time_properties(write_off: &TimeWriteOff) -> Value {
    json!({
        "Затрачено ч.": { "type": "number", "number": write_off.billable_hours() },
        "Задача": { "type": "relation", "relation": [{ "id": write_off.task_id }] },
        "Что делали": title(&write_off.description),
        "Дата работ": {
            "type": "date",
            "date": { "start": write_off.work_date.format("%Y-%m-%d").to_string() },
        },
        "Исполнитель": people(write_off.employee_id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::client::{DatabaseIds, WorkspaceClientConfig};
    use chrono::{NaiveDate, TimeZone, Utc};
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> WorkspaceClient {
        let config = WorkspaceClientConfig {
            base_url: "http://localhost".to_string(),
            token: "tok".to_string(),
            api_version: "2022-06-28".to_string(),
            max_retries: 0,
            timeout_secs: 5,
            databases: DatabaseIds {
                clients: "c".into(),
                projects: "p".into(),
                tasks: "db-tasks".into(),
                time_entries: "db-time".into(),
                feedback: "f".into(),
                absences: "a".into(),
            },
        };
        WorkspaceClient::new(config)
            .unwrap()
            .with_base_url(&server.uri())
    }

    fn task() -> TaskCreation {
        TaskCreation {
            title: "Prepare release notes".to_string(),
            project_id: Uuid::new_v4(),
            executor_id: Uuid::new_v4(),
            estimate: Some(2.0),
            priority: None,
            tags: vec!["docs".to_string()],
            deadline_start: Some(Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()),
            deadline_end: None,
        }
    }

    fn write_off() -> TimeWriteOff {
        TimeWriteOff {
            task_id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            duration_secs: 50 * 60,
            description: "pairing".to_string(),
            work_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
        }
    }

    #[test]
    fn task_properties_include_only_present_optionals() {
        let payload = task();
        let props = task_properties(&payload);

        assert_eq!(props["Task"]["title"][0]["text"]["content"], "Prepare release notes");
        assert_eq!(props["Статус"]["status"]["name"], NEW_TASK_STATUS);
        assert_eq!(props["Оценка"]["number"], 2.0);
        assert!(props.get("Приоритет").is_none());
        assert_eq!(props["Теги"]["multi_select"][0]["name"], "docs");
        assert_eq!(props["Дедлайн"]["date"]["start"], "2024-03-04T09:00:00Z");
        assert!(props["Дедлайн"]["date"]["end"].is_null());
        assert_eq!(
            props["Продукт"]["relation"][0]["id"],
            payload.project_id.to_string()
        );
    }

    #[test]
    fn time_properties_round_to_quarter_hours() {
        let props = time_properties(&write_off());
        assert_eq!(props["Затрачено ч."]["number"], 1.0);
        assert_eq!(props["Дата работ"]["date"]["start"], "2024-03-04");
        assert_eq!(props["Что делали"]["title"][0]["text"]["content"], "pairing");
    }

    #[tokio::test]
    async fn task_sink_creates_page_in_tasks_database() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/pages"))
            .and(body_partial_json(json!({
                "parent": { "database_id": "db-tasks" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": Uuid::new_v4() })))
            .expect(1)
            .mount(&server)
            .await;

        let sink = TaskCreationSink::new(client(&server), "db-tasks");
        sink.replay(&task()).await.unwrap();
    }

    #[tokio::test]
    async fn time_sink_surfaces_rejection() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/pages"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad relation"))
            .expect(1)
            .mount(&server)
            .await;

        let sink = TimeWriteOffSink::new(client(&server), "db-time");
        let err = sink.replay(&write_off()).await.unwrap_err();
        assert!(err.to_string().contains("bad relation"), "got: {err}");
        assert!(err.is_rejection());
    }
}
