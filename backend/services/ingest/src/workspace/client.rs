use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use opsdash_common::error::OpsError;

use super::page::Page;

const DEFAULT_BASE_URL: &str = "https://api.notion.com/v1";
const DEFAULT_API_VERSION: &str = "2022-06-28";
const PAGE_SIZE: u64 = 100;

/// Database ids of the mirrored entity types and outbox targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseIds {
    pub clients: String,
    pub projects: String,
    pub tasks: String,
    pub time_entries: String,
    pub feedback: String,
    pub absences: String,
}

#[derive(Debug, Clone)]
pub struct WorkspaceClientConfig {
    pub base_url: String,
    pub token: String,
    pub api_version: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub databases: DatabaseIds,
}

impl WorkspaceClientConfig {
    /// Load workspace config from environment.
    ///
    /// Returns `Ok(None)` if `WORKSPACE_TOKEN` is not set.
    /// Returns `Err` if the token is set but a database id is missing.
    pub fn from_env() -> Result<Option<Self>, String> {
        let token = match std::env::var("WORKSPACE_TOKEN").ok() {
            Some(v) if !v.trim().is_empty() => v,
            _ => return Ok(None),
        };

        let databases = DatabaseIds {
            clients: required_db("WORKSPACE_DB_CLIENTS")?,
            projects: required_db("WORKSPACE_DB_PROJECTS")?,
            tasks: required_db("WORKSPACE_DB_TASKS")?,
            time_entries: required_db("WORKSPACE_DB_TIME_ENTRIES")?,
            feedback: required_db("WORKSPACE_DB_FEEDBACK")?,
            absences: required_db("WORKSPACE_DB_ABSENCES")?,
        };

        let base_url = std::env::var("WORKSPACE_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let api_version = std::env::var("WORKSPACE_API_VERSION")
            .unwrap_or_else(|_| DEFAULT_API_VERSION.to_string());
        let max_retries = std::env::var("WORKSPACE_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);
        let timeout_secs = std::env::var("WORKSPACE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Ok(Some(Self {
            base_url,
            token,
            api_version,
            max_retries,
            timeout_secs,
            databases,
        }))
    }
}

fn required_db(env_key: &str) -> Result<String, String> {
    match std::env::var(env_key) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(format!(
            "{env_key} is required when WORKSPACE_TOKEN is set, but not found"
        )),
    }
}

#[derive(Clone)]
pub struct WorkspaceClient {
    client: Client,
    config: WorkspaceClientConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceClientError {
    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl From<WorkspaceClientError> for OpsError {
    fn from(err: WorkspaceClientError) -> Self {
        match &err {
            WorkspaceClientError::HttpError { status, .. }
                if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN =>
            {
                OpsError::Config(format!("workspace rejected credentials: {err}"))
            }
            WorkspaceClientError::HttpError { status, .. }
                if matches!(
                    *status,
                    StatusCode::BAD_REQUEST
                        | StatusCode::NOT_FOUND
                        | StatusCode::CONFLICT
                        | StatusCode::UNPROCESSABLE_ENTITY
                ) =>
            {
                OpsError::Validation(format!("workspace refused request: {err}"))
            }
            _ => OpsError::Upstream(err.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<Page>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedPage {
    id: Uuid,
}

impl WorkspaceClient {
    pub fn new(config: WorkspaceClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// For testing: create a client pointing at a specific base URL (e.g., wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    pub fn databases(&self) -> &DatabaseIds {
        &self.config.databases
    }

    /// Run a database query and follow `next_cursor` until the last page.
    pub async fn query_database(
        &self,
        database_id: &str,
        query: &Value,
    ) -> Result<Vec<Page>, WorkspaceClientError> {
        let url = format!("{}/databases/{}/query", self.config.base_url, database_id);
        let mut cursor: Option<String> = None;
        let mut pages = Vec::new();

        loop {
            let mut body = query.clone();
            if let Value::Object(map) = &mut body {
                map.insert("page_size".into(), Value::from(PAGE_SIZE));
                if let Some(c) = &cursor {
                    map.insert("start_cursor".into(), Value::from(c.as_str()));
                }
            }

            let response: QueryResponse = self.request_with_retry(&url, &body).await?;
            pages.extend(response.results);

            match response.next_cursor {
                Some(next) if response.has_more => cursor = Some(next),
                _ => break,
            }
        }

        tracing::debug!(database_id, pages = pages.len(), "database query finished");
        Ok(pages)
    }

    /// Create a page in `database_id` and return the new page id.
    pub async fn create_page(
        &self,
        database_id: &str,
        properties: Value,
    ) -> Result<Uuid, WorkspaceClientError> {
        let url = format!("{}/pages", self.config.base_url);
        let body = serde_json::json!({
            "parent": { "type": "database_id", "database_id": database_id },
            "properties": properties,
        });

        let created: CreatedPage = self.request_with_retry(&url, &body).await?;
        Ok(created.id)
    }

    async fn request_with_retry<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &Value,
    ) -> Result<T, WorkspaceClientError> {
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff_secs = retry_backoff_secs(attempt);
                tracing::warn!(attempt, backoff_secs, "retrying after backoff");
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            }

            let response = match self
                .client
                .post(url)
                .bearer_auth(&self.config.token)
                .header("Notion-Version", &self.config.api_version)
                .json(body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() || e.is_connect() {
                        continue;
                    }
                    return Err(WorkspaceClientError::RequestError(e));
                }
            };

            let status = response.status();

            if status.is_success() {
                return response
                    .json::<T>()
                    .await
                    .map_err(WorkspaceClientError::RequestError);
            }

            // Honor Retry-After header for 429
            if status == StatusCode::TOO_MANY_REQUESTS {
                if let Some(retry_after) = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                {
                    let wait = std::cmp::min(retry_after, 60);
                    tracing::warn!(wait, "rate-limited, waiting Retry-After");
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                last_error = "429 Too Many Requests".to_string();
                continue;
            }

            if status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                last_error = format!("{status}: {body}");
                continue;
            }

            // Fail fast on 4xx (except 429 handled above)
            let body = response.text().await.unwrap_or_default();
            return Err(WorkspaceClientError::HttpError { status, body });
        }

        Err(WorkspaceClientError::MaxRetriesExceeded {
            attempts: self.config.max_retries + 1,
            last_error,
        })
    }
}

/// Exponential backoff capped at 30 s.
fn retry_backoff_secs(attempt: u32) -> u64 {
    1u64.checked_shl(attempt).unwrap_or(u64::MAX).min(30)
}
