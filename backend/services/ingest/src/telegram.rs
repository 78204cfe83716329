use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use opsdash_common::error::{OpsError, OpsResult};
use opsdash_sync::NotificationChannel;

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub base_url: String,
    pub bot_token: String,
    pub timeout_secs: u64,
}

impl TelegramConfig {
    /// Returns `None` if `TELEGRAM_BOT_TOKEN` is not set.
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|v| !v.trim().is_empty())?;
        let base_url = std::env::var("TELEGRAM_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let timeout_secs = std::env::var("TELEGRAM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Some(Self {
            base_url,
            bot_token,
            timeout_secs,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("HTTP {status}: {description}")]
    HttpError {
        status: StatusCode,
        description: String,
    },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),
}

impl From<TelegramError> for OpsError {
    fn from(err: TelegramError) -> Self {
        OpsError::Notification(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends plain-text messages through the bot API. Recipients are chat ids
/// or `@channel` usernames.
#[derive(Clone)]
pub struct TelegramChannel {
    client: Client,
    config: TelegramConfig,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), TelegramError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.base_url, self.config.bot_token
        );

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: Option<ApiResponse> = serde_json::from_str(&body).ok();

        match parsed {
            Some(ApiResponse { ok: true, .. }) if status.is_success() => Ok(()),
            Some(ApiResponse { description, .. }) => Err(TelegramError::HttpError {
                status,
                description: description.unwrap_or(body),
            }),
            None => Err(TelegramError::HttpError {
                status,
                description: body,
            }),
        }
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    async fn send(&self, recipient: &str, message: &str) -> OpsResult<()> {
        self.send_message(recipient, message).await?;
        Ok(())
    }
}
