use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio_retry::Retry;

use super::{http_client, is_retryable, not_configured, retry_delays, DEFAULT_RETRIES};
use crate::config::TelegramConfig;
use crate::models::NotificationMethod;
use crate::plugins::traits::{NotificationResult, NotifierPlugin, PriceAlert};
use crate::utils::error::AppError;

/// Bot API `sendMessage`; the channel's contact info is the chat id.
pub struct TelegramNotifier {
    config: Option<TelegramConfig>,
    client: Client,
    retries: usize,
}

impl TelegramNotifier {
    pub fn new(config: Option<TelegramConfig>) -> Result<Self, AppError> {
        Ok(Self {
            config,
            client: http_client()?,
            retries: DEFAULT_RETRIES,
        })
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }
}

#[async_trait]
impl NotifierPlugin for TelegramNotifier {
    fn method(&self) -> NotificationMethod {
        NotificationMethod::Telegram
    }

    fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    async fn notify(&self, contact: &str, alert: &PriceAlert) -> Result<NotificationResult, AppError> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| not_configured("telegram", "bot token"))?;

        let url = format!(
            "{}/bot{}/sendMessage",
            config.api_base.trim_end_matches('/'),
            config.bot_token
        );
        let payload = json!({
            "chat_id": contact,
            "text": alert.telegram_text(),
            "parse_mode": "HTML",
        });

        let client = &self.client;
        let (url, payload) = (url.as_str(), &payload);
        let response = Retry::spawn(retry_delays(self.retries), move || async move {
            let response = client.post(url).json(payload).send().await?;
            if is_retryable(response.status()) {
                return Err(AppError::Plugin {
                    plugin_type: "telegram".to_string(),
                    message: format!("HTTP {}", response.status().as_u16()),
                });
            }
            Ok::<_, AppError>(response)
        })
        .await?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if status == StatusCode::OK {
            let message_id = body
                .pointer("/result/message_id")
                .map(|id| id.to_string());
            Ok(NotificationResult::delivered(message_id))
        } else {
            let description = body
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            Ok(NotificationResult::rejected(format!(
                "HTTP {}: {}",
                status.as_u16(),
                description
            )))
        }
    }
}
