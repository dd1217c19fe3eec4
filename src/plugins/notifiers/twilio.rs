use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio_retry::Retry;

use super::{http_client, is_retryable, not_configured, retry_delays, DEFAULT_RETRIES};
use crate::config::TwilioConfig;
use crate::models::NotificationMethod;
use crate::plugins::traits::{NotificationResult, NotifierPlugin, PriceAlert};
use crate::utils::error::AppError;

/// Twilio Messages API, used for both SMS and WhatsApp.
pub struct TwilioNotifier {
    config: Option<TwilioConfig>,
    method: NotificationMethod,
    client: Client,
    retries: usize,
}

impl TwilioNotifier {
    pub fn sms(config: Option<TwilioConfig>) -> Result<Self, AppError> {
        Self::build(config, NotificationMethod::Sms)
    }

    pub fn whatsapp(config: Option<TwilioConfig>) -> Result<Self, AppError> {
        Self::build(config, NotificationMethod::Whatsapp)
    }

    fn build(config: Option<TwilioConfig>, method: NotificationMethod) -> Result<Self, AppError> {
        Ok(Self {
            config,
            method,
            client: http_client()?,
            retries: DEFAULT_RETRIES,
        })
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    fn sender<'a>(&self, config: &'a TwilioConfig) -> Option<&'a str> {
        match self.method {
            NotificationMethod::Whatsapp => config.whatsapp_from.as_deref(),
            _ => config.sms_from.as_deref(),
        }
    }

    /// (From, To, Body) form fields.
    fn addressing(&self, from: &str, to: &str, alert: &PriceAlert) -> (String, String, String) {
        match self.method {
            NotificationMethod::Whatsapp => (
                whatsapp_address(from),
                whatsapp_address(to),
                alert.plain_text(),
            ),
            _ => (from.to_string(), to.to_string(), alert.short_text()),
        }
    }
}

fn whatsapp_address(number: &str) -> String {
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{}", number)
    }
}

#[async_trait]
impl NotifierPlugin for TwilioNotifier {
    fn method(&self) -> NotificationMethod {
        self.method
    }

    fn is_configured(&self) -> bool {
        self.config
            .as_ref()
            .is_some_and(|config| self.sender(config).is_some())
    }

    async fn notify(&self, contact: &str, alert: &PriceAlert) -> Result<NotificationResult, AppError> {
        let method = self.method.as_str();
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| not_configured(method, "Twilio account"))?;
        let from = self
            .sender(config)
            .ok_or_else(|| not_configured(method, "sender number"))?;

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            config.api_base.trim_end_matches('/'),
            config.account_sid
        );
        let (from, to, body) = self.addressing(from, contact, alert);
        let form = [("From", from), ("To", to), ("Body", body)];

        let client = &self.client;
        let (url, form) = (url.as_str(), &form);
        let response = Retry::spawn(retry_delays(self.retries), move || async move {
            let response = client
                .post(url)
                .basic_auth(&config.account_sid, Some(&config.auth_token))
                .form(form)
                .send()
                .await?;
            if is_retryable(response.status()) {
                return Err(AppError::Plugin {
                    plugin_type: method.to_string(),
                    message: format!("HTTP {}", response.status().as_u16()),
                });
            }
            Ok::<_, AppError>(response)
        })
        .await?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if status == StatusCode::CREATED {
            let sid = body.get("sid").and_then(Value::as_str).map(str::to_string);
            Ok(NotificationResult::delivered(sid))
        } else {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("no message");
            Ok(NotificationResult::rejected(format!("HTTP {}: {}", status.as_u16(), message)))
        }
    }
}
