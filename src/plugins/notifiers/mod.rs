pub mod email;
pub mod telegram;
pub mod twilio;

pub use email::EmailNotifier;
pub use telegram::TelegramNotifier;
pub use twilio::TwilioNotifier;

use reqwest::StatusCode;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};

use crate::utils::error::AppError;

pub(crate) const DEFAULT_RETRIES: usize = 3;

/// 200ms, 400ms, 800ms... capped at 5s, jittered.
pub(crate) fn retry_delays(retries: usize) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(100)
        .max_delay(Duration::from_secs(5))
        .map(jitter)
        .take(retries)
}

pub(crate) fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

pub(crate) fn http_client() -> Result<reqwest::Client, AppError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()?)
}

pub(crate) fn not_configured(method: &str, what: &str) -> AppError {
    AppError::Plugin {
        plugin_type: method.to_string(),
        message: format!("{} not configured", what),
    }
}
