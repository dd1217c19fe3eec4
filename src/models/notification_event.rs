use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::{generate_id, NotificationMethod, NotificationOutcome};

/// Log row for one delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct NotificationEvent {
    pub id: String,
    pub subject_id: String,
    pub method: NotificationMethod,
    pub old_price: f64,
    pub new_price: f64,
    pub outcome: NotificationOutcome,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn sent(subject_id: &str, method: NotificationMethod, old_price: f64, new_price: f64) -> Self {
        Self::build(subject_id, method, old_price, new_price, NotificationOutcome::Sent, None)
    }

    pub fn failed(
        subject_id: &str,
        method: NotificationMethod,
        old_price: f64,
        new_price: f64,
        error: impl Into<String>,
    ) -> Self {
        Self::build(
            subject_id,
            method,
            old_price,
            new_price,
            NotificationOutcome::Failed,
            Some(error.into()),
        )
    }

    fn build(
        subject_id: &str,
        method: NotificationMethod,
        old_price: f64,
        new_price: f64,
        outcome: NotificationOutcome,
        error_message: Option<String>,
    ) -> Self {
        Self {
            id: generate_id(),
            subject_id: subject_id.to_string(),
            method,
            old_price,
            new_price,
            outcome,
            error_message,
            created_at: Utc::now(),
        }
    }
}
