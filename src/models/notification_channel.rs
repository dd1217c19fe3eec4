use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::{generate_id, NotificationMethod};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct NotificationChannel {
    pub id: String,
    pub subject_id: String,
    pub method: NotificationMethod,
    /// Address, chat id or phone number depending on `method`.
    pub contact_info: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewNotificationChannel {
    #[validate(length(min = 1))]
    pub subject_id: String,
    pub method: NotificationMethod,
    #[validate(length(min = 3, max = 255))]
    pub contact_info: String,
}

impl NotificationChannel {
    pub fn new(new_channel: NewNotificationChannel) -> Self {
        Self {
            id: generate_id(),
            subject_id: new_channel.subject_id,
            method: new_channel.method,
            contact_info: new_channel.contact_info.trim().to_string(),
            is_active: true,
            created_at: Utc::now(),
        }
    }
}
