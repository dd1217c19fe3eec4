use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub mod notification_channel;
pub mod notification_event;
pub mod snapshot;
pub mod subject;

pub use notification_channel::*;
pub use notification_event::*;
pub use snapshot::*;
pub use subject::*;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum SubjectStatus {
    #[sqlx(rename = "active")]
    Active,
    #[sqlx(rename = "paused")]
    Paused,
    #[sqlx(rename = "error")]
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum NotificationMethod {
    #[sqlx(rename = "email")]
    Email,
    #[sqlx(rename = "telegram")]
    Telegram,
    #[sqlx(rename = "whatsapp")]
    Whatsapp,
    #[sqlx(rename = "sms")]
    Sms,
}

impl NotificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationMethod::Email => "email",
            NotificationMethod::Telegram => "telegram",
            NotificationMethod::Whatsapp => "whatsapp",
            NotificationMethod::Sms => "sms",
        }
    }
}

impl fmt::Display for NotificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Ok(NotificationMethod::Email),
            "telegram" => Ok(NotificationMethod::Telegram),
            "whatsapp" => Ok(NotificationMethod::Whatsapp),
            "sms" => Ok(NotificationMethod::Sms),
            other => Err(format!("unknown notification method '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum NotificationOutcome {
    #[sqlx(rename = "sent")]
    Sent,
    #[sqlx(rename = "failed")]
    Failed,
}

pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
