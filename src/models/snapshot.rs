use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One ledger entry. Never updated once written.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct PriceSnapshot {
    pub id: i64,
    pub subject_id: String,
    pub price: f64,
    pub captured_at: DateTime<Utc>,
    pub extraction_method: String,
    pub extraction_latency_ms: i64,
}

#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub subject_id: String,
    pub price: f64,
    pub captured_at: DateTime<Utc>,
    pub extraction_method: String,
    pub extraction_latency_ms: i64,
}
