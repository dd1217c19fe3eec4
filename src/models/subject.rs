use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::{generate_id, SubjectStatus};

/// A monitored product page.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Subject {
    pub id: String,
    pub url: String,
    pub product_name: String,
    pub target_price: f64,
    pub target_discount_percent: Option<f64>,
    pub status: SubjectStatus,

    // Written by the extraction cycle only
    pub current_price: Option<f64>,
    pub product_image: Option<String>,
    pub discount_percent: Option<f64>,
    pub original_price: Option<f64>,
    pub last_checked: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewSubject {
    #[validate(url)]
    pub url: String,
    #[validate(length(max = 500))]
    pub product_name: Option<String>,
    #[validate(range(min = 0.01))]
    pub target_price: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub target_discount_percent: Option<f64>,
}

impl Subject {
    pub fn new(new_subject: NewSubject) -> Self {
        Self {
            id: generate_id(),
            product_name: new_subject
                .product_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| new_subject.url.clone()),
            url: new_subject.url,
            target_price: new_subject.target_price,
            target_discount_percent: new_subject.target_discount_percent,
            status: SubjectStatus::Active,
            current_price: None,
            product_image: None,
            discount_percent: None,
            original_price: None,
            last_checked: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_at_or_below_target(&self) -> bool {
        matches!(self.current_price, Some(price) if price <= self.target_price)
    }
}
