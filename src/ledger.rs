use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::database::{Store, SubjectUpdate};
use crate::dispatcher::Extraction;
use crate::models::{NewSnapshot, PriceSnapshot, Subject};
use crate::normalizer::round2;
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceStats {
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub first: Option<f64>,
    pub last: Option<f64>,
    pub change_absolute: f64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub subject: Subject,
    pub days: i64,
    pub snapshots: Vec<PriceSnapshot>,
    pub stats: PriceStats,
}

/// Statistics over an ascending price series.
pub fn compute_stats(prices: &[f64]) -> PriceStats {
    let (Some(&first), Some(&last)) = (prices.first(), prices.last()) else {
        return PriceStats::default();
    };

    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = prices.iter().sum::<f64>() / prices.len() as f64;

    let change_absolute = round2(last - first);
    let change_percent = if first != 0.0 {
        round2((last - first) / first * 100.0)
    } else {
        0.0
    };

    PriceStats {
        count: prices.len(),
        min: Some(min),
        max: Some(max),
        avg: Some(round2(avg)),
        first: Some(first),
        last: Some(last),
        change_absolute,
        change_percent,
    }
}

/// Append-only price history per subject.
#[derive(Clone)]
pub struct PriceLedger {
    store: Arc<dyn Store>,
}

impl PriceLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Writes the subject's new state and its snapshot in one transaction.
    pub async fn record(&self, subject_id: &str, extraction: &Extraction) -> Result<PriceSnapshot> {
        let now = Utc::now();
        let product = &extraction.product;

        let update = SubjectUpdate {
            subject_id: subject_id.to_string(),
            price: extraction.price,
            product_name: product
                .title
                .as_ref()
                .filter(|title| !title.trim().is_empty())
                .cloned(),
            product_image: product.image.clone(),
            discount_percent: product.discount_percent,
            original_price: product.original_price,
            checked_at: now,
        };
        let snapshot = NewSnapshot {
            subject_id: subject_id.to_string(),
            price: extraction.price,
            captured_at: now,
            extraction_method: extraction.method.to_string(),
            extraction_latency_ms: extraction.elapsed_ms as i64,
        };

        self.store.record_extraction(&update, &snapshot).await
    }

    /// The subject with its snapshots from the last `days` days.
    pub async fn history(&self, subject_id: &str, days: i64) -> Result<PriceHistory> {
        if days <= 0 {
            return Err(AppError::Validation(format!(
                "lookback must be at least one day, got {}",
                days
            )));
        }
        let since = Duration::try_days(days)
            .and_then(|lookback| Utc::now().checked_sub_signed(lookback))
            .ok_or_else(|| AppError::Validation(format!("lookback of {} days is out of range", days)))?;

        let subject = self
            .store
            .get_subject(subject_id)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource: format!("subject {}", subject_id),
            })?;
        let snapshots = self.store.snapshots_since(subject_id, since).await?;
        let prices: Vec<f64> = snapshots.iter().map(|s| s.price).collect();

        Ok(PriceHistory {
            subject,
            days,
            stats: compute_stats(&prices),
            snapshots,
        })
    }
}
