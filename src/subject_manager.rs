use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::database::Store;
use crate::dispatcher::{Extraction, ExtractionDispatcher, ExtractionReport};
use crate::ledger::PriceLedger;
use crate::models::{PriceSnapshot, Subject};
use crate::notification::{evaluate_crossing, CrossingDecision, DispatchSummary, NotificationDispatcher};
use crate::plugins::PriceAlert;
use crate::utils::error::{AppError, Result};

/// Result of one successful check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub subject_id: String,
    pub previous_price: Option<f64>,
    pub report: ExtractionReport,
    pub snapshot: PriceSnapshot,
    pub decision: CrossingDecision,
    pub notifications: DispatchSummary,
}

/// One extraction cycle for one subject: extract, record, evaluate, notify.
/// Shared by the batch and the on-demand check so a crossing seen by either
/// path is handled the same way.
#[derive(Clone)]
pub struct SubjectManager {
    store: Arc<dyn Store>,
    dispatcher: ExtractionDispatcher,
    ledger: PriceLedger,
    notifications: NotificationDispatcher,
}

impl SubjectManager {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: ExtractionDispatcher,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            ledger: PriceLedger::new(store.clone()),
            store,
            dispatcher,
            notifications,
        }
    }

    pub fn ledger(&self) -> &PriceLedger {
        &self.ledger
    }

    pub async fn check_by_id(&self, subject_id: &str) -> Result<CheckOutcome> {
        let subject = self
            .store
            .get_subject(subject_id)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource: format!("subject {}", subject_id),
            })?;
        self.check_subject(&subject).await
    }

    /// On extraction failure the subject is flagged `error` (a paused subject
    /// stays paused) and the failure is returned; nothing else is written.
    pub async fn check_subject(&self, subject: &Subject) -> Result<CheckOutcome> {
        debug!("Checking subject {} ({})", subject.id, subject.url);

        let extraction = match self.dispatcher.extract(&subject.id, &subject.url).await {
            Ok(extraction) => extraction,
            Err(e) => {
                error!("Extraction failed for subject {}: {}", subject.id, e);
                if let Err(mark_err) = self.store.mark_error(&subject.id, Utc::now()).await {
                    error!("Could not flag subject {} as failed: {}", subject.id, mark_err);
                }
                return Err(e);
            }
        };

        // Concurrent checks may have moved the price since the batch listed
        // this subject; compare against what is stored now.
        let current = self
            .store
            .get_subject(&subject.id)
            .await?
            .unwrap_or_else(|| subject.clone());
        let previous_price = current.current_price;

        let snapshot = self.ledger.record(&subject.id, &extraction).await?;
        let decision = evaluate_crossing(previous_price, extraction.price, current.target_price);
        let notifications = self.act_on(&current, &extraction, previous_price, decision).await?;

        Ok(CheckOutcome {
            subject_id: subject.id.clone(),
            previous_price,
            report: ExtractionReport::from_extraction(&extraction),
            snapshot,
            decision,
            notifications,
        })
    }

    async fn act_on(
        &self,
        subject: &Subject,
        extraction: &Extraction,
        previous_price: Option<f64>,
        decision: CrossingDecision,
    ) -> Result<DispatchSummary> {
        match decision {
            CrossingDecision::Fire => {
                info!(
                    "Subject {} crossed its target: {:.2} <= {:.2}",
                    subject.id, extraction.price, subject.target_price
                );
                let alert = PriceAlert {
                    subject_id: subject.id.clone(),
                    product_name: extraction
                        .product
                        .title
                        .clone()
                        .unwrap_or_else(|| subject.product_name.clone()),
                    url: subject.url.clone(),
                    old_price: previous_price.unwrap_or(extraction.price),
                    new_price: extraction.price,
                    target_price: subject.target_price,
                };
                self.notifications.dispatch(&alert).await
            }
            CrossingDecision::StillAbove(movement) => {
                info!(
                    "Subject {} still above target ({:?}): {:.2} > {:.2}",
                    subject.id, movement, extraction.price, subject.target_price
                );
                Ok(DispatchSummary::default())
            }
            CrossingDecision::AlreadyBelow => {
                info!(
                    "Subject {} already at or below target, alert was sent earlier",
                    subject.id
                );
                Ok(DispatchSummary::default())
            }
        }
    }
}
