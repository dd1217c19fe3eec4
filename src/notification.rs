//! Edge-triggered price alerts: a subject fires once when its price moves
//! from above the target to at or below it, and re-arms once it goes back up.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::database::Store;
use crate::models::{NotificationChannel, NotificationEvent};
use crate::plugins::{PluginManager, PriceAlert};
use crate::utils::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceMovement {
    Fell,
    Rose,
    Unchanged,
    FirstReading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "movement")]
pub enum CrossingDecision {
    /// Crossed from above the target (or first reading) to at/below it.
    Fire,
    StillAbove(PriceMovement),
    /// Already at or below the target on the previous reading.
    AlreadyBelow,
}

impl CrossingDecision {
    pub fn fires(&self) -> bool {
        matches!(self, CrossingDecision::Fire)
    }
}

pub fn evaluate_crossing(old_price: Option<f64>, new_price: f64, target: f64) -> CrossingDecision {
    if new_price <= target {
        return match old_price {
            Some(old) if old <= target => CrossingDecision::AlreadyBelow,
            _ => CrossingDecision::Fire,
        };
    }

    let movement = match old_price {
        None => PriceMovement::FirstReading,
        Some(old) if new_price < old => PriceMovement::Fell,
        Some(old) if new_price > old => PriceMovement::Rose,
        Some(_) => PriceMovement::Unchanged,
    };
    CrossingDecision::StillAbove(movement)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Fans an alert out to every active channel of its subject.
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn Store>,
    plugins: PluginManager,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn Store>, plugins: PluginManager) -> Self {
        Self { store, plugins }
    }

    async fn deliver(&self, channel: &NotificationChannel, alert: &PriceAlert) -> NotificationEvent {
        let failed = |error: String| {
            NotificationEvent::failed(
                &alert.subject_id,
                channel.method,
                alert.old_price,
                alert.new_price,
                error,
            )
        };

        let Some(notifier) = self.plugins.notifier(channel.method).await else {
            return failed(format!("no notifier registered for {}", channel.method));
        };

        match notifier.notify(&channel.contact_info, alert).await {
            Ok(result) if result.success => NotificationEvent::sent(
                &alert.subject_id,
                channel.method,
                alert.old_price,
                alert.new_price,
            ),
            Ok(result) => failed(result.error.unwrap_or_else(|| "rejected".to_string())),
            Err(e) => failed(e.to_string()),
        }
    }

    /// Every attempt is logged, successful or not. A failed log write is
    /// reported and does not abort the remaining ones.
    pub async fn dispatch(&self, alert: &PriceAlert) -> Result<DispatchSummary> {
        let channels = self.store.active_channels(&alert.subject_id).await?;
        if channels.is_empty() {
            info!("Subject {} crossed its target but has no active channels", alert.subject_id);
            return Ok(DispatchSummary::default());
        }

        let events = join_all(channels.iter().map(|channel| self.deliver(channel, alert))).await;

        let mut summary = DispatchSummary {
            attempted: events.len(),
            ..DispatchSummary::default()
        };
        for event in &events {
            match &event.error_message {
                None => {
                    summary.sent += 1;
                    info!("Sent {} alert for subject {}", event.method, event.subject_id);
                }
                Some(error) => {
                    summary.failed += 1;
                    warn!(
                        "Failed to send {} alert for subject {}: {}",
                        event.method, event.subject_id, error
                    );
                }
            }
            if let Err(e) = self.store.log_notification(event).await {
                warn!("Could not log notification for subject {}: {}", event.subject_id, e);
            }
        }

        metrics::counter!("sentinel_notifications_sent_total").increment(summary.sent as u64);
        Ok(summary)
    }
}
