use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::SchedulerConfig;
use crate::database::Store;
use crate::subject_manager::SubjectManager;
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectFailure {
    pub subject_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub processed: usize,
    pub errors: usize,
    pub notifications_sent: usize,
    pub failures: Vec<SubjectFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batch finished at {}", self.finished_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(f, "  Subjects:           {}", self.total)?;
        writeln!(f, "  Processed:          {}", self.processed)?;
        writeln!(f, "  Errors:             {}", self.errors)?;
        writeln!(f, "  Notifications sent: {}", self.notifications_sent)?;
        write!(f, "  Duration:           {:.1}s", self.duration_ms as f64 / 1000.0)?;
        for failure in &self.failures {
            write!(f, "\n  - {}: {}", failure.subject_id, failure.error)?;
        }
        Ok(())
    }
}

fn scheduler_error(err: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("scheduler: {}", err))
}

/// Runs every active subject through one check, one subject at a time.
pub struct BatchScheduler {
    store: Arc<dyn Store>,
    manager: SubjectManager,
    config: SchedulerConfig,
    running: Mutex<()>,
}

impl BatchScheduler {
    pub fn new(store: Arc<dyn Store>, manager: SubjectManager, config: SchedulerConfig) -> Self {
        Self {
            store,
            manager,
            config,
            running: Mutex::new(()),
        }
    }

    /// A failing subject never aborts the batch; only failing to list the
    /// subjects does.
    pub async fn run_batch(&self) -> Result<BatchSummary> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let subjects = self.store.list_active_subjects().await?;
        let delay = Duration::from_millis(self.config.subject_delay_ms);

        tracing::info!("Starting batch over {} active subjects", subjects.len());

        let mut processed = 0;
        let mut notifications_sent = 0;
        let mut failures = Vec::new();

        for (index, subject) in subjects.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            metrics::counter!("sentinel_subjects_checked_total").increment(1);
            match self.manager.check_subject(subject).await {
                Ok(outcome) => {
                    processed += 1;
                    notifications_sent += outcome.notifications.sent;
                    metrics::counter!("sentinel_subjects_processed_total").increment(1);
                    tracing::info!(
                        "Subject {} checked: {:.2} via {}",
                        subject.id,
                        outcome.snapshot.price,
                        outcome.snapshot.extraction_method
                    );
                }
                Err(e) => {
                    metrics::counter!("sentinel_subject_errors_total").increment(1);
                    failures.push(SubjectFailure {
                        subject_id: subject.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let summary = BatchSummary {
            total: subjects.len(),
            processed,
            errors: failures.len(),
            notifications_sent,
            failures,
            started_at,
            finished_at: Utc::now(),
            duration_ms: clock.elapsed().as_millis() as u64,
        };
        tracing::info!(
            "Batch finished: {}/{} processed, {} errors, {} notifications in {}ms",
            summary.processed,
            summary.total,
            summary.errors,
            summary.notifications_sent,
            summary.duration_ms
        );
        Ok(summary)
    }

    /// `None` when another batch from this process is still running.
    pub async fn try_run_batch(&self) -> Option<Result<BatchSummary>> {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::warn!("Previous batch still running, skipping this tick");
            return None;
        };
        Some(self.run_batch().await)
    }

    /// Runs batches on the configured cron schedule until Ctrl-C.
    pub async fn watch(self: Arc<Self>) -> Result<()> {
        let mut scheduler = JobScheduler::new().await.map_err(scheduler_error)?;

        let batch = Arc::clone(&self);
        let job = Job::new_async(self.config.cron.as_str(), move |_uuid, _lock| {
            let batch = Arc::clone(&batch);
            Box::pin(async move {
                if let Some(Err(e)) = batch.try_run_batch().await {
                    tracing::error!("Scheduled batch failed: {}", e);
                }
            })
        })
        .map_err(scheduler_error)?;

        scheduler.add(job).await.map_err(scheduler_error)?;
        scheduler.start().await.map_err(scheduler_error)?;
        tracing::info!("Watching with schedule '{}'", self.config.cron);

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down scheduler");
        scheduler.shutdown().await.map_err(scheduler_error)?;
        Ok(())
    }
}
