use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::models::{
    NewSnapshot, NotificationChannel, NotificationEvent, PriceSnapshot, Subject, SubjectStatus,
};
use crate::utils::error::{AppError, Result};

/// Fields a successful extraction writes back onto its subject.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectUpdate {
    pub subject_id: String,
    pub price: f64,
    pub product_name: Option<String>,
    pub product_image: Option<String>,
    pub discount_percent: Option<f64>,
    pub original_price: Option<f64>,
    pub checked_at: DateTime<Utc>,
}

/// Storage handle injected into the engine. The engine never deletes subjects
/// and never touches a snapshot after writing it.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_subject(&self, subject: &Subject) -> Result<()>;
    async fn get_subject(&self, id: &str) -> Result<Option<Subject>>;
    /// Active subjects, least recently checked first, never-checked ones leading.
    async fn list_active_subjects(&self) -> Result<Vec<Subject>>;

    /// Applies `update` and appends `snapshot` atomically, reactivating the
    /// subject unless it is paused. The stored
    /// `captured_at` is clamped so it never precedes the subject's latest
    /// snapshot.
    async fn record_extraction(
        &self,
        update: &SubjectUpdate,
        snapshot: &NewSnapshot,
    ) -> Result<PriceSnapshot>;
    /// Flags a failed check. Like `record_extraction`, it leaves a paused
    /// subject paused.
    async fn mark_error(&self, subject_id: &str, checked_at: DateTime<Utc>) -> Result<()>;

    async fn snapshots_since(
        &self,
        subject_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PriceSnapshot>>;

    async fn insert_channel(&self, channel: &NotificationChannel) -> Result<()>;
    async fn active_channels(&self, subject_id: &str) -> Result<Vec<NotificationChannel>>;
    async fn log_notification(&self, event: &NotificationEvent) -> Result<()>;
    async fn notification_events(&self, subject_id: &str) -> Result<Vec<NotificationEvent>>;
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to an in-memory database sees its own empty db.
        let in_memory = config.url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.acquire_timeout));
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
        };

        let pool = pool_options.connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;

        tracing::info!("Connected to database {}", config.url);
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: 5,
        })
        .await
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_subject(&self, subject: &Subject) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO subjects
               (id, url, product_name, target_price, target_discount_percent, status,
                current_price, product_image, discount_percent, original_price, last_checked, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&subject.id)
        .bind(&subject.url)
        .bind(&subject.product_name)
        .bind(subject.target_price)
        .bind(subject.target_discount_percent)
        .bind(subject.status)
        .bind(subject.current_price)
        .bind(&subject.product_image)
        .bind(subject.discount_percent)
        .bind(subject.original_price)
        .bind(subject.last_checked)
        .bind(subject.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_subject(&self, id: &str) -> Result<Option<Subject>> {
        let subject = sqlx::query_as::<_, Subject>("SELECT * FROM subjects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(subject)
    }

    async fn list_active_subjects(&self) -> Result<Vec<Subject>> {
        let subjects = sqlx::query_as::<_, Subject>(
            r#"SELECT * FROM subjects
               WHERE status = ?
               ORDER BY last_checked IS NOT NULL, last_checked ASC, created_at ASC"#,
        )
        .bind(SubjectStatus::Active)
        .fetch_all(&self.pool)
        .await?;
        Ok(subjects)
    }

    async fn record_extraction(
        &self,
        update: &SubjectUpdate,
        snapshot: &NewSnapshot,
    ) -> Result<PriceSnapshot> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"UPDATE subjects
               SET current_price = ?,
                   product_name = COALESCE(?, product_name),
                   product_image = COALESCE(?, product_image),
                   discount_percent = ?,
                   original_price = ?,
                   last_checked = ?,
                   status = CASE WHEN status = ? THEN status ELSE ? END
               WHERE id = ?"#,
        )
        .bind(update.price)
        .bind(&update.product_name)
        .bind(&update.product_image)
        .bind(update.discount_percent)
        .bind(update.original_price)
        .bind(update.checked_at)
        .bind(SubjectStatus::Paused)
        .bind(SubjectStatus::Active)
        .bind(&update.subject_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound {
                resource: format!("subject {}", update.subject_id),
            });
        }

        let latest: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT captured_at FROM price_snapshots WHERE subject_id = ? ORDER BY captured_at DESC LIMIT 1",
        )
        .bind(&snapshot.subject_id)
        .fetch_optional(&mut *tx)
        .await?;
        let captured_at = match latest {
            Some(latest) if latest > snapshot.captured_at => latest,
            _ => snapshot.captured_at,
        };

        let id = sqlx::query(
            r#"INSERT INTO price_snapshots
               (subject_id, price, captured_at, extraction_method, extraction_latency_ms)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&snapshot.subject_id)
        .bind(snapshot.price)
        .bind(captured_at)
        .bind(&snapshot.extraction_method)
        .bind(snapshot.extraction_latency_ms)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;

        Ok(PriceSnapshot {
            id,
            subject_id: snapshot.subject_id.clone(),
            price: snapshot.price,
            captured_at,
            extraction_method: snapshot.extraction_method.clone(),
            extraction_latency_ms: snapshot.extraction_latency_ms,
        })
    }

    async fn mark_error(&self, subject_id: &str, checked_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"UPDATE subjects
               SET status = CASE WHEN status = ? THEN status ELSE ? END,
                   last_checked = ?
               WHERE id = ?"#,
        )
        .bind(SubjectStatus::Paused)
        .bind(SubjectStatus::Error)
        .bind(checked_at)
        .bind(subject_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn snapshots_since(
        &self,
        subject_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PriceSnapshot>> {
        let snapshots = sqlx::query_as::<_, PriceSnapshot>(
            r#"SELECT * FROM price_snapshots
               WHERE subject_id = ? AND captured_at >= ?
               ORDER BY captured_at ASC, id ASC"#,
        )
        .bind(subject_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(snapshots)
    }

    async fn insert_channel(&self, channel: &NotificationChannel) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO notification_channels
               (id, subject_id, method, contact_info, is_active, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&channel.id)
        .bind(&channel.subject_id)
        .bind(channel.method)
        .bind(&channel.contact_info)
        .bind(channel.is_active)
        .bind(channel.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn active_channels(&self, subject_id: &str) -> Result<Vec<NotificationChannel>> {
        let channels = sqlx::query_as::<_, NotificationChannel>(
            r#"SELECT * FROM notification_channels
               WHERE subject_id = ? AND is_active = 1
               ORDER BY created_at ASC"#,
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(channels)
    }

    async fn log_notification(&self, event: &NotificationEvent) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO notification_events
               (id, subject_id, method, old_price, new_price, outcome, error_message, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&event.id)
        .bind(&event.subject_id)
        .bind(event.method)
        .bind(event.old_price)
        .bind(event.new_price)
        .bind(event.outcome)
        .bind(&event.error_message)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn notification_events(&self, subject_id: &str) -> Result<Vec<NotificationEvent>> {
        let events = sqlx::query_as::<_, NotificationEvent>(
            "SELECT * FROM notification_events WHERE subject_id = ? ORDER BY created_at ASC",
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }
}
