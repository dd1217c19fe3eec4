// Shared fixtures for the integration tests: an in-memory store, scripted
// strategies and a notifier that records what it was asked to send.

pub mod batch_tests;
pub mod notification_tests;
pub mod workflow_tests;

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use price_sentinel::{
    config::{
        AppConfig, BrowserConfig, DatabaseConfig, LoggingConfig, MetricsConfig, NotificationsConfig,
        SchedulerConfig, ScraperConfig, SitesConfig,
    },
    database::{SqliteStore, Store},
    dispatcher::ExtractionDispatcher,
    models::{NewNotificationChannel, NewSubject, NotificationChannel, NotificationMethod, Subject},
    normalizer::RawProduct,
    notification::NotificationDispatcher,
    plugins::{
        manager::PluginManager,
        traits::{ExtractionStrategy, ExtractionTarget, NotificationResult, NotifierPlugin, PriceAlert},
    },
    scheduler::BatchScheduler,
    site_profiles::{SiteCatalog, StrategyKind},
    subject_manager::SubjectManager,
    utils::error::{AppError, ExtractionError},
};

pub const TEST_CATALOG: &str = r#"
[[site]]
name = "test-shop"
domains = ["shop.test"]
strategies = ["direct_fetch", "browser_headless", "browser_visible"]
[site.selectors]
price = [".price"]

[[site]]
name = "local"
domains = ["127.0.0.1"]
strategies = ["direct_fetch"]
[site.selectors]
title = ["h1"]
price = [".price"]
original_price = [".old-price"]
"#;

/// Test configuration for integration tests
pub fn test_config() -> AppConfig {
    AppConfig {
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: 5,
        },
        scraper: ScraperConfig {
            request_timeout: 5,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64)".to_string(),
            accept_language: "es-ES,es;q=0.9".to_string(),
        },
        browser: BrowserConfig {
            chrome_path: None,
            hard_timeout: 180,
            settle_secs: 8,
            challenge_backoff_secs: 10,
            challenge_rounds: 2,
        },
        scheduler: SchedulerConfig {
            cron: "0 0 */6 * * *".to_string(),
            subject_delay_ms: 0,
        },
        notifications: NotificationsConfig::default(),
        sites: SitesConfig::default(),
        logging: LoggingConfig::default(),
        metrics: MetricsConfig {
            enabled: false,
            port: 9000,
        },
    }
}

type Outcome = Result<RawProduct, ExtractionError>;

/// Replays queued outcomes per URL, one per call. An exhausted queue fails
/// with a transport error.
pub struct ScriptedStrategy {
    kind: StrategyKind,
    script: Mutex<HashMap<String, VecDeque<Outcome>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedStrategy {
    pub fn new(kind: StrategyKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, url: &str, outcome: Outcome) {
        self.script
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn push_prices(&self, url: &str, prices: &[f64]) {
        for price in prices {
            self.push(url, Ok(priced(*price)));
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn priced(price: f64) -> RawProduct {
    RawProduct {
        title: Some("Scripted product".to_string()),
        price: Some(price),
        ..RawProduct::default()
    }
}

#[async_trait]
impl ExtractionStrategy for ScriptedStrategy {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn description(&self) -> &str {
        "Replays queued outcomes"
    }

    async fn extract(&self, target: &ExtractionTarget) -> Result<RawProduct, ExtractionError> {
        self.calls.lock().unwrap().push(target.url.clone());
        self.script
            .lock()
            .unwrap()
            .get_mut(&target.url)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Err(ExtractionError::Transport(format!("nothing scripted for {}", target.url))))
    }
}

/// Records every alert; fails every delivery when `accept` is false.
pub struct RecordingNotifier {
    method: NotificationMethod,
    accept: bool,
    sent: Mutex<Vec<(String, PriceAlert)>>,
}

impl RecordingNotifier {
    pub fn new(method: NotificationMethod, accept: bool) -> Arc<Self> {
        Arc::new(Self {
            method,
            accept,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn alerts(&self) -> Vec<(String, PriceAlert)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifierPlugin for RecordingNotifier {
    fn method(&self) -> NotificationMethod {
        self.method
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn notify(&self, contact: &str, alert: &PriceAlert) -> Result<NotificationResult, AppError> {
        self.sent.lock().unwrap().push((contact.to_string(), alert.clone()));
        if self.accept {
            Ok(NotificationResult::delivered(Some(format!("msg-{}", contact))))
        } else {
            Ok(NotificationResult::rejected("mailbox unavailable"))
        }
    }
}

pub struct TestHarness {
    pub store: Arc<SqliteStore>,
    pub plugins: PluginManager,
    pub manager: SubjectManager,
    pub scheduler: BatchScheduler,
}

impl TestHarness {
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AppConfig) -> anyhow::Result<Self> {
        let store = Arc::new(SqliteStore::connect(&config.database).await?);
        let catalog = Arc::new(SiteCatalog::from_toml_str(TEST_CATALOG)?);
        let plugins = PluginManager::new();

        let manager = SubjectManager::new(
            store.clone(),
            ExtractionDispatcher::new(catalog, plugins.clone()),
            NotificationDispatcher::new(store.clone(), plugins.clone()),
        );
        let scheduler = BatchScheduler::new(store.clone(), manager.clone(), config.scheduler.clone());

        Ok(Self {
            store,
            plugins,
            manager,
            scheduler,
        })
    }

    pub async fn add_subject(&self, url: &str, target_price: f64) -> anyhow::Result<Subject> {
        let subject = Subject::new(NewSubject {
            url: url.to_string(),
            product_name: Some(format!("Product at {}", url)),
            target_price,
            target_discount_percent: None,
        });
        self.store.insert_subject(&subject).await?;
        Ok(subject)
    }

    pub async fn subscribe(
        &self,
        subject: &Subject,
        method: NotificationMethod,
        contact: &str,
    ) -> anyhow::Result<NotificationChannel> {
        let channel = NotificationChannel::new(NewNotificationChannel {
            subject_id: subject.id.clone(),
            method,
            contact_info: contact.to_string(),
        });
        self.store.insert_channel(&channel).await?;
        Ok(channel)
    }

    pub async fn reload(&self, subject: &Subject) -> anyhow::Result<Subject> {
        self.store
            .get_subject(&subject.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("subject {} vanished", subject.id))
    }
}
