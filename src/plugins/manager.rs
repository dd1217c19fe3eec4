use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};

use super::notifiers::{EmailNotifier, TelegramNotifier, TwilioNotifier};
use super::strategies::{
    BrowserStrategy, DirectFetchStrategy, HeuristicStrategy, StructuredApiStrategy,
};
use super::traits::{ExtractionStrategy, NotifierPlugin};
use crate::config::AppConfig;
use crate::models::NotificationMethod;
use crate::site_profiles::StrategyKind;
use crate::utils::error::Result;

pub type StrategyHandle = Arc<dyn ExtractionStrategy>;
pub type NotifierHandle = Arc<dyn NotifierPlugin>;

/// Registry of extraction strategies and notification transports.
#[derive(Clone)]
pub struct PluginManager {
    strategies: Arc<RwLock<HashMap<StrategyKind, StrategyHandle>>>,
    notifiers: Arc<RwLock<HashMap<NotificationMethod, NotifierHandle>>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self {
            strategies: Arc::new(RwLock::new(HashMap::new())),
            notifiers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers a strategy, replacing any previous one of the same kind.
    pub async fn register_strategy(&self, strategy: StrategyHandle) {
        let kind = strategy.kind();
        tracing::debug!("Registering extraction strategy {} ({})", kind, strategy.name());
        self.strategies.write().await.insert(kind, strategy);
    }

    pub async fn register_notifier(&self, notifier: NotifierHandle) {
        let method = notifier.method();
        if !notifier.is_configured() {
            tracing::warn!("Notifier {} registered without credentials; deliveries will fail", method);
        }
        self.notifiers.write().await.insert(method, notifier);
    }

    pub async fn strategy(&self, kind: StrategyKind) -> Option<StrategyHandle> {
        self.strategies.read().await.get(&kind).cloned()
    }

    pub async fn notifier(&self, method: NotificationMethod) -> Option<NotifierHandle> {
        self.notifiers.read().await.get(&method).cloned()
    }

    pub async fn has_strategy(&self, kind: StrategyKind) -> bool {
        self.strategies.read().await.contains_key(&kind)
    }

    pub async fn has_notifier(&self, method: NotificationMethod) -> bool {
        self.notifiers.read().await.contains_key(&method)
    }

    pub async fn list_strategies(&self) -> Vec<StrategyKind> {
        self.strategies.read().await.keys().copied().collect()
    }

    pub async fn list_notifiers(&self) -> Vec<NotificationMethod> {
        self.notifiers.read().await.keys().copied().collect()
    }

    /// Every strategy and every transport, configured from `config`.
    pub async fn initialize_default_plugins(&self, config: &AppConfig) -> Result<()> {
        self.register_strategy(Arc::new(StructuredApiStrategy::new(&config.scraper)?))
            .await;
        self.register_strategy(Arc::new(DirectFetchStrategy::new(config.scraper.clone())))
            .await;
        // One Chrome at a time across both browser strategies
        let render_slot = Arc::new(Semaphore::new(1));
        self.register_strategy(Arc::new(
            BrowserStrategy::headless(config.browser.clone(), config.scraper.user_agent.clone())
                .with_render_slot(render_slot.clone()),
        ))
        .await;
        self.register_strategy(Arc::new(
            BrowserStrategy::visible(config.browser.clone(), config.scraper.user_agent.clone())
                .with_render_slot(render_slot),
        ))
        .await;
        self.register_strategy(Arc::new(HeuristicStrategy::new(&config.scraper)?))
            .await;

        let notifications = &config.notifications;
        self.register_notifier(Arc::new(EmailNotifier::new(notifications.smtp.clone())))
            .await;
        self.register_notifier(Arc::new(TelegramNotifier::new(notifications.telegram.clone())?))
            .await;
        self.register_notifier(Arc::new(TwilioNotifier::whatsapp(notifications.twilio.clone())?))
            .await;
        self.register_notifier(Arc::new(TwilioNotifier::sms(notifications.twilio.clone())?))
            .await;

        Ok(())
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}
