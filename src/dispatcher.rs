//! Classifies a product URL and walks its strategy chain until one strategy
//! yields a usable price.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::normalizer::{self, RawProduct};
use crate::plugins::{PluginManager, ExtractionTarget};
use crate::site_profiles::{SiteCatalog, StrategyKind};
use crate::utils::error::{AppError, ExtractionError, Result};

/// One step of the chain that did not produce a price.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub method: StrategyKind,
    pub error: ExtractionError,
    pub elapsed_ms: u64,
}

/// A successful, normalized extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub product: RawProduct,
    pub price: f64,
    pub method: StrategyKind,
    /// Wall time of the whole chain, failed attempts included.
    pub elapsed_ms: u64,
    pub attempts: Vec<AttemptRecord>,
}

/// What `check` prints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub success: bool,
    pub price: Option<f64>,
    pub title: Option<String>,
    pub image: Option<String>,
    pub discount: Option<f64>,
    pub original_price: Option<f64>,
    pub error: Option<String>,
    pub method: Option<String>,
    pub extraction_time_ms: u64,
}

impl ExtractionReport {
    pub fn from_extraction(extraction: &Extraction) -> Self {
        Self {
            success: true,
            price: Some(extraction.price),
            title: extraction.product.title.clone(),
            image: extraction.product.image.clone(),
            discount: extraction.product.discount_percent,
            original_price: extraction.product.original_price,
            error: None,
            method: Some(extraction.method.to_string()),
            extraction_time_ms: extraction.elapsed_ms,
        }
    }

    /// For `ExtractionFailed` the error is the last strategy's, verbatim.
    pub fn from_error(err: &AppError, extraction_time_ms: u64) -> Self {
        let (method, error) = match err {
            AppError::ExtractionFailed { method, source } => (Some(method.clone()), source.to_string()),
            other => (None, other.to_string()),
        };
        Self {
            success: false,
            price: None,
            title: None,
            image: None,
            discount: None,
            original_price: None,
            error: Some(error),
            method,
            extraction_time_ms,
        }
    }
}

#[derive(Clone)]
pub struct ExtractionDispatcher {
    catalog: Arc<SiteCatalog>,
    plugins: PluginManager,
}

impl ExtractionDispatcher {
    pub fn new(catalog: Arc<SiteCatalog>, plugins: PluginManager) -> Self {
        Self { catalog, plugins }
    }

    pub fn catalog(&self) -> &SiteCatalog {
        &self.catalog
    }

    /// Runs the chain for `url` strictly in order. Only exhaustion is an
    /// error, and it carries the last attempted strategy's failure.
    pub async fn extract(&self, subject_id: &str, url: &str) -> Result<Extraction> {
        let started = Instant::now();
        let (profile, chain) = self.catalog.chain_for(url);
        let site = profile.as_ref().map(|p| p.name.as_str()).unwrap_or("unclassified");
        debug!("Subject {} on {} uses chain {:?}", subject_id, site, chain);

        let target = ExtractionTarget::new(subject_id, url).with_profile(profile.clone());
        let mut attempts: Vec<AttemptRecord> = Vec::with_capacity(chain.len());

        for kind in chain {
            let attempt_started = Instant::now();
            let outcome = match self.plugins.strategy(kind).await {
                Some(strategy) => {
                    debug!("Trying {} for subject {}", strategy.name(), subject_id);
                    strategy.extract(&target).await
                }
                None => Err(ExtractionError::UnsupportedSite(format!(
                    "strategy {} not registered",
                    kind
                ))),
            };
            let attempt_ms = attempt_started.elapsed().as_millis() as u64;
            metrics::histogram!("sentinel_extraction_duration_seconds", "strategy" => kind.as_str())
                .record(attempt_started.elapsed().as_secs_f64());

            let failure = match outcome.map(normalizer::complete) {
                Ok(product) => match product.price.filter(|p| *p > 0.0) {
                    Some(price) => {
                        let elapsed_ms = started.elapsed().as_millis() as u64;
                        info!(
                            "Extracted {:.2} for subject {} via {} in {}ms",
                            price, subject_id, kind, elapsed_ms
                        );
                        return Ok(Extraction {
                            product,
                            price,
                            method: kind,
                            elapsed_ms,
                            attempts,
                        });
                    }
                    None => ExtractionError::Parse(format!("{} returned no positive price", kind)),
                },
                Err(err) => err,
            };

            warn!("Strategy {} failed for subject {}: {}", kind, subject_id, failure);
            metrics::counter!("sentinel_strategy_failures_total", "strategy" => kind.as_str())
                .increment(1);
            attempts.push(AttemptRecord {
                method: kind,
                error: failure,
                elapsed_ms: attempt_ms,
            });
        }

        match attempts.pop() {
            Some(last) => Err(AppError::ExtractionFailed {
                method: last.method.to_string(),
                source: last.error,
            }),
            None => Err(AppError::ExtractionFailed {
                method: "none".to_string(),
                source: ExtractionError::UnsupportedSite(url.to_string()),
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::plugins::traits::ExtractionStrategy;
    use crate::site_profiles::{SelectorRules, SiteProfile};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) struct FakeStrategy {
        kind: StrategyKind,
        outcome: std::result::Result<RawProduct, ExtractionError>,
        pub(crate) calls: AtomicUsize,
    }

    impl FakeStrategy {
        pub(crate) fn priced(kind: StrategyKind, price: f64) -> Arc<Self> {
            Arc::new(Self {
                kind,
                outcome: Ok(RawProduct {
                    title: Some("Fake product".to_string()),
                    price: Some(price),
                    ..RawProduct::default()
                }),
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn failing(kind: StrategyKind, error: ExtractionError) -> Arc<Self> {
            Arc::new(Self {
                kind,
                outcome: Err(error),
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn returning(kind: StrategyKind, product: RawProduct) -> Arc<Self> {
            Arc::new(Self {
                kind,
                outcome: Ok(product),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ExtractionStrategy for FakeStrategy {
        fn name(&self) -> &str {
            "Fake"
        }

        fn kind(&self) -> StrategyKind {
            self.kind
        }

        fn description(&self) -> &str {
            "Canned outcome"
        }

        async fn extract(
            &self,
            _target: &ExtractionTarget,
        ) -> std::result::Result<RawProduct, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    pub(crate) fn shop_catalog() -> Arc<SiteCatalog> {
        let profile = SiteProfile {
            name: "shop".to_string(),
            domains: vec!["shop.test".to_string()],
            strategies: vec![
                StrategyKind::DirectFetch,
                StrategyKind::BrowserHeadless,
                StrategyKind::BrowserVisible,
            ],
            selectors: SelectorRules {
                price: vec![".price".to_string()],
                ..SelectorRules::default()
            },
            api: None,
            referer: None,
            browser: Default::default(),
        };
        Arc::new(SiteCatalog::from_profiles(vec![profile]).unwrap())
    }

    async fn dispatcher(strategies: Vec<Arc<FakeStrategy>>) -> ExtractionDispatcher {
        let plugins = PluginManager::new();
        for strategy in strategies {
            plugins.register_strategy(strategy).await;
        }
        ExtractionDispatcher::new(shop_catalog(), plugins)
    }

    #[tokio::test]
    async fn test_first_success_stops_the_chain() {
        let direct = FakeStrategy::priced(StrategyKind::DirectFetch, 19.99);
        let headless = FakeStrategy::priced(StrategyKind::BrowserHeadless, 18.0);
        let dispatcher = dispatcher(vec![direct.clone(), headless.clone()]).await;

        let extraction = dispatcher.extract("s1", "https://shop.test/p/1").await.unwrap();
        assert_eq!(extraction.price, 19.99);
        assert_eq!(extraction.method, StrategyKind::DirectFetch);
        assert!(extraction.attempts.is_empty());
        assert_eq!(headless.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_positive_price_escalates() {
        let direct = FakeStrategy::returning(
            StrategyKind::DirectFetch,
            RawProduct {
                price: Some(0.0),
                ..RawProduct::default()
            },
        );
        let headless = FakeStrategy::priced(StrategyKind::BrowserHeadless, 42.0);
        let dispatcher = dispatcher(vec![direct.clone(), headless.clone()]).await;

        let extraction = dispatcher.extract("s1", "https://shop.test/p/1").await.unwrap();
        assert_eq!(extraction.method, StrategyKind::BrowserHeadless);
        assert_eq!(extraction.attempts.len(), 1);
        assert!(matches!(extraction.attempts[0].error, ExtractionError::Parse(_)));
        assert_eq!(direct.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_last_error() {
        let dispatcher = dispatcher(vec![
            FakeStrategy::failing(StrategyKind::DirectFetch, ExtractionError::Transport("HTTP 403".into())),
            FakeStrategy::failing(StrategyKind::BrowserHeadless, ExtractionError::BotChallenge("access denied".into())),
            FakeStrategy::failing(StrategyKind::BrowserVisible, ExtractionError::Timeout { seconds: 180 }),
        ])
        .await;

        let err = dispatcher.extract("s1", "https://shop.test/p/1").await.unwrap_err();
        match err {
            AppError::ExtractionFailed { method, source } => {
                assert_eq!(method, "browser_visible");
                assert_eq!(source, ExtractionError::Timeout { seconds: 180 });
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unregistered_strategy_counts_as_attempt() {
        let visible = FakeStrategy::priced(StrategyKind::BrowserVisible, 7.5);
        let dispatcher = dispatcher(vec![visible]).await;

        let extraction = dispatcher.extract("s1", "https://shop.test/p/1").await.unwrap();
        assert_eq!(extraction.attempts.len(), 2);
        assert!(extraction
            .attempts
            .iter()
            .all(|a| matches!(&a.error, ExtractionError::UnsupportedSite(m) if m.contains("not registered"))));
    }

    #[tokio::test]
    async fn test_unclassified_url_uses_heuristic_only() {
        let direct = FakeStrategy::priced(StrategyKind::DirectFetch, 1.0);
        let heuristic = FakeStrategy::priced(StrategyKind::Heuristic, 55.0);
        let dispatcher = dispatcher(vec![direct.clone(), heuristic]).await;

        let extraction = dispatcher.extract("s1", "https://elsewhere.example/item").await.unwrap();
        assert_eq!(extraction.method, StrategyKind::Heuristic);
        assert_eq!(direct.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_result_is_normalized() {
        let direct = FakeStrategy::returning(
            StrategyKind::DirectFetch,
            RawProduct {
                price: Some(80.0),
                discount_percent: Some(20.0),
                ..RawProduct::default()
            },
        );
        let dispatcher = dispatcher(vec![direct]).await;

        let extraction = dispatcher.extract("s1", "https://shop.test/p/1").await.unwrap();
        assert_eq!(extraction.product.original_price, Some(100.0));

        let report = ExtractionReport::from_extraction(&extraction);
        assert!(report.success);
        assert_eq!(report.method.as_deref(), Some("direct_fetch"));
    }

    #[test]
    fn test_failure_report_keeps_strategy_error_verbatim() {
        let err = AppError::ExtractionFailed {
            method: "browser_visible".to_string(),
            source: ExtractionError::BotChallenge("just a moment".to_string()),
        };
        let report = ExtractionReport::from_error(&err, 1200);
        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some("Bot challenge not cleared: just a moment"));
        assert_eq!(report.method.as_deref(), Some("browser_visible"));
    }
}
