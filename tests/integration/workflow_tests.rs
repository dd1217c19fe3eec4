use super::*;
use price_sentinel::dispatcher::ExtractionReport;
use price_sentinel::plugins::strategies::DirectFetchStrategy;
use validator::Validate;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_direct_fetch_end_to_end() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p/robot"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body>
                <h1>  Robot   de cocina </h1>
                <span class="old-price">1.299,00 €</span>
                <span class="price">1.039,20 €</span>
            </body></html>"#,
        ))
        .mount(&server)
        .await;

    let config = test_config();
    let harness = TestHarness::with_config(config.clone()).await?;
    harness
        .plugins
        .register_strategy(Arc::new(DirectFetchStrategy::new(config.scraper.clone())))
        .await;

    let subject = harness
        .add_subject(&format!("{}/p/robot", server.uri()), 1100.0)
        .await?;
    let outcome = harness.manager.check_by_id(&subject.id).await?;

    let report = &outcome.report;
    assert_eq!(report.price, Some(1039.2));
    assert_eq!(report.original_price, Some(1299.0));
    assert_eq!(report.discount, Some(20.0));
    assert_eq!(report.title.as_deref(), Some("Robot de cocina"));
    assert_eq!(report.method.as_deref(), Some("direct_fetch"));

    let stored = harness.reload(&subject).await?;
    assert_eq!(stored.product_name, "Robot de cocina");
    assert_eq!(stored.current_price, Some(1039.2));
    assert_eq!(stored.discount_percent, Some(20.0));
    println!("✓ Extracted and stored: {}", serde_json::to_string(report)?);

    Ok(())
}

#[tokio::test]
async fn test_failed_check_report() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = test_config();
    let harness = TestHarness::with_config(config.clone()).await?;
    harness
        .plugins
        .register_strategy(Arc::new(DirectFetchStrategy::new(config.scraper.clone())))
        .await;

    let subject = harness.add_subject(&format!("{}/p/agotado", server.uri()), 10.0).await?;
    let err = harness.manager.check_by_id(&subject.id).await.unwrap_err();

    let report = ExtractionReport::from_error(&err, 0);
    assert!(!report.success);
    assert_eq!(report.method.as_deref(), Some("direct_fetch"));
    assert!(report.error.as_deref().unwrap_or_default().contains("HTTP 503"));
    Ok(())
}

#[tokio::test]
async fn test_subject_and_channel_validation() -> anyhow::Result<()> {
    let subject = NewSubject {
        url: "https://www.example.com/p/1".to_string(),
        product_name: None,
        target_price: 0.0,
        target_discount_percent: None,
    };
    assert!(subject.validate().is_err());

    let channel = NewNotificationChannel {
        subject_id: "abc".to_string(),
        method: "Telegram".parse().map_err(anyhow::Error::msg)?,
        contact_info: "1".to_string(),
    };
    assert_eq!(channel.method, NotificationMethod::Telegram);
    assert!(channel.validate().is_err());
    Ok(())
}

#[tokio::test]
async fn test_builtin_catalog_and_default_config_file() -> anyhow::Result<()> {
    let catalog = SiteCatalog::builtin()?;
    assert!(!catalog.is_empty());

    let (profile, chain) = catalog.chain_for("https://www.amazon.es/dp/B0TEST");
    assert_eq!(profile.map(|p| p.name.clone()).as_deref(), Some("amazon"));
    assert_eq!(chain.first(), Some(&StrategyKind::DirectFetch));

    let (_, chain) = catalog.chain_for("https://tienda.mercadona.es/product/12345/leche");
    assert_eq!(chain, vec![StrategyKind::StructuredApi]);

    let raw = std::fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml"))?;
    let config: AppConfig = config::Config::builder()
        .add_source(config::File::from_str(&raw, config::FileFormat::Toml))
        .build()?
        .try_deserialize()?;
    config.validate()?;
    assert!(!config.metrics.enabled);
    Ok(())
}
