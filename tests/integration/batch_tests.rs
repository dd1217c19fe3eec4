use super::*;
use price_sentinel::models::SubjectStatus;

#[tokio::test]
async fn test_timeout_does_not_stop_later_subjects() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let direct = ScriptedStrategy::new(StrategyKind::DirectFetch);
    let headless = ScriptedStrategy::new(StrategyKind::BrowserHeadless);
    let visible = ScriptedStrategy::new(StrategyKind::BrowserVisible);
    for strategy in [&direct, &headless, &visible] {
        harness.plugins.register_strategy(strategy.clone()).await;
    }

    let stuck = harness.add_subject("https://shop.test/p/stuck", 10.0).await?;
    let fine = harness.add_subject("https://shop.test/p/fine", 10.0).await?;
    let escalated = harness.add_subject("https://shop.test/p/escalated", 10.0).await?;

    direct.push(&stuck.url, Err(ExtractionError::Transport("HTTP 403".into())));
    headless.push(&stuck.url, Err(ExtractionError::BotChallenge("just a moment".into())));
    visible.push(&stuck.url, Err(ExtractionError::Timeout { seconds: 180 }));

    direct.push_prices(&fine.url, &[14.0]);

    direct.push(&escalated.url, Ok(priced(0.0)));
    headless.push_prices(&escalated.url, &[12.5]);

    let summary = harness.scheduler.run_batch().await?;
    assert_eq!(summary.total, 3);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.failures[0].subject_id, stuck.id);
    assert_eq!(summary.failures[0].error, "Extraction failed (browser_visible): Timed out after 180s");
    println!("✓ Timed out subject isolated: {:?}", summary.failures);

    let stuck = harness.reload(&stuck).await?;
    assert_eq!(stuck.status, SubjectStatus::Error);
    assert!(stuck.current_price.is_none());
    assert!(stuck.last_checked.is_some());

    let escalated = harness.reload(&escalated).await?;
    assert_eq!(escalated.current_price, Some(12.5));
    assert_eq!(escalated.status, SubjectStatus::Active);

    let history = harness.manager.ledger().history(&escalated.id, 1).await?;
    assert_eq!(history.snapshots.len(), 1);
    assert_eq!(history.snapshots[0].extraction_method, "browser_headless");

    Ok(())
}

#[tokio::test]
async fn test_never_checked_subjects_go_first() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let direct = ScriptedStrategy::new(StrategyKind::DirectFetch);
    harness.plugins.register_strategy(direct.clone()).await;

    let older = harness.add_subject("https://shop.test/p/older", 5.0).await?;
    direct.push_prices(&older.url, &[8.0, 8.0]);
    harness.scheduler.run_batch().await?;

    let newer = harness.add_subject("https://shop.test/p/newer", 5.0).await?;
    direct.push_prices(&newer.url, &[9.0]);
    harness.scheduler.run_batch().await?;

    assert_eq!(direct.calls(), vec![older.url.clone(), newer.url.clone(), older.url.clone()]);
    Ok(())
}

#[tokio::test]
async fn test_errored_subjects_leave_the_batch() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let direct = ScriptedStrategy::new(StrategyKind::DirectFetch);
    harness.plugins.register_strategy(direct.clone()).await;

    let subject = harness.add_subject("https://shop.test/p/gone", 5.0).await?;
    direct.push(&subject.url, Err(ExtractionError::Transport("HTTP 404".into())));

    let first = harness.scheduler.run_batch().await?;
    assert_eq!(first.errors, 1);

    let second = harness.scheduler.run_batch().await?;
    assert_eq!(second.total, 0);
    Ok(())
}

#[tokio::test]
async fn test_delay_separates_subjects() -> anyhow::Result<()> {
    let mut config = test_config();
    config.scheduler.subject_delay_ms = 150;
    let harness = TestHarness::with_config(config).await?;
    let direct = ScriptedStrategy::new(StrategyKind::DirectFetch);
    harness.plugins.register_strategy(direct.clone()).await;

    for i in 0..3 {
        let subject = harness.add_subject(&format!("https://shop.test/p/{}", i), 5.0).await?;
        direct.push_prices(&subject.url, &[6.0]);
    }

    let summary = harness.scheduler.run_batch().await?;
    assert_eq!(summary.processed, 3);
    // Two gaps between three subjects, none after the last
    assert!(summary.duration_ms >= 300, "took {}ms", summary.duration_ms);
    Ok(())
}
