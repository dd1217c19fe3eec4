use super::*;
use price_sentinel::models::NotificationOutcome;
use price_sentinel::notification::CrossingDecision;

#[tokio::test]
async fn test_alerts_fire_once_per_crossing() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let direct = ScriptedStrategy::new(StrategyKind::DirectFetch);
    harness.plugins.register_strategy(direct.clone()).await;
    let telegram = RecordingNotifier::new(NotificationMethod::Telegram, true);
    harness.plugins.register_notifier(telegram.clone()).await;

    let subject = harness.add_subject("https://shop.test/p/cafetera", 10.0).await?;
    harness.subscribe(&subject, NotificationMethod::Telegram, "555001").await?;

    let prices = [12.0, 9.5, 9.8, 11.0, 9.0];
    direct.push_prices(&subject.url, &prices);

    let mut sent_per_run = Vec::new();
    for price in prices {
        let summary = harness.scheduler.run_batch().await?;
        assert_eq!(summary.processed, 1);
        sent_per_run.push(summary.notifications_sent);

        // current_price always mirrors the newest snapshot
        let stored = harness.reload(&subject).await?;
        let history = harness.manager.ledger().history(&subject.id, 1).await?;
        assert_eq!(stored.current_price, Some(price));
        assert_eq!(history.stats.last, stored.current_price);
    }
    assert_eq!(sent_per_run, vec![0, 1, 0, 0, 1]);
    println!("✓ Alerts per run: {:?}", sent_per_run);

    let alerts = telegram.alerts();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].0, "555001");
    assert_eq!((alerts[0].1.old_price, alerts[0].1.new_price), (12.0, 9.5));
    assert_eq!((alerts[1].1.old_price, alerts[1].1.new_price), (11.0, 9.0));

    let events = harness.store.notification_events(&subject.id).await?;
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.outcome == NotificationOutcome::Sent));

    let history = harness.manager.ledger().history(&subject.id, 7).await?;
    assert_eq!(history.stats.count, 5);
    assert_eq!(history.stats.min, Some(9.0));
    assert_eq!(history.stats.max, Some(12.0));
    assert_eq!(history.stats.change_absolute, -3.0);
    assert_eq!(history.stats.change_percent, -25.0);

    Ok(())
}

#[tokio::test]
async fn test_first_reading_below_target_fires() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let direct = ScriptedStrategy::new(StrategyKind::DirectFetch);
    harness.plugins.register_strategy(direct.clone()).await;
    let email = RecordingNotifier::new(NotificationMethod::Email, true);
    harness.plugins.register_notifier(email.clone()).await;

    let subject = harness.add_subject("https://shop.test/p/libro", 20.0).await?;
    harness.subscribe(&subject, NotificationMethod::Email, "reader@example.com").await?;
    direct.push_prices(&subject.url, &[15.0]);

    let summary = harness.scheduler.run_batch().await?;
    assert_eq!(summary.notifications_sent, 1);

    let alert = &email.alerts()[0].1;
    assert_eq!(alert.old_price, alert.new_price);
    Ok(())
}

#[tokio::test]
async fn test_failed_deliveries_are_logged_and_not_retried_next_run() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let direct = ScriptedStrategy::new(StrategyKind::DirectFetch);
    harness.plugins.register_strategy(direct.clone()).await;
    let sms = RecordingNotifier::new(NotificationMethod::Sms, false);
    let email = RecordingNotifier::new(NotificationMethod::Email, true);
    harness.plugins.register_notifier(sms.clone()).await;
    harness.plugins.register_notifier(email.clone()).await;

    let subject = harness.add_subject("https://shop.test/p/movil", 300.0).await?;
    harness.subscribe(&subject, NotificationMethod::Sms, "+34600000000").await?;
    harness.subscribe(&subject, NotificationMethod::Email, "buyer@example.com").await?;
    direct.push_prices(&subject.url, &[320.0, 290.0, 280.0]);

    let mut sent = 0;
    for _ in 0..3 {
        sent += harness.scheduler.run_batch().await?.notifications_sent;
    }
    assert_eq!(sent, 1);
    assert_eq!(sms.alerts().len(), 1);

    let events = harness.store.notification_events(&subject.id).await?;
    assert_eq!(events.len(), 2);
    let failed = events
        .iter()
        .find(|e| e.outcome == NotificationOutcome::Failed)
        .expect("failed sms event");
    assert_eq!(failed.method, NotificationMethod::Sms);
    assert_eq!(failed.error_message.as_deref(), Some("mailbox unavailable"));
    Ok(())
}

#[tokio::test]
async fn test_on_demand_check_evaluates_crossing() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let direct = ScriptedStrategy::new(StrategyKind::DirectFetch);
    harness.plugins.register_strategy(direct.clone()).await;
    let whatsapp = RecordingNotifier::new(NotificationMethod::Whatsapp, true);
    harness.plugins.register_notifier(whatsapp.clone()).await;

    let subject = harness.add_subject("https://shop.test/p/bici", 400.0).await?;
    harness.subscribe(&subject, NotificationMethod::Whatsapp, "+34611111111").await?;
    direct.push_prices(&subject.url, &[450.0, 399.0]);

    harness.scheduler.run_batch().await?;
    let outcome = harness.manager.check_by_id(&subject.id).await?;
    assert_eq!(outcome.previous_price, Some(450.0));
    assert_eq!(outcome.decision, CrossingDecision::Fire);
    assert_eq!(outcome.notifications.sent, 1);
    assert!(outcome.report.success);
    assert_eq!(outcome.report.price, Some(399.0));

    // The batch that follows must not alert again
    direct.push_prices(&subject.url, &[395.0]);
    let summary = harness.scheduler.run_batch().await?;
    assert_eq!(summary.notifications_sent, 0);
    assert_eq!(whatsapp.alerts().len(), 1);
    Ok(())
}
