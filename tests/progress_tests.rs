use xp_ledger_backend::db::operations::LearningUnit;
use xp_ledger_backend::services::{activity, gamification, progress, LedgerError};
use xp_ledger_backend::types::UnitKind;

mod common;

#[tokio::test]
async fn test_progress_is_monotonic() {
    let ledger = common::test_ledger().await;
    common::seed_mixed_module(&ledger.proxy).await;

    progress::record_progress(&ledger.proxy, "learner", "a", 10.0, 20.0)
        .await
        .unwrap();
    progress::record_progress(&ledger.proxy, "learner", "a", 5.0, 10.0)
        .await
        .unwrap();

    let status = progress::get_unit_status(&ledger.proxy, "learner", "a")
        .await
        .unwrap();
    assert_eq!(status.watched_seconds, 10);
    assert_eq!(status.watched_pct, 20.0);
    assert!(!status.is_completed);
    assert_eq!(status.unit_xp, 100);
}

#[tokio::test]
async fn test_progress_input_is_clamped() {
    let ledger = common::test_ledger().await;
    common::seed_mixed_module(&ledger.proxy).await;

    progress::record_progress(&ledger.proxy, "learner", "a", -12.0, 250.0)
        .await
        .unwrap();
    let status = progress::get_unit_status(&ledger.proxy, "learner", "a")
        .await
        .unwrap();
    assert_eq!(status.watched_seconds, 0);
    assert_eq!(status.watched_pct, 100.0);

    progress::record_progress(&ledger.proxy, "learner", "b", 42.7, f64::NAN)
        .await
        .unwrap();
    let status = progress::get_unit_status(&ledger.proxy, "learner", "b")
        .await
        .unwrap();
    assert_eq!(status.watched_seconds, 42);
    assert_eq!(status.watched_pct, 0.0);
}

#[tokio::test]
async fn test_progress_frozen_after_completion() {
    let ledger = common::test_ledger().await;
    common::seed_mixed_module(&ledger.proxy).await;

    progress::record_progress(&ledger.proxy, "learner", "a", 10.0, 20.0)
        .await
        .unwrap();
    gamification::complete_unit(&ledger.proxy, "learner", "a")
        .await
        .unwrap();
    progress::record_progress(&ledger.proxy, "learner", "a", 90.0, 95.0)
        .await
        .unwrap();

    let status = progress::get_unit_status(&ledger.proxy, "learner", "a")
        .await
        .unwrap();
    assert!(status.is_completed);
    assert_eq!(status.watched_seconds, 10);
    assert_eq!(status.watched_pct, 20.0);
}

#[tokio::test]
async fn test_progress_never_writes_events() {
    let ledger = common::test_ledger().await;
    common::seed_mixed_module(&ledger.proxy).await;

    progress::record_progress(&ledger.proxy, "learner", "a", 100.0, 100.0)
        .await
        .unwrap();

    assert!(gamification::list_events(&ledger.proxy, "learner", "c1")
        .await
        .unwrap()
        .is_empty());
    let balance = gamification::get_balance(&ledger.proxy, "learner", "c1")
        .await
        .unwrap();
    assert_eq!(balance.totals.xp_total, 0);
}

#[tokio::test]
async fn test_progress_for_unknown_unit() {
    let ledger = common::test_ledger().await;

    let err = progress::record_progress(&ledger.proxy, "learner", "nope", 1.0, 1.0)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));

    let err = progress::get_unit_status(&ledger.proxy, "learner", "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
}

#[tokio::test]
async fn test_status_reports_lock_until_previous_completed() {
    let ledger = common::test_ledger().await;
    let proxy = &ledger.proxy;
    common::add_course(proxy, "cl", true, 0).await;
    common::add_module(proxy, "ml", "cl", 10).await;
    common::add_unit(proxy, common::unit("first", "ml", 0, 10)).await;
    common::add_unit(
        proxy,
        LearningUnit {
            requires_completed_previous: true,
            ..common::unit("second", "ml", 1, 10)
        },
    )
    .await;

    let first = progress::get_unit_status(proxy, "learner", "first").await.unwrap();
    assert!(!first.is_locked);
    let second = progress::get_unit_status(proxy, "learner", "second").await.unwrap();
    assert!(second.is_locked);

    gamification::complete_unit(proxy, "learner", "first").await.unwrap();
    let second = progress::get_unit_status(proxy, "learner", "second").await.unwrap();
    assert!(!second.is_locked);
}

async fn seed_activity_module(proxy: &xp_ledger_backend::db::DatabaseProxy) {
    common::add_course(proxy, "ca", true, 0).await;
    common::add_module(proxy, "ma", "ca", 10).await;
    common::add_unit(proxy, common::unit("video", "ma", 0, 40)).await;
    common::add_unit(
        proxy,
        LearningUnit {
            kind: UnitKind::Activity,
            ..common::unit("essay", "ma", 1, 60)
        },
    )
    .await;
}

#[tokio::test]
async fn test_activity_submission_completes_once() {
    let ledger = common::test_ledger().await;
    seed_activity_module(&ledger.proxy).await;

    let first = activity::submit_activity(&ledger.proxy, "learner", "essay", Some("draft"), None)
        .await
        .unwrap();
    assert_eq!(first.awarded_xp, 60);
    assert!(!first.already_completed);

    let second = activity::submit_activity(
        &ledger.proxy,
        "learner",
        "essay",
        Some("final answer"),
        Some("https://example.org/essay.pdf"),
    )
    .await
    .unwrap();
    assert_eq!(second.awarded_xp, 0);
    assert!(second.already_completed);

    let status = activity::get_activity_status(&ledger.proxy, "learner", "essay")
        .await
        .unwrap();
    assert!(status.is_completed);
    assert_eq!(status.earned_xp, 60);
    let submission = status.submission.expect("submission stored");
    assert_eq!(submission.text.as_deref(), Some("final answer"));
    assert_eq!(
        submission.attachment_url.as_deref(),
        Some("https://example.org/essay.pdf")
    );
}

#[tokio::test]
async fn test_activity_submission_validation() {
    let ledger = common::test_ledger().await;
    seed_activity_module(&ledger.proxy).await;

    let err = activity::submit_activity(&ledger.proxy, "learner", "video", Some("hi"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));

    let err = activity::submit_activity(&ledger.proxy, "learner", "essay", Some("   "), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));

    let status = activity::get_activity_status(&ledger.proxy, "learner", "essay")
        .await
        .unwrap();
    assert!(!status.is_completed);
    assert_eq!(status.earned_xp, 0);
    assert!(status.submission.is_none());
}
