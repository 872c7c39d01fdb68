//! Sync engine integration tests
//!
//! Drives the update queue and sync loop through the service against the
//! in-memory store, including:
//! - Delivery order within a subject
//! - Bounded retry and drop reporting
//! - Reconciliation and dirty tracking
//! - Background loop lifecycle

mod common;

use std::time::Duration;

use common::{harness, harness_with, meeting, seeded};
use elohim_competency::{
    ActionInput, Category, CompetencyConfig, CompetencyError, CompetencyScores, ImpactLevel,
    MemoryPersistence, SubjectId, SyncConfig,
};

// =============================================================================
// Delivery and Retry
// =============================================================================

#[tokio::test]
async fn test_three_failures_drop_once_and_stay_dirty() {
    let h = harness();
    h.store.seed(seeded("s1", CompetencyScores::default()));
    let subject = SubjectId::from("s1");
    h.service.initialize(&subject).await.unwrap();

    h.service.record_action(&subject, meeting()).unwrap();
    h.store.set_offline(true);

    let first = h.service.sync_now().await;
    assert_eq!(first.retried, 1);
    let second = h.service.sync_now().await;
    assert_eq!(second.retried, 1);
    let third = h.service.sync_now().await;
    assert_eq!(third.dropped, 1);
    assert_eq!(third.retried, 0);

    let reports = h.sink.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, subject);
    assert!(matches!(
        &reports[0].1,
        CompetencyError::RetryExhausted { attempts: 3, .. }
    ));

    assert_eq!(h.service.pending_updates(&subject), 0);
    assert!(h.service.cache_entry(&subject).unwrap().is_dirty);
    assert_eq!(h.service.get_cache_stats().dropped_updates, 1);

    // Still offline: the reconciling write fails, nothing more is reported
    let fourth = h.service.sync_now().await;
    assert_eq!(fourth.reconcile_failures, 1);
    assert!(h.service.cache_entry(&subject).unwrap().is_dirty);
    assert_eq!(h.sink.reports().len(), 1);

    // Back online: the next tick reconciles
    h.store.set_offline(false);
    let fifth = h.service.sync_now().await;
    assert_eq!(fifth.reconciled, 1);
    assert!(!h.service.cache_entry(&subject).unwrap().is_dirty);
    assert_eq!(h.store.stored(&subject).unwrap().total_points, 100);
}

#[tokio::test]
async fn test_updates_delivered_in_enqueue_order() {
    let h = harness();
    h.store.seed(seeded("s1", CompetencyScores::default()));
    let subject = SubjectId::from("s1");
    h.service.initialize(&subject).await.unwrap();

    let a = h.service.record_action(&subject, meeting()).unwrap();
    h.service.unlock_achievement(&subject, "first_meeting", 25).unwrap();
    let b = h.service.record_action(&subject, meeting()).unwrap();

    let report = h.service.sync_now().await;
    assert_eq!(report.delivered, 3);
    assert_eq!(report.reconciled, 1);

    assert_eq!(
        h.store.delivery_log(&subject),
        vec![
            format!("action:{}", a.record.id),
            "achievement:first_meeting".to_string(),
            format!("action:{}", b.record.id),
        ]
    );
}

#[tokio::test]
async fn test_retry_then_success_keeps_order() {
    let h = harness();
    h.store.seed(seeded("s1", CompetencyScores::default()));
    let subject = SubjectId::from("s1");
    h.service.initialize(&subject).await.unwrap();

    let a = h.service.record_action(&subject, meeting()).unwrap();
    let b = h.service.record_action(&subject, meeting()).unwrap();
    h.store.fail_next_writes(1);

    let first = h.service.sync_now().await;
    assert_eq!(first.retried, 1);
    assert_eq!(first.delivered, 0);
    assert_eq!(first.reconciled, 0);
    assert_eq!(h.service.pending_updates(&subject), 2);
    assert!(h.service.cache_entry(&subject).unwrap().is_dirty);

    let second = h.service.sync_now().await;
    assert_eq!(second.delivered, 2);
    assert_eq!(second.reconciled, 1);
    assert!(!h.service.cache_entry(&subject).unwrap().is_dirty);
    assert_eq!(
        h.store.delivery_log(&subject),
        vec![format!("action:{}", a.record.id), format!("action:{}", b.record.id)]
    );
    assert!(h.sink.reports().is_empty());
}

#[tokio::test]
async fn test_subjects_sync_independently() {
    let h = harness();
    h.store.seed(seeded("s1", CompetencyScores::default()));
    h.store.seed(seeded("s2", CompetencyScores::default()));
    let s1 = SubjectId::from("s1");
    let s2 = SubjectId::from("s2");
    h.service.initialize(&s1).await.unwrap();
    h.service.initialize(&s2).await.unwrap();

    h.service.record_action(&s1, meeting()).unwrap();
    h.service.record_action(&s2, meeting()).unwrap();
    h.service.record_action(&s2, meeting()).unwrap();

    let report = h.service.sync_now().await;
    assert_eq!(report.delivered, 3);
    assert_eq!(report.reconciled, 2);
    assert_eq!(h.store.actions(&s1).len(), 1);
    assert_eq!(h.store.actions(&s2).len(), 2);
    assert_eq!(h.store.stored(&s2).unwrap().total_points, 200);
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn test_reconcile_pushes_bonus_from_same_tick() {
    let h = harness();
    h.store
        .seed(seeded("s1", CompetencyScores::new(65.0, 0.0, 0.0)));
    let subject = SubjectId::from("s1");
    h.service.initialize(&subject).await.unwrap();

    let outcome = h
        .service
        .record_action(
            &subject,
            ActionInput::new(
                "value_proposition",
                Category::ValueCommunication,
                "Deck",
                ImpactLevel::Medium,
            ),
        )
        .unwrap();
    assert_eq!(outcome.new_achievements, vec!["unlocked_value_calculator".to_string()]);

    h.service.sync_now().await;

    let fields = h.store.last_fields(&subject).unwrap();
    assert_eq!(fields["total_points"], 200);
    assert_eq!(fields["tool_unlocks"][0], "value_calculator");
    assert_eq!(fields["achievement_ids"][0], "unlocked_value_calculator");
}

#[tokio::test(start_paused = true)]
async fn test_mutation_during_reconcile_stays_dirty() {
    let h = harness_with(
        MemoryPersistence::new().with_latency(Duration::from_millis(100)),
        CompetencyConfig::default(),
    );
    h.store.seed(seeded("s1", CompetencyScores::default()));
    let subject = SubjectId::from("s1");
    h.service.initialize(&subject).await.unwrap();
    h.service.record_action(&subject, meeting()).unwrap();

    // Delivery takes 100ms, the reconciling write the next 100ms
    let (report, late) = tokio::join!(h.service.sync_now(), async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        h.service.record_action(&subject, meeting()).unwrap()
    });

    assert_eq!(report.delivered, 1);
    assert_eq!(report.reconciled, 1);
    assert!(h.service.cache_entry(&subject).unwrap().is_dirty);
    assert_eq!(h.service.pending_updates(&subject), 1);

    h.service.sync_now().await;
    assert!(!h.service.cache_entry(&subject).unwrap().is_dirty);
    assert_eq!(h.store.actions(&subject)[0].id, late.record.id);
    assert_eq!(h.store.stored(&subject).unwrap().total_points, 200);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_background_loop_delivers_on_interval() {
    let config = CompetencyConfig {
        sync: SyncConfig::for_interactive(),
        ..CompetencyConfig::default()
    };
    let h = harness_with(MemoryPersistence::new(), config);
    h.store.seed(seeded("s1", CompetencyScores::default()));
    let subject = SubjectId::from("s1");
    h.service.initialize(&subject).await.unwrap();

    h.service.start_sync();
    assert!(h.service.is_syncing());
    h.service.record_action(&subject, meeting()).unwrap();

    tokio::time::sleep(Duration::from_millis(6_000)).await;

    assert_eq!(h.store.actions(&subject).len(), 1);
    assert!(!h.service.cache_entry(&subject).unwrap().is_dirty);

    h.service.stop_sync();
    assert!(!h.service.is_syncing());

    // Nothing runs after stop
    h.service.record_action(&subject, meeting()).unwrap();
    tokio::time::sleep(Duration::from_millis(20_000)).await;
    assert_eq!(h.store.actions(&subject).len(), 1);
    assert_eq!(h.service.pending_updates(&subject), 1);
}

#[tokio::test]
async fn test_shutdown_flushes_pending() {
    let h = harness();
    h.store.seed(seeded("s1", CompetencyScores::default()));
    let subject = SubjectId::from("s1");
    h.service.initialize(&subject).await.unwrap();

    h.service.start_sync();
    h.service.record_action(&subject, meeting()).unwrap();

    let report = h.service.shutdown().await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.reconciled, 1);
    assert!(!h.service.is_syncing());

    let stats = h.service.get_cache_stats();
    assert_eq!(stats.pending_update_count, 0);
    assert_eq!(stats.dirty_entry_count, 0);
}
