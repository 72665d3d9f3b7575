//! End-to-end curation behaviour through the `Playbook` facade.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use common::{FlakyIndex, KeywordEmbedder, memory_playbook, test_config};
use playbook_core::{
    ApplyOutcome, BulletId, CurationOutcome, DeltaOperation, HashingEmbedder,
    InMemorySnapshotBackend, InsightOutcome, Playbook, PlaybookConfig, PlaybookError,
    ReflectionInsight, RejectionReason,
};

fn insight(text: &str, section: &str, confidence: f32) -> ReflectionInsight {
    ReflectionInsight::new(text, section, confidence)
}

async fn assert_signup_validation_scenario(playbook: &Playbook) {
    assert!(playbook.is_empty().await);

    let first = playbook
        .submit_insight(&insight("Always validate email format", "Validation", 0.9))
        .await
        .unwrap();
    assert!(matches!(first, InsightOutcome::Applied(_)));

    let bullets = playbook.list(None).await.unwrap();
    assert_eq!(bullets.len(), 1);
    let email = bullets[0].clone();
    assert_eq!((email.helpful_count, email.harmful_count), (0, 0));
    assert_eq!(email.section, "Validation");

    let second = playbook
        .submit_insight(&insight("Validate email format before processing", "Validation", 0.85))
        .await
        .unwrap();
    match second {
        InsightOutcome::Applied(record) => {
            assert_eq!(record.affected, vec![email.id.clone()]);
            assert!(record.operations[0].starts_with("UPDATE"));
        }
        other => panic!("expected an applied update, got {:?}", other),
    }

    let bullets = playbook.list(None).await.unwrap();
    assert_eq!(bullets.len(), 1);
    assert_eq!(bullets[0].id, email.id);
    assert_eq!(bullets[0].helpful_count, 1);
    assert!(bullets[0].content.contains("Validate email format before processing"));

    playbook
        .submit_insight(&insight("Use backoff for payment retries", "Payments", 0.8))
        .await
        .unwrap();
    assert_eq!(playbook.len().await, 2);

    let results = playbook.retrieve_relevant("how to validate a signup form", 5).await.unwrap();
    assert_eq!(results[0].id, email.id);
    let payment_rank = results.iter().position(|b| b.section == "Payments");
    assert!(payment_rank.is_none_or(|rank| rank > 0));
}

#[tokio::test]
async fn test_signup_validation_scenario() {
    common::init_tracing();
    let (playbook, _, _) = memory_playbook().await;
    assert_signup_validation_scenario(&playbook).await;
}

#[tokio::test]
async fn test_signup_validation_scenario_with_hashing_embedder() {
    let playbook = Playbook::open(
        PlaybookConfig::for_hashing_embedder(),
        Arc::new(HashingEmbedder::default()),
        Arc::new(InMemorySnapshotBackend::new()),
    )
    .await
    .unwrap();
    assert_signup_validation_scenario(&playbook).await;
}

#[tokio::test]
async fn test_low_confidence_rejected_without_embedding() {
    let (playbook, embedder, backend) = memory_playbook().await;

    let outcome =
        playbook.submit_insight(&insight("Validate email format", "Validation", 0.3)).await.unwrap();
    assert!(matches!(
        outcome,
        InsightOutcome::Rejected(RejectionReason::LowConfidence { .. })
    ));
    assert_eq!(embedder.calls(), 0);
    assert!(playbook.is_empty().await);
    assert_eq!(backend.saves(), 0);
}

#[tokio::test]
async fn test_embedding_failure_leaves_store_untouched() {
    let (playbook, embedder, backend) = memory_playbook().await;
    playbook.seed_bullet("Validate email format", "Validation").await.unwrap();
    let before = playbook.snapshot().await;
    let saves = backend.saves();

    embedder.set_failing(true);
    let err = playbook
        .submit_insight(&insight("Log payment timeouts", "Payments", 0.9))
        .await
        .unwrap_err();
    assert!(matches!(err, PlaybookError::EmbeddingUnavailable(_)));
    assert!(matches!(
        playbook.retrieve_relevant("email", 3).await,
        Err(PlaybookError::EmbeddingUnavailable(_))
    ));

    assert_eq!(playbook.snapshot().await, before);
    assert_eq!(backend.saves(), saves);
}

#[tokio::test]
async fn test_related_bullets_are_deduplicated() {
    let (playbook, _, _) = memory_playbook().await;
    let older = playbook.seed_bullet("Validate email", "Validation").await.unwrap();
    let newer = playbook.seed_bullet("Check email format", "Validation").await.unwrap();
    playbook.submit_feedback(&[newer.id.clone()], true).await.unwrap();
    playbook.submit_feedback(&[older.id.clone()], false).await.unwrap();

    let outcome = playbook
        .submit_insight(&insight("Validate email format", "Validation", 0.9))
        .await
        .unwrap();
    let InsightOutcome::Applied(record) = outcome else {
        panic!("insight was rejected");
    };
    assert_eq!(record.operations.len(), 2);
    assert!(record.operations[1].starts_with("DEDUPLICATE"));

    // The higher-scoring bullet absorbed the other's counters.
    let winner = playbook.get(&newer.id).await.unwrap();
    assert_eq!((winner.helpful_count, winner.harmful_count), (1, 1));
    assert!(matches!(playbook.get(&older.id).await, Err(PlaybookError::NotFound(_))));
    assert_eq!(playbook.len().await, 2);
    assert!(playbook.check_consistency().await.is_consistent());
}

#[tokio::test]
async fn test_delta_application_is_idempotent() {
    let (playbook, _, backend) = memory_playbook().await;
    let bullet = playbook.seed_bullet("Validate email format", "Validation").await.unwrap();

    let CurationOutcome::Delta(delta) = playbook
        .process_insight(&insight("Validate the email format", "Validation", 0.9))
        .await
        .unwrap()
    else {
        panic!("insight was rejected");
    };
    assert!(matches!(delta.operations()[0], DeltaOperation::Update { .. }));

    assert!(playbook.apply_delta(&delta).await.unwrap().is_applied());
    let saves = backend.saves();
    assert_eq!(playbook.apply_delta(&delta).await.unwrap(), ApplyOutcome::AlreadyApplied(delta.id()));

    assert_eq!(playbook.get(&bullet.id).await.unwrap().helpful_count, 1);
    assert_eq!(playbook.history().await.len(), 2);
    assert_eq!(backend.saves(), saves);
}

#[tokio::test]
async fn test_stale_delta_fails_and_rolls_back() {
    let (playbook, _, _) = memory_playbook().await;
    let bullet = playbook.seed_bullet("Validate email format", "Validation").await.unwrap();

    let CurationOutcome::Delta(delta) = playbook
        .process_insight(&insight("Validate email format", "Validation", 0.9))
        .await
        .unwrap()
    else {
        panic!("insight was rejected");
    };
    playbook.remove_bullet(&bullet.id).await.unwrap();

    let err = playbook.apply_delta(&delta).await.unwrap_err();
    assert!(matches!(err, PlaybookError::InvalidDelta(_)));
    assert!(playbook.is_empty().await);
}

#[tokio::test]
async fn test_index_failure_rolls_back_whole_delta() {
    let fail = Arc::new(AtomicBool::new(false));
    let playbook = Playbook::open_with_index(
        test_config(),
        Arc::new(KeywordEmbedder::new()),
        Arc::new(InMemorySnapshotBackend::new()),
        Box::new(FlakyIndex::new(fail.clone())),
    )
    .await
    .unwrap();
    playbook.seed_bullet("Validate email", "Validation").await.unwrap();
    let before = playbook.snapshot().await;

    fail.store(true, Ordering::SeqCst);
    let err = playbook
        .submit_insight(&insight("Log payment timeouts", "Payments", 0.9))
        .await
        .unwrap_err();
    assert!(matches!(err, PlaybookError::Index(_)));
    assert_eq!(playbook.snapshot().await, before);
    assert!(playbook.check_consistency().await.is_consistent());

    fail.store(false, Ordering::SeqCst);
    playbook.submit_insight(&insight("Log payment timeouts", "Payments", 0.9)).await.unwrap();
    assert_eq!(playbook.len().await, 2);
}

#[tokio::test]
async fn test_ids_unique_and_never_reused() {
    let (playbook, _, _) = memory_playbook().await;
    let mut issued = HashSet::new();

    for round in 0..3 {
        let mut created = Vec::new();
        for i in 0..5 {
            let bullet = playbook
                .seed_bullet(&format!("strategy {} {}", round, i), "general")
                .await
                .unwrap();
            assert!(issued.insert(bullet.id.clone()), "reused id {}", bullet.id);
            created.push(bullet.id);
        }
        for id in created.iter().step_by(2) {
            playbook.remove_bullet(id).await.unwrap();
        }
    }
    assert_eq!(issued.len(), 15);
}

#[tokio::test]
async fn test_counters_only_grow_without_reset() {
    let (playbook, _, _) = memory_playbook().await;
    let bullet = playbook.seed_bullet("Validate email format", "Validation").await.unwrap();
    let mut last = (0, 0);

    for step in 0..10 {
        if step % 3 == 0 {
            playbook
                .submit_insight(&insight("Validate email format", "Validation", 0.9))
                .await
                .unwrap();
        } else {
            playbook.submit_feedback(&[bullet.id.clone()], step % 2 == 0).await.unwrap();
        }
        let current = playbook.get(&bullet.id).await.unwrap();
        assert!(current.helpful_count >= last.0);
        assert!(current.harmful_count >= last.1);
        last = (current.helpful_count, current.harmful_count);
    }
    assert_eq!(playbook.len().await, 1);
}

#[tokio::test]
async fn test_retrieval_never_returns_negative_scores() {
    let (playbook, _, _) = memory_playbook().await;
    let bad = playbook.seed_bullet("Validate email", "Validation").await.unwrap();
    let good = playbook.seed_bullet("Validate signup form", "Validation").await.unwrap();
    playbook.submit_feedback(&[bad.id.clone()], false).await.unwrap();

    let results = playbook.retrieve_relevant("validate email", 10).await.unwrap();
    assert!(results.iter().all(|b| b.net_score() >= 0));
    assert_eq!(results.iter().map(|b| b.id.clone()).collect::<Vec<BulletId>>(), vec![good.id]);

    let context = playbook.context_for("validate email", 10).await.unwrap();
    assert!(!context.contains(bad.id.as_str()));
}
