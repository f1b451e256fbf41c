//! Bucket administration: creation, naming, deletion, policy, stats.

mod common;

use std::time::Duration;

use jobdesk::Error;

use common::harness;

#[tokio::test]
async fn create_bucket_checks_permission_name_and_uniqueness() {
    let h = harness();

    let err = h
        .registry
        .create_bucket(&h.alice, "BUG", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));

    for bad in ["ab", "wayTooLongName", "bug-1", ""] {
        let err = h.registry.create_bucket(&h.bree, bad, None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }), "name {bad:?}");
    }

    let bucket = h
        .registry
        .create_bucket(&h.bree, "BUG", Some("defects"))
        .await
        .unwrap();
    assert_eq!(bucket.key, "BUG");
    assert_eq!(bucket.description.as_deref(), Some("defects"));
    assert_eq!(bucket.due, h.registry.config().default_due);

    // Uniqueness is case-insensitive.
    let err = h.registry.create_bucket(&h.bree, "bug", None).await.unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));
}

#[tokio::test]
async fn find_bucket_round_trip() {
    let h = harness();
    h.bucket("BUG").await;

    let by_exact = h.registry.find_bucket(&h.alice, "BUG").await.unwrap();
    let by_case = h.registry.find_bucket(&h.alice, "bug").await.unwrap();
    let by_prefix = h.registry.find_bucket(&h.alice, "bu").await.unwrap();
    assert_eq!(by_exact.id, by_case.id);
    assert_eq!(by_exact.id, by_prefix.id);

    // An ambiguous prefix resolves to nothing.
    h.bucket("BUILD").await;
    let err = h.registry.find_bucket(&h.alice, "bu").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    // But an exact key wins over prefix ambiguity.
    assert!(h.registry.find_bucket(&h.alice, "bug").await.is_ok());

    h.registry.delete_bucket(&h.root, "BUG").await.unwrap();
    let err = h.registry.find_bucket(&h.alice, "BUG").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn delete_bucket_needs_superuser_and_the_exact_name() {
    let h = harness();
    h.bucket("BUG").await;
    let job = h.job("BUG").await;

    // Admin is not enough.
    let err = h.registry.delete_bucket(&h.bree, "BUG").await.unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));

    // Case must match exactly, superuser or not.
    let err = h.registry.delete_bucket(&h.root, "bug").await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput { .. }));

    h.registry.delete_bucket(&h.root, "BUG").await.unwrap();

    // The cascade leaves no orphan jobs behind.
    let err = h.registry.find_job(&h.bree, job.id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn rename_revalidates_pattern_and_uniqueness() {
    let h = harness();
    h.bucket("BUG").await;
    h.bucket("TASK").await;

    let err = h
        .registry
        .rename_bucket(&h.bree, "BUG", "x")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput { .. }));

    let err = h
        .registry
        .rename_bucket(&h.bree, "BUG", "task")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));

    // Renaming to your own key (case change) is not a collision.
    let renamed = h.registry.rename_bucket(&h.bree, "BUG", "Bug").await.unwrap();
    assert_eq!(renamed.key, "Bug");

    let renamed = h.registry.rename_bucket(&h.bree, "Bug", "ISSUE").await.unwrap();
    assert_eq!(renamed.key, "ISSUE");
    assert!(h.registry.find_bucket(&h.alice, "ISSUE").await.is_ok());
}

#[tokio::test]
async fn describe_policy_and_due_updates() {
    let h = harness();
    h.bucket("BUG").await;

    let err = h
        .registry
        .describe_bucket(&h.bree, "BUG", "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput { .. }));
    let updated = h
        .registry
        .describe_bucket(&h.bree, "BUG", "crash reports")
        .await
        .unwrap();
    assert_eq!(updated.description.as_deref(), Some("crash reports"));

    let updated = h
        .registry
        .set_lock_policy(&h.bree, "BUG", "see:all;post:all;admin:qa")
        .await
        .unwrap();
    assert_eq!(updated.policy, "see:all;post:all;admin:qa");

    let err = h
        .registry
        .set_due_duration(&h.bree, "BUG", Duration::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput { .. }));

    // A new due duration applies to jobs filed afterwards.
    h.registry
        .set_due_duration(&h.bree, "BUG", Duration::from_secs(24 * 60 * 60))
        .await
        .unwrap();
    let job = h.job("BUG").await;
    assert_eq!(job.due_date, job.submit_date + chrono::Duration::days(1));

    // All of these are staff-only.
    let err = h
        .registry
        .describe_bucket(&h.alice, "BUG", "mine now")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));
}

#[tokio::test]
async fn absurd_due_durations_are_rejected_not_applied() {
    let h = harness();
    h.bucket("BUG").await;

    // A duration this large would push due dates past the representable
    // date range; it must be refused up front so job filing keeps working.
    let err = h
        .registry
        .set_due_duration(&h.bree, "BUG", Duration::from_secs(1_000_000_000_000_000))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput { .. }));

    let job = h.job("BUG").await;
    assert_eq!(
        job.due_date,
        job.submit_date + chrono::Duration::from_std(h.registry.config().default_due).unwrap()
    );
}

#[tokio::test]
async fn visibility_filters_and_orders_buckets() {
    let h = harness();
    h.bucket("ZED").await;
    h.bucket("ANT").await;
    h.bucket("SECRET").await;
    h.gate.hide_bucket("SECRET");

    let keys: Vec<String> = h
        .registry
        .visible_buckets(&h.alice)
        .await
        .into_iter()
        .map(|b| b.key)
        .collect();
    assert_eq!(keys, vec!["ANT".to_string(), "ZED".to_string()]);

    // Staff see hidden buckets too.
    let keys: Vec<String> = h
        .registry
        .visible_buckets(&h.bree)
        .await
        .into_iter()
        .map(|b| b.key)
        .collect();
    assert_eq!(
        keys,
        vec!["ANT".to_string(), "SECRET".to_string(), "ZED".to_string()]
    );

    // An invisible bucket cannot be resolved either.
    let err = h.registry.find_bucket(&h.alice, "SECRET").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn bucket_stats_count_statuses_and_overdue() {
    let h = harness();
    h.bucket("BUG").await;
    let a = h.job("BUG").await;
    let b = h.job("BUG").await;
    h.job("BUG").await;

    h.registry.approve_job(&h.bree, a.id, None).await.unwrap();
    h.registry.deny_job(&h.bree, b.id, None).await.unwrap();

    let stats = h.registry.bucket_stats(&h.alice, "BUG").await.unwrap();
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.approved, 1);
    assert_eq!(stats.denied, 1);
    assert_eq!(stats.canceled, 0);
    assert_eq!(stats.overdue, 0);

    // Run the pending job past its due date.
    h.clock.advance(chrono::Duration::days(8));
    let stats = h.registry.bucket_stats(&h.alice, "BUG").await.unwrap();
    assert_eq!(stats.overdue, 1);
}

#[tokio::test]
async fn admin_events_are_broadcast_to_reachable_staff() {
    let h = harness();
    h.bucket("BUG").await;

    let messages = h.sink.messages();
    let (targets, text) = messages.last().unwrap();
    assert_eq!(text, "JOBS: Bucket created: BUG");
    assert!(targets.contains(&"bree".to_string()));
    assert!(targets.contains(&"root".to_string()));
    assert!(!targets.contains(&"alice".to_string()));

    h.registry.rename_bucket(&h.bree, "BUG", "ISSUE").await.unwrap();
    let messages = h.sink.messages();
    let (_, text) = messages.last().unwrap();
    assert_eq!(text, "JOBS: Bucket 'BUG' renamed to: ISSUE");
}

#[tokio::test]
async fn actor_resolution_goes_through_the_directory() {
    let h = harness();
    assert_eq!(h.registry.resolve_actor("Alice").unwrap(), h.alice);
    let err = h.registry.resolve_actor("nobody").unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}
