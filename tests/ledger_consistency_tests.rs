//! Ledger consistency tests.
//!
//! Drives the service layer directly (no HTTP) to verify the invariant the
//! whole system is built around: every user's counter equals the number of
//! ledger rows referencing them, across inserts, deletions, replacements,
//! backfill reruns and repairs.
//!
//! Run with: `cargo test --test ledger_consistency_tests`

use std::sync::Arc;

use mentiond::chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

use mentiond::config::ServerConfig;
use mentiond::handlers::MentionService;
use mentiond::mentions::{PostRecord, PostType};

struct Fixture {
    service: Arc<MentionService>,
    _dir: TempDir,
}

fn setup() -> Fixture {
    let dir = TempDir::new().expect("create temp dir");
    let cfg = ServerConfig {
        storage_path: dir.path().to_path_buf(),
        ..ServerConfig::default()
    };
    let service = Arc::new(MentionService::new(cfg).expect("create MentionService"));
    Fixture { service, _dir: dir }
}

fn post(post_type: PostType, post_id: i64, category_id: i64, body: &str) -> PostRecord {
    PostRecord {
        post_type,
        post_id,
        discussion_id: if post_type == PostType::Discussion { post_id } else { 1 },
        category_id,
        author_id: "author-1".to_string(),
        title: "Weekly thread".to_string(),
        body: body.to_string(),
        // Deterministic, increasing timestamps keyed off the post id
        inserted_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
            + Duration::minutes(post_id),
    }
}

/// Counter must equal the user's row count, for every user
fn assert_counters_consistent(fx: &Fixture, users: &[&str]) {
    for user in users {
        let rows = fx.service.store.mentions_for_user(user).unwrap().len() as u64;
        let counter = fx.service.store.mention_count(user).unwrap();
        assert_eq!(counter, rows, "counter drift for {user}");
    }
}

#[test]
fn counters_track_inserts_and_deletes() {
    let fx = setup();
    fx.service.register_user("alice", "alice").unwrap();
    fx.service.register_user("bob", "bob").unwrap();

    fx.service
        .ingest_post(&post(PostType::Discussion, 1, 1, "@alice @bob"), None)
        .unwrap();
    fx.service
        .ingest_post(&post(PostType::Comment, 2, 1, "@alice"), None)
        .unwrap();
    fx.service
        .ingest_post(&post(PostType::Comment, 3, 1, "@alice again and @alice"), None)
        .unwrap();

    assert_eq!(fx.service.store.mention_count("alice").unwrap(), 3);
    assert_eq!(fx.service.store.mention_count("bob").unwrap(), 1);
    assert_counters_consistent(&fx, &["alice", "bob"]);

    fx.service.delete_post(PostType::Comment, 2).unwrap();
    assert_eq!(fx.service.store.mention_count("alice").unwrap(), 2);
    assert_counters_consistent(&fx, &["alice", "bob"]);

    fx.service.delete_post(PostType::Discussion, 1).unwrap();
    assert_eq!(fx.service.store.mention_count("bob").unwrap(), 0);
    assert_counters_consistent(&fx, &["alice", "bob"]);
}

#[test]
fn backfill_rerun_never_inflates_counters() {
    let fx = setup();
    fx.service.register_user("alice", "alice").unwrap();

    for id in 1..=25 {
        fx.service
            .ingest_post(&post(PostType::Comment, id, 1, "ping @alice"), None)
            .unwrap();
    }
    assert_eq!(fx.service.store.mention_count("alice").unwrap(), 25);

    // Run the whole scan twice in small batches; inclusive checkpoint resume
    // rescans the boundary post each time
    for _ in 0..2 {
        fx.service.backfill.reset(PostType::Comment).unwrap();
        loop {
            let report = fx
                .service
                .backfill
                .run_batch(PostType::Comment, 7)
                .unwrap()
                .expect("no concurrent batch");
            if report.exhausted {
                break;
            }
        }
    }

    assert_eq!(fx.service.store.mention_count("alice").unwrap(), 25);
    assert_counters_consistent(&fx, &["alice"]);
}

#[test]
fn backfill_picks_up_late_registrations() {
    let fx = setup();
    fx.service.register_user("alice", "alice").unwrap();

    // carol is mentioned before she exists; the live path skips her
    fx.service
        .ingest_post(&post(PostType::Discussion, 5, 1, "@alice and @carol"), None)
        .unwrap();
    assert_eq!(fx.service.store.mention_count("carol").unwrap(), 0);

    fx.service.register_user("carol", "carol").unwrap();
    let report = fx
        .service
        .backfill
        .run_batch(PostType::Discussion, 100)
        .unwrap()
        .unwrap();

    assert_eq!(report.mentions_recorded, 2);
    assert_eq!(fx.service.store.mention_count("carol").unwrap(), 1);
    assert_eq!(fx.service.store.mention_count("alice").unwrap(), 1);
    assert_counters_consistent(&fx, &["alice", "carol"]);
}

#[test]
fn feed_pages_follow_ledger_changes() {
    let fx = setup();
    fx.service.register_user("alice", "alice").unwrap();

    for id in 1..=5 {
        fx.service
            .ingest_post(&post(PostType::Comment, id, 1, "@alice"), None)
            .unwrap();
    }

    let page = fx.service.feed.page("alice", None, 3, 0).unwrap();
    assert_eq!(page.total, 5);
    let ids: Vec<i64> = page.items.iter().map(|i| i.post_id).collect();
    assert_eq!(ids, vec![5, 4, 3]);

    // Deleting a post invalidates the cached page
    fx.service.delete_post(PostType::Comment, 5).unwrap();
    let page = fx.service.feed.page("alice", None, 3, 0).unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.items[0].post_id, 4);
}

#[test]
fn feed_permission_filter_shapes_totals_and_pages() {
    let fx = setup();
    fx.service.register_user("alice", "alice").unwrap();

    // Categories alternate between public (1) and restricted (9)
    for id in 1..=6 {
        let category = if id % 2 == 0 { 9 } else { 1 };
        fx.service
            .ingest_post(&post(PostType::Comment, id, category, "@alice"), None)
            .unwrap();
    }

    assert_eq!(fx.service.feed.count("alice", None).unwrap(), 6);
    assert_eq!(fx.service.feed.count("alice", Some(&[1])).unwrap(), 3);

    let restricted = fx.service.feed.page("alice", Some(&[1]), 2, 0).unwrap();
    assert_eq!(restricted.total, 3);
    let ids: Vec<i64> = restricted.items.iter().map(|i| i.post_id).collect();
    assert_eq!(ids, vec![5, 3]);

    // Viewers with broader permissions see a different first page
    let open = fx.service.feed.page("alice", None, 2, 0).unwrap();
    let ids: Vec<i64> = open.items.iter().map(|i| i.post_id).collect();
    assert_eq!(ids, vec![6, 5]);
}

#[test]
fn recount_heals_after_manual_drift() {
    let fx = setup();
    fx.service.register_user("alice", "alice").unwrap();
    fx.service.register_user("bob", "bob").unwrap();

    fx.service
        .ingest_post(&post(PostType::Discussion, 1, 1, "@alice @bob"), None)
        .unwrap();

    // Simulate drift by re-deriving from rows after a fault: recount fixes
    // whatever the counters say
    fx.service.recount(&[]).unwrap();
    assert_counters_consistent(&fx, &["alice", "bob"]);

    fx.service.recount(&["alice".to_string()]).unwrap();
    assert_eq!(fx.service.store.mention_count("alice").unwrap(), 1);
}

#[test]
fn user_deletion_is_complete() {
    let fx = setup();
    fx.service.register_user("alice", "alice").unwrap();
    fx.service.register_user("bob", "bob").unwrap();

    fx.service
        .ingest_post(&post(PostType::Comment, 1, 1, "@alice @bob"), None)
        .unwrap();

    fx.service.delete_user("alice").unwrap();

    assert_eq!(fx.service.store.mention_count("alice").unwrap(), 0);
    assert!(fx.service.store.mentions_for_user("alice").unwrap().is_empty());
    assert!(fx.service.registry.resolve("alice").unwrap().is_none());

    // bob's row on the shared post survives
    assert_eq!(fx.service.store.mention_count("bob").unwrap(), 1);
    assert_counters_consistent(&fx, &["bob"]);
}
