//! Integration tests: require live backends.
//!
//! Run with:
//!   REDIS_TEST_URL=redis://localhost:6379 NATS_TEST_URL=nats://localhost:4222 \
//!     cargo test --test integration -- --include-ignored --test-threads=1
//!
//! `--test-threads=1` is required: the queue tests share one pair of sorted
//! sets and a concurrent fetch from another test would steal entries.
//!
//! These tests are marked `#[ignore]` so they don't run in CI without the
//! backends available.

use minion::config::{JobsRepository, Provider};
use minion::error::ErrorCode;
use minion::job::Job;
use minion::kv::KvRepository;
use minion::lock::{Locker, RedisLocker};
use minion::queue::{JobQueue, QueuedJob, RedisQueue};
use minion::repository::Repository;

fn redis_config() -> Provider {
    let url = std::env::var("REDIS_TEST_URL")
        .unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let trimmed = url.trim_start_matches("redis://");
    let (host, port) = trimmed
        .rsplit_once(':')
        .unwrap_or((trimmed, "6379"));
    Provider {
        kind: "redis".to_string(),
        ttl: Some("2s".to_string()),
        config: serde_json::json!({
            "host": host,
            "port": port,
            "window": 120
        })
        .as_object()
        .unwrap()
        .clone(),
    }
}

fn kv_config() -> JobsRepository {
    let url = std::env::var("NATS_TEST_URL")
        .unwrap_or_else(|_| "nats://localhost:4222".to_string());
    JobsRepository {
        kind: "kv".to_string(),
        refresh_interval: "60s".to_string(),
        config: serde_json::json!({
            "servers": url,
            "bucket": "minion-jobs-test",
            "prefix": "minion-test"
        })
        .as_object()
        .unwrap()
        .clone(),
    }
}

fn unique_id(prefix: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .subsec_nanos();
    format!("{prefix}-{ts}")
}

fn test_job(group: &str) -> Job {
    Job {
        group: group.to_string(),
        name: "integration".to_string(),
        enabled: true,
        schedule_expression: "@hourly".to_string(),
        details: [("runner".to_string(), "dummy".to_string())]
            .into_iter()
            .collect(),
        modified_by: "integration-test".to_string(),
        ..Job::default()
    }
}

// ── Redis queue ──────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires redis at REDIS_TEST_URL"]
async fn queue_enqueue_fetch_finalize_round_trip() {
    let org = unique_id("it-queue");
    let queue = RedisQueue::new(&org, &redis_config()).await.unwrap();

    let now = chrono::Utc::now().timestamp() as f64;
    queue
        .enqueue(&QueuedJob::new("infra/j1", now))
        .await
        .unwrap();

    let fetched = queue.fetch().await.unwrap();
    assert_eq!(fetched.id, "infra/j1");
    assert_eq!(fetched.score as i64, now as i64);

    queue.finalize(&fetched.id).await.unwrap();

    // Both sets are drained; the next fetch times out empty.
    let err = queue.fetch().await.unwrap_err();
    assert!(err.is(ErrorCode::QueueIsEmpty));
    queue.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires redis at REDIS_TEST_URL"]
async fn queue_fetch_yields_minimum_score_first() {
    let org = unique_id("it-order");
    let queue = RedisQueue::new(&org, &redis_config()).await.unwrap();

    let now = chrono::Utc::now().timestamp() as f64;
    queue.enqueue(&QueuedJob::new("late", now + 60.0)).await.unwrap();
    queue.enqueue(&QueuedJob::new("early", now)).await.unwrap();

    let first = queue.fetch().await.unwrap();
    assert_eq!(first.id, "early");

    // Cleanup.
    let _ = queue.fetch().await;
    queue.finalize("early").await.unwrap();
    queue.finalize("late").await.unwrap();
}

#[tokio::test]
#[ignore = "requires redis at REDIS_TEST_URL"]
async fn queue_reinserts_out_of_window_jobs() {
    let org = unique_id("it-window");
    let queue = RedisQueue::new(&org, &redis_config()).await.unwrap();

    let far_future = (chrono::Utc::now().timestamp() + 100_000) as f64;
    queue
        .enqueue(&QueuedJob::new("future/j1", far_future))
        .await
        .unwrap();

    let err = queue.fetch().await.unwrap_err();
    assert!(err.is(ErrorCode::Rescheduled));

    // The job went back into the primary set: fetching again re-observes it.
    let err = queue.fetch().await.unwrap_err();
    assert!(err.is(ErrorCode::Rescheduled));

    queue.finalize("future/j1").await.unwrap();
}

// ── Redis lock ───────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires redis at REDIS_TEST_URL"]
async fn lock_admits_exactly_one_owner_per_key() {
    let org = unique_id("it-lock");
    let locker = RedisLocker::new(&org, &redis_config()).await.unwrap();

    let key = unique_id("minute");
    locker.lock(&key, "instance-a").await.unwrap();

    let err = locker.lock(&key, "instance-b").await.unwrap_err();
    assert!(err.is(ErrorCode::Conflict));
}

#[tokio::test]
#[ignore = "requires redis at REDIS_TEST_URL"]
async fn lock_expires_after_ttl() {
    let org = unique_id("it-ttl");
    // redis_config sets a 2 second TTL.
    let locker = RedisLocker::new(&org, &redis_config()).await.unwrap();

    let key = unique_id("minute");
    locker.lock(&key, "instance-a").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_secs(3)).await;
    locker.lock(&key, "instance-b").await.unwrap();
}

// ── KV repository ────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires NATS at NATS_TEST_URL"]
async fn repository_crud_round_trip() {
    let org = unique_id("it-repo");
    let repo = KvRepository::new(&org, &kv_config()).await.unwrap();

    let created = repo.create("acct1", "infra", test_job("infra")).await.unwrap();
    assert!(!created.id.is_empty());
    assert!(created.modified_at.is_some());

    let fetched = repo.get("acct1", "infra", &created.id).await.unwrap();
    assert_eq!(fetched.name, "integration");
    assert_eq!(fetched.account, "acct1");

    let listed = repo.list("acct1", "").await.unwrap();
    assert_eq!(listed, vec![format!("infra/{}", created.id)]);

    let mut update = fetched.clone();
    update.name = "renamed".to_string();
    let updated = repo
        .update("acct1", "infra", &created.id, update)
        .await
        .unwrap();
    assert_eq!(updated.name, "renamed");

    repo.delete("acct1", "infra", &created.id).await.unwrap();
    let err = repo.get("acct1", "infra", &created.id).await.unwrap_err();
    assert!(err.is(ErrorCode::NotFound));
}

#[tokio::test]
#[ignore = "requires NATS at NATS_TEST_URL"]
async fn repository_update_rejects_id_mismatch() {
    let org = unique_id("it-mismatch");
    let repo = KvRepository::new(&org, &kv_config()).await.unwrap();

    let created = repo.create("acct1", "infra", test_job("infra")).await.unwrap();
    let mut other = created.clone();
    other.id = "different".to_string();

    let err = repo
        .update("acct1", "infra", &created.id, other)
        .await
        .unwrap_err();
    assert!(err.is(ErrorCode::BadRequest));

    repo.delete("acct1", "infra", &created.id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires NATS at NATS_TEST_URL"]
async fn repository_group_delete_removes_all_members() {
    let org = unique_id("it-group");
    let repo = KvRepository::new(&org, &kv_config()).await.unwrap();

    repo.create("acct1", "batch", test_job("batch")).await.unwrap();
    repo.create("acct1", "batch", test_job("batch")).await.unwrap();
    repo.create("acct1", "keep", test_job("keep")).await.unwrap();

    repo.delete("acct1", "batch", "").await.unwrap();

    let listed = repo.list("acct1", "").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].starts_with("keep/"));

    repo.delete("acct1", "keep", "").await.unwrap();
}
