//! Postgres-backed store and change feed. Needs Docker:
//! `cargo test --test job_store_tests -- --ignored`

mod common;

use std::time::Duration;

use chrono::Utc;
use common::PostgresHarness;
use futures::StreamExt;
use test_context::test_context;
use uuid::Uuid;
use worker_core::kernel::{
    BaseChangeFeed, ChangeKind, EnrichedFields, JobStatus, JobStore, NewJob, PgChangeFeed,
    PostgresJobStore,
};

fn unique_url(label: &str) -> String {
    format!("https://example.com/jobs/{label}/{}", Uuid::new_v4())
}

async fn insert_collected(store: &PostgresJobStore, label: &str) -> worker_core::kernel::Job {
    store
        .insert(NewJob::builder().normalized_url(unique_url(label)).build())
        .await
        .expect("Failed to insert job")
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_claim_is_exclusive(ctx: &PostgresHarness) {
    let store = PostgresJobStore::new(ctx.db_pool.clone());
    let job = insert_collected(&store, "claim").await;
    assert_eq!(job.status, JobStatus::Collected);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move { store.claim(job.id).await.unwrap() }));
    }

    let mut winners = 0;
    for handle in handles {
        if let Some(claimed) = handle.await.unwrap() {
            assert_eq!(claimed.status, JobStatus::Processing);
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_finalize_writes_fields_once(ctx: &PostgresHarness) {
    let store = PostgresJobStore::new(ctx.db_pool.clone());
    let job = insert_collected(&store, "finalize").await;

    // Not claimed yet
    let fields = EnrichedFields::builder()
        .title("Senior Engineer")
        .company("Acme Corp")
        .skills(vec!["Go".to_string(), "SQL".to_string()])
        .build();
    assert!(!store.finalize(job.id, &fields).await.unwrap());

    store.claim(job.id).await.unwrap().unwrap();
    assert!(store.finalize(job.id, &fields).await.unwrap());

    let stored = store.find(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Finalized);
    assert_eq!(stored.title.as_deref(), Some("Senior Engineer"));
    assert_eq!(stored.skills, vec!["Go", "SQL"]);

    // Terminal: neither a second finalize nor an error write changes it
    assert!(!store.mark_error(job.id, "late failure").await.unwrap());
    assert!(store.claim(job.id).await.unwrap().is_none());
    assert_eq!(
        store.find(job.id).await.unwrap().unwrap().status,
        JobStatus::Finalized
    );
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_mark_error_mirrors_diagnostic(ctx: &PostgresHarness) {
    let store = PostgresJobStore::new(ctx.db_pool.clone());
    let job = insert_collected(&store, "error").await;
    store.claim(job.id).await.unwrap().unwrap();

    assert!(store
        .mark_error(job.id, "Scraper Error: net::ERR_NAME_NOT_RESOLVED")
        .await
        .unwrap());

    let stored = store.find(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Error);
    assert_eq!(
        stored.description.as_deref(),
        Some("Scraper Error: net::ERR_NAME_NOT_RESOLVED")
    );
    assert_eq!(stored.error_message, stored.description);
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_pending_and_stale_listings(ctx: &PostgresHarness) {
    let store = PostgresJobStore::new(ctx.db_pool.clone());
    let pending = insert_collected(&store, "pending").await;
    let stale = insert_collected(&store, "stale").await;
    let fresh = insert_collected(&store, "fresh").await;

    store.claim(stale.id).await.unwrap().unwrap();
    store.claim(fresh.id).await.unwrap().unwrap();
    sqlx::query("UPDATE jobs SET created_at = NOW() - INTERVAL '6 minutes' WHERE id = $1")
        .bind(stale.id)
        .execute(&ctx.db_pool)
        .await
        .unwrap();

    let pending_ids: Vec<Uuid> = store
        .list_pending()
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.id)
        .collect();
    assert!(pending_ids.contains(&pending.id));
    assert!(!pending_ids.contains(&stale.id));

    let threshold = Utc::now() - chrono::Duration::minutes(5);
    let stale_ids: Vec<Uuid> = store
        .list_stale(threshold)
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.id)
        .collect();
    assert!(stale_ids.contains(&stale.id));
    assert!(!stale_ids.contains(&fresh.id));
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_active_url_lookup_skips_deleted(ctx: &PostgresHarness) {
    let store = PostgresJobStore::new(ctx.db_pool.clone());
    let job = insert_collected(&store, "lookup").await;

    let found = store.find_active_by_url(&job.normalized_url).await.unwrap();
    assert_eq!(found.map(|j| j.id), Some(job.id));

    sqlx::query("UPDATE jobs SET is_deleted = true WHERE id = $1")
        .bind(job.id)
        .execute(&ctx.db_pool)
        .await
        .unwrap();
    assert!(store
        .find_active_by_url(&job.normalized_url)
        .await
        .unwrap()
        .is_none());
    assert!(store.claim(job.id).await.unwrap().is_none());
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_change_feed_delivers_inserts(ctx: &PostgresHarness) {
    let store = PostgresJobStore::new(ctx.db_pool.clone());
    let feed = PgChangeFeed::new(ctx.db_pool.clone());
    let mut events = feed.subscribe().await.unwrap();

    let job = insert_collected(&store, "notify").await;

    let event = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.next().await.unwrap().unwrap();
            let id = event.record.as_ref().and_then(|r| r["id"].as_str().map(str::to_string));
            if id == Some(job.id.to_string()) {
                return event;
            }
        }
    })
    .await
    .expect("no notification for inserted job");

    assert_eq!(event.kind, ChangeKind::Insert);
    assert_eq!(event.table, "jobs");
    let record = event.record.unwrap();
    assert_eq!(record["status"], "collected");
    assert_eq!(record["is_deleted"], false);
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_ping(ctx: &PostgresHarness) {
    let store = PostgresJobStore::new(ctx.db_pool.clone());
    store.ping().await.unwrap();
}
