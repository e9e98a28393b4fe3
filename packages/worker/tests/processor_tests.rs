mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::*;
use test_context::test_context;
use uuid::Uuid;
use worker_core::domains::jobs::{ProcessOutcome, STALE_JOB_MESSAGE};
use worker_core::domains::jobs::SchedulerConfig;
use worker_core::kernel::{
    ExtractorConfig, JobStatus, JobStore, MockAI, MockPageExtractor, MockPageFetcher,
    RetryingPageExtractor, TestDependencies,
};

// =============================================================================
// End to end
// =============================================================================

#[tokio::test]
async fn test_collected_job_is_finalized() {
    let deps = TestDependencies::new().with_ai(MockAI::new().with_response(ACME_RESPONSE));
    let ctx = TestHarness::with_deps(deps);
    let j1 = ctx
        .deps
        .store
        .add_collected_with_id(Uuid::new_v4(), "https://jobs.example.com/acme/senior-engineer");

    let outcome = ctx.processor().process(j1.id).await;

    assert_eq!(outcome, ProcessOutcome::Finalized);
    let stored = ctx.deps.store.get(j1.id).unwrap();
    assert_eq!(stored.status, JobStatus::Finalized);
    assert_eq!(stored.title.as_deref(), Some("Senior Engineer"));
    assert_eq!(stored.company.as_deref(), Some("Acme Corp"));
    assert_eq!(stored.skills, vec!["Go", "SQL"]);
    assert_eq!(stored.work_type.as_deref(), Some("Remote"));
    assert_eq!(stored.error_message, None);

    assert_eq!(ctx.deps.extractor.calls(), vec![j1.normalized_url.clone()]);
    let prompts = ctx.deps.ai.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(&j1.normalized_url));
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_url_is_tried_twice_then_marked_error() {
    let fetcher = MockPageFetcher::new()
        .with_result(Err(unreachable_error()))
        .with_result(Err(unreachable_error()));
    let extractor = RetryingPageExtractor::new(fetcher.clone(), ExtractorConfig::default());
    let ctx = TestHarness::new().with_extractor(Arc::new(extractor));
    let job = ctx.deps.store.add_collected("https://unreachable.invalid/job");

    let outcome = ctx.processor().process(job.id).await;

    assert!(matches!(outcome, ProcessOutcome::Failed(_)));
    assert_eq!(fetcher.attempts(), 2);
    let agents = fetcher.user_agents();
    assert_ne!(agents[0], agents[1], "each attempt should rotate the user agent");

    let stored = ctx.deps.store.get(job.id).unwrap();
    assert_eq!(stored.status, JobStatus::Error);
    let description = stored.description.unwrap();
    assert!(description.starts_with("Scraper Error: "));
    assert!(description.contains("net::ERR_NAME_NOT_RESOLVED"));
    assert_eq!(stored.error_message.as_deref(), Some(description.as_str()));
    assert!(ctx.deps.ai.prompts().is_empty(), "AI must not be called after a failed scrape");
}

#[tokio::test(start_paused = true)]
async fn test_short_content_is_retried_then_marked_error() {
    let fetcher = MockPageFetcher::new()
        .with_result(Ok(page_with_chars(120)))
        .with_result(Ok(page_with_chars(499)));
    let extractor = RetryingPageExtractor::new(fetcher.clone(), ExtractorConfig::default());
    let ctx = TestHarness::new().with_extractor(Arc::new(extractor));
    let job = ctx.deps.store.add_collected("https://example.com/bot-wall");

    ctx.processor().process(job.id).await;

    assert_eq!(fetcher.attempts(), 2);
    let stored = ctx.deps.store.get(job.id).unwrap();
    assert_eq!(stored.status, JobStatus::Error);
    assert!(stored.description.unwrap().contains("too short"));
}

#[tokio::test(start_paused = true)]
async fn test_short_content_then_full_page_succeeds() {
    let fetcher = MockPageFetcher::new()
        .with_result(Ok(page_with_chars(120)))
        .with_result(Ok(page_with_chars(800)));
    let extractor = RetryingPageExtractor::new(fetcher.clone(), ExtractorConfig::default());
    let deps = TestDependencies::new().with_ai(MockAI::new().with_response(ANALYST_RESPONSE));
    let ctx = TestHarness::with_deps(deps).with_extractor(Arc::new(extractor));
    let job = ctx.deps.store.add_collected("https://example.com/analyst");

    assert_eq!(ctx.processor().process(job.id).await, ProcessOutcome::Finalized);
    assert_eq!(fetcher.attempts(), 2);
    assert_eq!(
        ctx.deps.store.get(job.id).unwrap().title.as_deref(),
        Some("Data Analyst")
    );
}

#[tokio::test]
async fn test_ai_failure_marks_error() {
    let deps = TestDependencies::new().with_ai(MockAI::new().with_error("Gemini API Error (429): quota exhausted"));
    let ctx = TestHarness::with_deps(deps);
    let job = ctx.deps.store.add_collected("https://example.com/jobs/quota");

    let outcome = ctx.processor().process(job.id).await;

    let ProcessOutcome::Failed(message) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(message.contains("AI request failed"));
    assert!(message.contains("quota exhausted"));
    assert_eq!(ctx.deps.store.status_of(job.id), Some(JobStatus::Error));
    // Not retried
    assert_eq!(ctx.deps.ai.prompts().len(), 1);
}

// =============================================================================
// Claim exclusivity and idempotent dispatch
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_only_one_concurrent_claim_wins(ctx: &TestHarness) {
    let job = ctx.deps.store.add_collected("https://example.com/jobs/race");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = ctx.deps.store.clone();
        handles.push(tokio::spawn(async move { store.claim(job.id).await.unwrap() }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(ctx.deps.store.status_of(job.id), Some(JobStatus::Processing));
}

#[tokio::test]
async fn test_concurrent_dispatch_processes_once() {
    let extractor = MockPageExtractor::new().with_delay(Duration::from_millis(50));
    let deps = TestDependencies::new()
        .with_extractor(extractor)
        .with_ai(MockAI::new().with_response(ACME_RESPONSE));
    let ctx = TestHarness::with_deps(deps);
    let job = ctx.deps.store.add_collected("https://example.com/jobs/dup");

    let push = ctx.processor();
    let poll = ctx.processor();
    let (a, b) = tokio::join!(push.process(job.id), poll.process(job.id));

    let mut outcomes = vec![a, b];
    outcomes.sort_by_key(|o| matches!(o, ProcessOutcome::Skipped));
    assert_eq!(outcomes, vec![ProcessOutcome::Finalized, ProcessOutcome::Skipped]);
    assert_eq!(ctx.deps.extractor.calls().len(), 1);
    assert_eq!(ctx.deps.ai.prompts().len(), 1);
}

#[tokio::test]
async fn test_repeat_dispatch_is_a_no_op() {
    let deps = TestDependencies::new().with_ai(MockAI::new().with_response(ACME_RESPONSE));
    let ctx = TestHarness::with_deps(deps);
    let job = ctx.deps.store.add_collected("https://example.com/jobs/again");
    let processor = ctx.processor();

    assert_eq!(processor.process(job.id).await, ProcessOutcome::Finalized);
    let after_first = ctx.deps.store.get(job.id).unwrap();

    assert_eq!(processor.process(job.id).await, ProcessOutcome::Skipped);
    assert_eq!(ctx.deps.store.get(job.id).unwrap(), after_first);
    assert_eq!(ctx.deps.extractor.calls().len(), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_error_and_deleted_jobs_are_not_reprocessed(ctx: &TestHarness) {
    let errored = ctx.deps.store.add_collected("https://example.com/jobs/errored");
    ctx.deps.store.set_status(errored.id, JobStatus::Error);
    let deleted = ctx.deps.store.add_collected("https://example.com/jobs/deleted");
    ctx.deps.store.soft_delete(deleted.id);

    let processor = ctx.processor();
    assert_eq!(processor.process(errored.id).await, ProcessOutcome::Skipped);
    assert_eq!(processor.process(deleted.id).await, ProcessOutcome::Skipped);

    assert_eq!(ctx.deps.store.status_of(errored.id), Some(JobStatus::Error));
    assert_eq!(ctx.deps.store.status_of(deleted.id), Some(JobStatus::Collected));
    assert!(ctx.deps.extractor.calls().is_empty());
}

// =============================================================================
// Timeout and persist failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_slow_job_times_out() {
    let extractor = MockPageExtractor::new().with_delay(Duration::from_secs(200));
    let deps = TestDependencies::new()
        .with_extractor(extractor)
        .with_ai(MockAI::new().with_response(ACME_RESPONSE));
    let ctx = TestHarness::with_deps(deps);
    let job = ctx.deps.store.add_collected("https://example.com/jobs/slow");

    let outcome = ctx.processor().process(job.id).await;

    assert_eq!(
        outcome,
        ProcessOutcome::Failed("Job processing timed out after 120s".to_string())
    );
    let stored = ctx.deps.store.get(job.id).unwrap();
    assert_eq!(stored.status, JobStatus::Error);
    assert_eq!(stored.description.as_deref(), Some("Job processing timed out after 120s"));
    assert!(ctx.deps.ai.prompts().is_empty());
}

#[tokio::test]
async fn test_persist_failure_leaves_job_for_reaper() {
    let deps = TestDependencies::new().with_ai(MockAI::new().with_response(ACME_RESPONSE));
    let ctx = TestHarness::with_deps(deps);
    let job = ctx.deps.store.add_collected("https://example.com/jobs/persist");
    ctx.deps.store.fail_finalize(true);

    let outcome = ctx.processor().process(job.id).await;

    assert!(matches!(outcome, ProcessOutcome::Abandoned(_)));
    assert_eq!(ctx.deps.store.status_of(job.id), Some(JobStatus::Processing));

    // Once it is old enough the reaper settles it.
    ctx.deps
        .store
        .set_created_at(job.id, Utc::now() - chrono::Duration::minutes(6));
    let reaped = ctx
        .scheduler(SchedulerConfig::default())
        .reap_stale()
        .await
        .unwrap();

    assert_eq!(reaped, 1);
    let stored = ctx.deps.store.get(job.id).unwrap();
    assert_eq!(stored.status, JobStatus::Error);
    assert_eq!(stored.description.as_deref(), Some(STALE_JOB_MESSAGE));
}

#[tokio::test]
async fn test_failed_error_write_is_abandoned() {
    let deps = TestDependencies::new().with_ai(MockAI::new().with_response("not json"));
    let ctx = TestHarness::with_deps(deps);
    let job = ctx.deps.store.add_collected("https://example.com/jobs/store-down");
    ctx.deps.store.fail_mark_error(true);

    let outcome = ctx.processor().process(job.id).await;

    assert!(matches!(outcome, ProcessOutcome::Abandoned(ref m) if m.contains("ParseError")));
    assert_eq!(ctx.deps.store.status_of(job.id), Some(JobStatus::Processing));
}

#[tokio::test]
async fn test_claim_store_error_leaves_job_collected() {
    let deps = TestDependencies::new().with_ai(MockAI::new().with_response(ACME_RESPONSE));
    let ctx = TestHarness::with_deps(deps);
    let job = ctx.deps.store.add_collected("https://example.com/jobs/offline");
    ctx.deps.store.fail_reads(true);

    let outcome = ctx.processor_with_timeout(Duration::from_secs(5)).process(job.id).await;

    assert!(matches!(outcome, ProcessOutcome::Abandoned(ref m) if m.contains("connection refused")));
    assert_eq!(ctx.deps.store.status_of(job.id), Some(JobStatus::Collected));
    assert!(ctx.deps.extractor.calls().is_empty());

    // Still pending, so the next dispatch picks it up once the store is back
    ctx.deps.store.fail_reads(false);
    assert_eq!(ctx.processor().process(job.id).await, ProcessOutcome::Finalized);
}
