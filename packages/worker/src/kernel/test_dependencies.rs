// TestDependencies - mock implementations for testing
//
// In-memory stand-ins for every WorkerKernel seam, so the processor and
// scheduler can be exercised without Postgres, Chromium or Gemini.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::jobs::{EnrichedFields, Job, JobStatus, JobStore, NewJob};
use super::{
    BaseAI, BaseChangeFeed, BasePageExtractor, ChangeEvent, ChangeKind, ExtractError,
    PageContent, PageFetcher, WorkerKernel,
};

// =============================================================================
// In-memory Job Store
// =============================================================================

/// [`JobStore`] over a `HashMap`, with the same conditional-update semantics
/// as the SQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    jobs: Arc<Mutex<HashMap<Uuid, Job>>>,
    claim_calls: Arc<AtomicUsize>,
    fail_finalize: Arc<AtomicBool>,
    fail_mark_error: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a `collected` row for `url` and return it.
    pub fn add_collected(&self, url: &str) -> Job {
        let job = Job::from_new(NewJob::builder().normalized_url(url).build());
        self.put(job.clone());
        job
    }

    /// Insert a `collected` row with a fixed id.
    pub fn add_collected_with_id(&self, id: Uuid, url: &str) -> Job {
        let mut job = Job::from_new(NewJob::builder().normalized_url(url).build());
        job.id = id;
        self.put(job.clone());
        job
    }

    /// Insert or replace a row as-is.
    pub fn put(&self, job: Job) {
        self.jobs.lock().unwrap().insert(job.id, job);
    }

    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    pub fn status_of(&self, id: Uuid) -> Option<JobStatus> {
        self.get(id).map(|job| job.status)
    }

    pub fn set_status(&self, id: Uuid, status: JobStatus) {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.status = status;
        }
    }

    pub fn set_created_at(&self, id: Uuid, created_at: DateTime<Utc>) {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.created_at = created_at;
        }
    }

    pub fn soft_delete(&self, id: Uuid) {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.is_deleted = true;
        }
    }

    pub fn all(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }

    pub fn claim_calls(&self) -> usize {
        self.claim_calls.load(Ordering::SeqCst)
    }

    /// Make `finalize` fail with a store error.
    pub fn fail_finalize(&self, fail: bool) {
        self.fail_finalize.store(fail, Ordering::SeqCst);
    }

    /// Make `mark_error` fail with a store error.
    pub fn fail_mark_error(&self, fail: bool) {
        self.fail_mark_error.store(fail, Ordering::SeqCst);
    }

    /// Make every read (and `ping`) fail with a store error.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        Ok(())
    }

    fn sorted(mut jobs: Vec<Job>) -> Vec<Job> {
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn claim(&self, id: Uuid) -> Result<Option<Job>> {
        self.claim_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;

        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Collected && !job.is_deleted => {
                job.status = JobStatus::Processing;
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn finalize(&self, id: Uuid, fields: &EnrichedFields) -> Result<bool> {
        if self.fail_finalize.load(Ordering::SeqCst) {
            return Err(anyhow!("store unavailable while finalizing"));
        }

        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Processing => {
                job.status = JobStatus::Finalized;
                job.title = fields.title.clone();
                job.company = fields.company.clone();
                job.description = fields.description.clone();
                job.location = fields.location.clone();
                job.salary = fields.salary.clone();
                job.work_type = fields.work_type.clone();
                job.posted_at = fields.posted_at.clone();
                job.skills = fields.skills.clone();
                job.error_message = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_error(&self, id: Uuid, message: &str) -> Result<bool> {
        if self.fail_mark_error.load(Ordering::SeqCst) {
            return Err(anyhow!("store unavailable while marking error"));
        }

        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Processing => {
                job.status = JobStatus::Error;
                job.description = Some(message.to_string());
                job.error_message = Some(message.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_pending(&self) -> Result<Vec<Job>> {
        self.check_reads()?;
        let jobs = self
            .all()
            .into_iter()
            .filter(|job| job.status == JobStatus::Collected && !job.is_deleted)
            .collect();
        Ok(Self::sorted(jobs))
    }

    async fn list_stale(&self, threshold: DateTime<Utc>) -> Result<Vec<Job>> {
        self.check_reads()?;
        let jobs = self
            .all()
            .into_iter()
            .filter(|job| job.status == JobStatus::Processing && job.created_at < threshold)
            .collect();
        Ok(Self::sorted(jobs))
    }

    async fn find(&self, id: Uuid) -> Result<Option<Job>> {
        self.check_reads()?;
        Ok(self.get(id))
    }

    async fn find_active_by_url(&self, normalized_url: &str) -> Result<Option<Job>> {
        self.check_reads()?;
        let jobs = self
            .all()
            .into_iter()
            .filter(|job| job.normalized_url == normalized_url && !job.is_deleted)
            .collect();
        Ok(Self::sorted(jobs).into_iter().next())
    }

    async fn insert(&self, new_job: NewJob) -> Result<Job> {
        let job = Job::from_new(new_job);
        self.put(job.clone());
        Ok(job)
    }

    async fn ping(&self) -> Result<()> {
        self.check_reads()
    }
}

// =============================================================================
// Mock Page Extractor
// =============================================================================

/// Replays queued extraction results; returns a default posting page when empty.
#[derive(Clone, Default)]
pub struct MockPageExtractor {
    responses: Arc<Mutex<VecDeque<Result<PageContent, ExtractError>>>>,
    calls: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MockPageExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(self, title: &str, content: &str) -> Self {
        self.responses.lock().unwrap().push_back(Ok(PageContent {
            title: title.to_string(),
            content: content.to_string(),
        }));
        self
    }

    pub fn with_error(self, error: ExtractError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Sleep before every response (drives the processor timeout).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Most extractions that were ever running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// A plausible posting page well above the minimum content length.
pub fn sample_posting_text() -> String {
    let mut text = String::from(
        "Senior Engineer at Acme Corp. Remote (US). We are looking for a senior engineer \
         to build and operate our data platform. You will design services in Go, model \
         data in SQL, and own reliability for systems that serve millions of requests. ",
    );
    while text.chars().count() < 650 {
        text.push_str("Responsibilities include code review, mentoring and on-call rotation. ");
    }
    text
}

#[async_trait]
impl BasePageExtractor for MockPageExtractor {
    async fn extract(&self, url: &str) -> Result<PageContent, ExtractError> {
        self.calls.lock().unwrap().push(url.to_string());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Ok(PageContent {
                title: "Job posting".to_string(),
                content: sample_posting_text(),
            })
        })
    }
}

// =============================================================================
// Mock Page Fetcher (single attempt, for exercising the retry policy)
// =============================================================================

#[derive(Clone, Default)]
pub struct MockPageFetcher {
    responses: Arc<Mutex<VecDeque<Result<PageContent, ExtractError>>>>,
    user_agents: Arc<Mutex<Vec<String>>>,
}

impl MockPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(self, result: Result<PageContent, ExtractError>) -> Self {
        self.responses.lock().unwrap().push_back(result);
        self
    }

    /// Number of attempts made so far.
    pub fn attempts(&self) -> usize {
        self.user_agents.lock().unwrap().len()
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.user_agents.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for MockPageFetcher {
    async fn fetch(&self, _url: &str, user_agent: &str) -> Result<PageContent, ExtractError> {
        self.user_agents.lock().unwrap().push(user_agent.to_string());
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(ExtractError::Browser("no scripted response".to_string())))
    }
}

// =============================================================================
// Mock AI
// =============================================================================

#[derive(Clone, Default)]
pub struct MockAI {
    responses: Arc<Mutex<VecDeque<Result<String, String>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockAI {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, response: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(response.to_string()));
        self
    }

    pub fn with_error(self, message: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseAI for MockAI {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("MockAI has no queued response")),
        }
    }
}

// =============================================================================
// Test Change Feed
// =============================================================================

/// Broadcast-backed [`BaseChangeFeed`].
///
/// `disconnect` closes every open subscription the way a dropped listener
/// connection would.
#[derive(Clone)]
pub struct TestChangeFeed {
    sender: Arc<Mutex<broadcast::Sender<ChangeEvent>>>,
    subscriptions: Arc<AtomicUsize>,
    fail_subscribe: Arc<AtomicBool>,
}

impl Default for TestChangeFeed {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self {
            sender: Arc::new(Mutex::new(sender)),
            subscriptions: Arc::new(AtomicUsize::new(0)),
            fail_subscribe: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl TestChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an event; returns how many subscribers received it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        self.sender.lock().unwrap().send(event).unwrap_or(0)
    }

    /// Publish a row change for `job` as the store trigger would.
    pub fn publish_job(&self, kind: ChangeKind, job: &Job) -> usize {
        self.publish(ChangeEvent {
            kind,
            table: "jobs".to_string(),
            record: Some(json!({
                "id": job.id,
                "normalized_url": job.normalized_url,
                "status": job.status,
                "is_deleted": job.is_deleted,
            })),
            old_record: None,
        })
    }

    /// End every open subscription.
    pub fn disconnect(&self) {
        let (sender, _) = broadcast::channel(64);
        *self.sender.lock().unwrap() = sender;
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.lock().unwrap().receiver_count()
    }
}

#[async_trait]
impl BaseChangeFeed for TestChangeFeed {
    async fn subscribe(&self) -> Result<BoxStream<'static, Result<ChangeEvent>>> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(anyhow!("change feed unavailable"));
        }
        self.subscriptions.fetch_add(1, Ordering::SeqCst);

        let receiver = self.sender.lock().unwrap().subscribe();
        let events = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((Ok(event), receiver)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(events.boxed())
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// Bundle of doubles, kept accessible after the kernel is built so tests can
/// script responses and inspect calls.
#[derive(Clone, Default)]
pub struct TestDependencies {
    pub store: InMemoryJobStore,
    pub extractor: MockPageExtractor,
    pub ai: MockAI,
    pub change_feed: TestChangeFeed,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extractor(mut self, extractor: MockPageExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_ai(mut self, ai: MockAI) -> Self {
        self.ai = ai;
        self
    }

    pub fn into_kernel(self) -> WorkerKernel {
        WorkerKernel::new(
            Arc::new(self.store),
            Arc::new(self.extractor),
            Arc::new(self.ai),
            Arc::new(self.change_feed),
        )
    }

    /// Kernel sharing state with `self`.
    pub fn kernel(&self) -> WorkerKernel {
        self.clone().into_kernel()
    }
}
