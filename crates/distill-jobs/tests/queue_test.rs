//! Scheduling, cancellation and retry behavior of the processing queue.
//!
//! Providers are scripted and extractors are in-test fakes, so nothing here
//! touches the network.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Semaphore};
use uuid::Uuid;

use distill_inference::mock::ScriptedProvider;
use distill_inference::{ProviderConfig, ProviderRegistry};
use distill_jobs::{
    Error, ErrorKind, Extractor, ExtractorRegistry, Job, JobStatus, JobStore, ProcessingQueue,
    ProviderError, QueueBuilder, QueueConfig, QueueEvent, Result, RetryPolicy, SourceKind,
    StopOutcome,
};

// =============================================================================
// FIXTURES
// =============================================================================

struct FakeExtractor {
    kind: SourceKind,
    text: &'static str,
    delay: Duration,
}

impl FakeExtractor {
    fn new(kind: SourceKind, text: &'static str) -> Self {
        Self {
            kind,
            text,
            delay: Duration::ZERO,
        }
    }

    fn slow(kind: SourceKind, delay: Duration) -> Self {
        Self {
            kind,
            text: "eventually",
            delay,
        }
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    fn source_kind(&self) -> SourceKind {
        self.kind
    }

    async fn extract(&self, _source_ref: &str) -> Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.text.to_string())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Store whose every write fails.
struct BrokenStore;

#[async_trait]
impl JobStore for BrokenStore {
    async fn create(&self, _job: &Job) -> Result<()> {
        Err(Error::Storage("disk full".into()))
    }

    async fn update(&self, _job: &Job) -> Result<()> {
        Err(Error::Storage("disk full".into()))
    }

    async fn get(&self, _id: Uuid) -> Result<Option<Job>> {
        Err(Error::Storage("disk full".into()))
    }

    async fn delete(&self, _id: Uuid) -> Result<bool> {
        Err(Error::Storage("disk full".into()))
    }

    async fn list(&self) -> Result<Vec<Job>> {
        Err(Error::Storage("disk full".into()))
    }
}

/// Store that remembers the status of every write it sees.
#[derive(Default)]
struct RecordingStore {
    writes: Mutex<Vec<JobStatus>>,
}

impl RecordingStore {
    fn statuses(&self) -> Vec<JobStatus> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobStore for RecordingStore {
    async fn create(&self, job: &Job) -> Result<()> {
        self.writes.lock().unwrap().push(job.status);
        Ok(())
    }

    async fn update(&self, job: &Job) -> Result<()> {
        self.writes.lock().unwrap().push(job.status);
        Ok(())
    }

    async fn get(&self, _id: Uuid) -> Result<Option<Job>> {
        Ok(None)
    }

    async fn delete(&self, _id: Uuid) -> Result<bool> {
        Ok(false)
    }

    async fn list(&self) -> Result<Vec<Job>> {
        Ok(Vec::new())
    }
}

fn extractors() -> ExtractorRegistry {
    ExtractorRegistry::new()
        .with(Arc::new(FakeExtractor::new(
            SourceKind::File,
            "The quick brown fox jumps over the lazy dog.",
        )))
        .with(Arc::new(FakeExtractor::new(
            SourceKind::Url,
            "Article body fetched from the web.",
        )))
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::default().with_delays(Duration::from_millis(1), Duration::from_millis(5))
}

fn registry(provider: &ScriptedProvider) -> Arc<ProviderRegistry> {
    Arc::new(ProviderRegistry::with_adapter(
        ProviderConfig::default(),
        Arc::new(provider.clone()),
    ))
}

fn queue_with(
    provider: &ScriptedProvider,
    config: QueueConfig,
    extractors: ExtractorRegistry,
) -> ProcessingQueue {
    QueueBuilder::new(registry(provider))
        .with_config(config.with_retry(fast_retry()))
        .with_extractors(extractors)
        .build()
}

fn queue(provider: &ScriptedProvider, limit: usize) -> ProcessingQueue {
    queue_with(
        provider,
        QueueConfig::default().with_max_concurrent(limit),
        extractors(),
    )
}

async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

async fn settle(queue: &ProcessingQueue) {
    tokio::time::timeout(Duration::from_secs(5), queue.wait_until_idle())
        .await
        .expect("queue did not drain");
}

fn status(queue: &ProcessingQueue, id: Uuid) -> JobStatus {
    queue.get(id).expect("job exists").status
}

fn drain(rx: &mut broadcast::Receiver<QueueEvent>) -> Vec<QueueEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn attempt_logs(job: &Job) -> usize {
    job.logs
        .iter()
        .filter(|l| l.message.starts_with("Provider attempt"))
        .count()
}

// =============================================================================
// HAPPY PATH
// =============================================================================

#[tokio::test]
async fn test_job_runs_to_completion() {
    let provider = ScriptedProvider::new().then_return("A fox jumps over a dog.");
    let queue = queue(&provider, 1);
    let mut events = queue.events();

    let id = queue.submit(SourceKind::File, "notes.txt").await.unwrap();
    settle(&queue).await;

    let job = queue.get(id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result_content.as_deref(), Some("A fox jumps over a dog."));
    assert_eq!(
        job.raw_content.as_deref(),
        Some("The quick brown fox jumps over the lazy dog.")
    );
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
    assert_eq!(job.attempts, 1);

    let report = queue.report(id).unwrap();
    let elapsed = report.elapsed_seconds.unwrap();
    assert!(elapsed >= 0.0);
    // frozen once terminal
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(queue.report(id).unwrap().elapsed_seconds, Some(elapsed));

    let events = drain(&mut events);
    assert!(matches!(events.first(), Some(QueueEvent::JobQueued { job_id, .. }) if *job_id == id));
    assert!(events.contains(&QueueEvent::JobStarted { job_id: id }));
    assert!(matches!(events.last(), Some(QueueEvent::JobCompleted { job_id, .. }) if *job_id == id));
}

#[tokio::test]
async fn test_status_path_follows_state_machine() {
    let provider = ScriptedProvider::new();
    let queue = queue(&provider, 1);
    let mut events = queue.events();

    let id = queue.submit(SourceKind::File, "notes.txt").await.unwrap();
    settle(&queue).await;

    let mut seen = vec![JobStatus::Queued];
    for event in drain(&mut events) {
        if let QueueEvent::JobStep { job_id, status, .. } = event {
            if job_id == id && seen.last() != Some(&status) {
                seen.push(status);
            }
        }
    }
    assert_eq!(
        seen,
        vec![
            JobStatus::Queued,
            JobStatus::Initializing,
            JobStatus::Extracting,
            JobStatus::Summarizing,
            JobStatus::Completed,
        ]
    );
    for pair in seen.windows(2) {
        assert!(pair[0].can_transition_to(pair[1]));
    }
}

// =============================================================================
// CONCURRENCY LIMIT
// =============================================================================

#[tokio::test]
async fn test_limit_never_exceeded_for_burst() {
    let provider = ScriptedProvider::new().with_latency(Duration::from_millis(15));
    let queue = queue(&provider, 3);

    let mut ids = Vec::new();
    for i in 0..12 {
        ids.push(queue.submit(SourceKind::File, format!("doc-{}.txt", i)).await.unwrap());
        assert!(queue.running_count() <= 3);
    }
    while !queue.is_idle() {
        assert!(queue.running_count() <= 3);
        tokio::time::sleep(Duration::from_millis(3)).await;
    }
    settle(&queue).await;

    assert!(provider.peak_concurrency() <= 3);
    assert_eq!(provider.call_count(), 12);
    for id in ids {
        assert_eq!(status(&queue, id), JobStatus::Completed);
    }
}

#[tokio::test]
async fn test_three_jobs_limit_two() {
    let gate = Arc::new(Semaphore::new(0));
    let provider = ScriptedProvider::new().with_gate(gate.clone());
    let queue = queue(&provider, 2);

    let a = queue.submit(SourceKind::File, "a.txt").await.unwrap();
    let b = queue.submit(SourceKind::File, "b.txt").await.unwrap();
    let c = queue.submit(SourceKind::File, "c.txt").await.unwrap();
    wait_for("two jobs in the provider", || provider.in_flight() == 2).await;

    let active = |q: &ProcessingQueue| {
        [a, b, c]
            .iter()
            .filter(|id| {
                let s = status(q, **id);
                s != JobStatus::Queued && !s.is_terminal()
            })
            .count()
    };
    assert_eq!(active(&queue), 2);
    assert_eq!(status(&queue, c), JobStatus::Queued);
    assert_eq!(queue.pending_ids(), vec![c]);

    gate.add_permits(1);
    wait_for("third job admitted", || status(&queue, c) != JobStatus::Queued).await;
    assert!(active(&queue) <= 2);

    gate.add_permits(2);
    settle(&queue).await;
    for id in [a, b, c] {
        assert_eq!(status(&queue, id), JobStatus::Completed);
    }
    assert_eq!(provider.peak_concurrency(), 2);
}

#[tokio::test]
async fn test_second_url_job_waits_for_first() {
    let gate = Arc::new(Semaphore::new(0));
    let provider = ScriptedProvider::new().with_gate(gate.clone());
    let queue = queue(&provider, 1);
    let mut events = queue.events();

    let first = queue
        .submit(SourceKind::Url, "https://example.com/one")
        .await
        .unwrap();
    wait_for("first job summarizing", || {
        status(&queue, first) == JobStatus::Summarizing && provider.in_flight() == 1
    })
    .await;

    let second = queue
        .submit(SourceKind::Url, "https://example.com/two")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(status(&queue, second), JobStatus::Queued);
    assert!(queue.get(second).unwrap().started_at.is_none());

    gate.add_permits(1);
    wait_for("second job admitted", || {
        status(&queue, second) == JobStatus::Summarizing
    })
    .await;
    assert_eq!(status(&queue, first), JobStatus::Completed);

    gate.add_permits(1);
    settle(&queue).await;

    let first_job = queue.get(first).unwrap();
    let second_job = queue.get(second).unwrap();
    assert_eq!(second_job.status, JobStatus::Completed);
    assert!(second_job.started_at.unwrap() >= first_job.completed_at.unwrap());

    let started: Vec<Uuid> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            QueueEvent::JobStarted { job_id } => Some(job_id),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![first, second]);
}

#[tokio::test]
async fn test_raising_limit_admits_pending_jobs() {
    let gate = Arc::new(Semaphore::new(0));
    let provider = ScriptedProvider::new().with_gate(gate.clone());
    let queue = queue(&provider, 1);
    let mut events = queue.events();

    for i in 0..3 {
        queue.submit(SourceKind::File, format!("{}.txt", i)).await.unwrap();
    }
    assert_eq!(queue.running_count(), 1);
    assert_eq!(queue.pending_count(), 2);

    assert_eq!(queue.set_concurrency_limit(3).unwrap(), 3);
    assert_eq!(queue.running_count(), 3);
    assert_eq!(queue.pending_count(), 0);
    assert!(drain(&mut events).contains(&QueueEvent::LimitChanged { limit: 3 }));

    gate.add_permits(3);
    settle(&queue).await;
}

#[tokio::test]
async fn test_lowering_limit_does_not_preempt() {
    let gate = Arc::new(Semaphore::new(0));
    let provider = ScriptedProvider::new().with_gate(gate.clone());
    let queue = queue(&provider, 2);

    let a = queue.submit(SourceKind::File, "a.txt").await.unwrap();
    let b = queue.submit(SourceKind::File, "b.txt").await.unwrap();
    let c = queue.submit(SourceKind::File, "c.txt").await.unwrap();
    wait_for("both running", || provider.in_flight() == 2).await;

    queue.set_concurrency_limit(1).unwrap();
    assert_eq!(queue.running_count(), 2);

    // one finishes: still at the new limit of one running, so c waits
    gate.add_permits(1);
    wait_for("one finished", || {
        [a, b].iter().any(|id| status(&queue, *id).is_terminal())
    })
    .await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(status(&queue, c), JobStatus::Queued);

    gate.add_permits(2);
    settle(&queue).await;
    assert_eq!(status(&queue, c), JobStatus::Completed);
}

// =============================================================================
// STOP REQUESTS
// =============================================================================

#[tokio::test]
async fn test_cancel_queued_job_never_initializes() {
    let gate = Arc::new(Semaphore::new(0));
    let provider = ScriptedProvider::new().with_gate(gate.clone());
    let queue = queue(&provider, 1);

    let running = queue.submit(SourceKind::File, "a.txt").await.unwrap();
    let waiting = queue.submit(SourceKind::File, "b.txt").await.unwrap();
    wait_for("first in provider", || provider.in_flight() == 1).await;

    assert_eq!(queue.request_stop(waiting).await, StopOutcome::Cancelled);
    assert!(queue.pending_ids().is_empty());

    gate.add_permits(1);
    settle(&queue).await;

    let job = queue.get(waiting).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.cancel_requested);
    assert!(job.started_at.is_none());
    assert!(job.completed_at.is_some());
    assert!(job.logs.iter().all(|l| !l.message.contains("[initializing]")));
    assert_eq!(queue.report(waiting).unwrap().elapsed_seconds, None);

    assert_eq!(status(&queue, running), JobStatus::Completed);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_stop_between_retries() {
    let provider = ScriptedProvider::new()
        .then_fail_times(ProviderError::Unavailable("connection reset".into()), 10);
    let config = QueueConfig::default();
    let queue = QueueBuilder::new(registry(&provider))
        .with_config(config.with_retry(
            RetryPolicy::default()
                .with_delays(Duration::from_millis(200), Duration::from_millis(200)),
        ))
        .with_extractors(extractors())
        .build();

    let id = queue.submit(SourceKind::File, "a.txt").await.unwrap();
    wait_for("first attempt failed", || {
        queue
            .get(id)
            .map(|j| j.logs.iter().any(|l| l.message.contains("retrying in")))
            .unwrap_or(false)
    })
    .await;

    assert_eq!(queue.request_stop(id).await, StopOutcome::Requested);
    assert!(queue.get(id).unwrap().cancel_requested);
    // repeated requests are harmless
    assert_eq!(queue.request_stop(id).await, StopOutcome::Requested);
    settle(&queue).await;

    let job = queue.get(id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.cancel_requested);
    assert!(job.error.is_none());
    assert!(job.result_content.is_none());
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_stop_interrupts_long_backoff() {
    let provider = ScriptedProvider::new()
        .then_fail_times(ProviderError::Unavailable("connection reset".into()), 10);
    let queue = QueueBuilder::new(registry(&provider))
        .with_config(QueueConfig::default().with_retry(
            RetryPolicy::default().with_delays(Duration::from_secs(60), Duration::from_secs(60)),
        ))
        .with_extractors(extractors())
        .build();

    let id = queue.submit(SourceKind::File, "a.txt").await.unwrap();
    wait_for("backoff started", || {
        queue
            .get(id)
            .map(|j| j.logs.iter().any(|l| l.message.contains("retrying in")))
            .unwrap_or(false)
    })
    .await;

    let asked = tokio::time::Instant::now();
    assert_eq!(queue.request_stop(id).await, StopOutcome::Requested);
    tokio::time::timeout(Duration::from_secs(2), queue.wait_until_idle())
        .await
        .expect("stop should cut the backoff short");
    assert!(asked.elapsed() < Duration::from_secs(2));

    let job = queue.get(id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.attempts, 1);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_store_sees_every_transition_in_order() {
    let provider = ScriptedProvider::new().then_return("summary");
    let store = Arc::new(RecordingStore::default());
    let queue = QueueBuilder::new(registry(&provider))
        .with_config(QueueConfig::default().with_retry(fast_retry()))
        .with_extractors(extractors())
        .with_store(store.clone())
        .build();

    queue.submit(SourceKind::File, "a.txt").await.unwrap();
    settle(&queue).await;

    let mut seen = store.statuses();
    seen.dedup();
    assert_eq!(
        seen,
        vec![
            JobStatus::Queued,
            JobStatus::Initializing,
            JobStatus::Extracting,
            JobStatus::Summarizing,
            JobStatus::Completed,
        ]
    );
}

#[tokio::test]
async fn test_stop_on_terminal_job_is_noop() {
    let provider = ScriptedProvider::new();
    let queue = queue(&provider, 1);

    let id = queue.submit(SourceKind::File, "a.txt").await.unwrap();
    settle(&queue).await;
    let before = queue.get(id).unwrap();

    for _ in 0..3 {
        assert_eq!(queue.request_stop(id).await, StopOutcome::AlreadyTerminal);
    }

    let after = queue.get(id).unwrap();
    assert_eq!(after.status, JobStatus::Completed);
    assert_eq!(after.logs, before.logs);
    assert!(!after.cancel_requested);
}

#[tokio::test]
async fn test_stop_unknown_job_reports_not_found() {
    let provider = ScriptedProvider::new();
    let queue = queue(&provider, 1);
    assert_eq!(
        queue.request_stop(Uuid::new_v4()).await,
        StopOutcome::NotFound
    );
}

// =============================================================================
// RETRY
// =============================================================================

#[tokio::test]
async fn test_rate_limited_then_success() {
    let provider = ScriptedProvider::new()
        .then_fail_times(
            ProviderError::RateLimited {
                message: "slow down".into(),
                retry_after: Some(Duration::from_millis(2)),
            },
            3,
        )
        .then_return("finally");
    let queue = queue(&provider, 1);

    let id = queue.submit(SourceKind::File, "a.txt").await.unwrap();
    settle(&queue).await;

    let job = queue.get(id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result_content.as_deref(), Some("finally"));
    assert_eq!(job.attempts, 4);
    assert_eq!(attempt_logs(&job), 4);
    assert_eq!(provider.call_count(), 4);
}

#[tokio::test]
async fn test_rate_limited_until_exhausted() {
    let provider = ScriptedProvider::new()
        .then_fail_times(ProviderError::rate_limited("quota hit"), 10);
    let queue = queue_with(
        &provider,
        QueueConfig::default(),
        extractors(),
    );

    let id = queue.submit(SourceKind::File, "a.txt").await.unwrap();
    settle(&queue).await;

    let job = queue.get(id).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    let error = job.error.clone().unwrap();
    assert_eq!(error.kind, ErrorKind::RateLimited);
    assert_eq!(error.message, "quota hit");
    // default policy allows five rate-limited attempts
    assert_eq!(provider.call_count(), 5);
    assert_eq!(attempt_logs(&job), 5);
    assert!(job.result_content.is_none());
    assert_eq!(
        job.processing_step.as_deref(),
        Some("Generating distillation with mock-model")
    );
}

#[tokio::test]
async fn test_unavailable_gets_fewer_attempts() {
    let provider = ScriptedProvider::new()
        .then_fail_times(ProviderError::Unavailable("timed out".into()), 10);
    let queue = queue(&provider, 1);

    let id = queue.submit(SourceKind::File, "a.txt").await.unwrap();
    settle(&queue).await;

    let job = queue.get(id).unwrap();
    assert_eq!(job.error.unwrap().kind, ErrorKind::ProviderUnavailable);
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test]
async fn test_auth_error_is_never_retried() {
    let provider =
        ScriptedProvider::new().then_fail(ProviderError::Auth("invalid api key".into()));
    let queue = queue(&provider, 1);

    let id = queue.submit(SourceKind::File, "a.txt").await.unwrap();
    settle(&queue).await;

    let job = queue.get(id).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.error.unwrap().kind, ErrorKind::AuthError);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_bad_request_is_never_retried() {
    let provider =
        ScriptedProvider::new().then_fail(ProviderError::BadRequest("input too long".into()));
    let queue = queue(&provider, 1);

    let id = queue.submit(SourceKind::File, "a.txt").await.unwrap();
    settle(&queue).await;

    assert_eq!(
        queue.get(id).unwrap().error.unwrap().kind,
        ErrorKind::BadRequest
    );
    assert_eq!(provider.call_count(), 1);
}

// =============================================================================
// EXTRACTION
// =============================================================================

#[tokio::test]
async fn test_empty_extraction_fails_job() {
    let provider = ScriptedProvider::new();
    let extractors =
        ExtractorRegistry::new().with(Arc::new(FakeExtractor::new(SourceKind::File, "  \n ")));
    let queue = queue_with(&provider, QueueConfig::default(), extractors);

    let id = queue.submit(SourceKind::File, "blank.txt").await.unwrap();
    settle(&queue).await;

    let job = queue.get(id).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.error.unwrap().kind, ErrorKind::ExtractionFailed);
    assert!(job.result_content.is_none());
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_missing_extractor_is_unsupported() {
    let provider = ScriptedProvider::new();
    let queue = queue(&provider, 1);

    let id = queue
        .submit(SourceKind::Youtube, "https://youtu.be/abc")
        .await
        .unwrap();
    settle(&queue).await;

    let job = queue.get(id).unwrap();
    assert_eq!(job.error.unwrap().kind, ErrorKind::UnsupportedSource);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_slow_extraction_times_out() {
    let provider = ScriptedProvider::new();
    let extractors = ExtractorRegistry::new().with(Arc::new(FakeExtractor::slow(
        SourceKind::File,
        Duration::from_secs(2),
    )));
    let queue = queue_with(
        &provider,
        QueueConfig::default().with_extract_timeout(Duration::from_millis(30)),
        extractors,
    );

    let id = queue.submit(SourceKind::File, "huge.bin").await.unwrap();
    settle(&queue).await;

    let job = queue.get(id).unwrap();
    let error = job.error.unwrap();
    assert_eq!(error.kind, ErrorKind::ExtractionFailed);
    assert!(error.message.contains("timed out"));
}

// =============================================================================
// PROVIDER CONFIGURATION
// =============================================================================

#[tokio::test]
async fn test_config_swap_does_not_affect_running_job() {
    let gate = Arc::new(Semaphore::new(0));
    let old = ScriptedProvider::new()
        .with_model("old-model")
        .with_gate(gate.clone());
    let new = ScriptedProvider::new()
        .with_provider_id("other")
        .with_model("new-model");
    let providers = registry(&old);
    let queue = QueueBuilder::new(providers.clone())
        .with_extractors(extractors())
        .build();

    let first = queue.submit(SourceKind::File, "a.txt").await.unwrap();
    wait_for("first job summarizing", || {
        status(&queue, first) == JobStatus::Summarizing && old.in_flight() == 1
    })
    .await;

    let snapshot = providers.install(ProviderConfig::default(), Arc::new(new.clone()));
    assert_eq!(snapshot.version, 2);

    gate.add_permits(1);
    settle(&queue).await;

    let job = queue.get(first).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.model.as_deref(), Some("old-model"));
    assert_eq!(job.provider.as_deref(), Some("mock"));
    assert_eq!(old.call_count(), 1);
    assert_eq!(new.call_count(), 0);

    let second = queue.submit(SourceKind::File, "b.txt").await.unwrap();
    settle(&queue).await;
    let job = queue.get(second).unwrap();
    assert_eq!(job.model.as_deref(), Some("new-model"));
    assert_eq!(job.provider.as_deref(), Some("other"));
    assert_eq!(new.call_count(), 1);
}

// =============================================================================
// ADMISSION AND HOUSEKEEPING
// =============================================================================

#[tokio::test]
async fn test_queue_full_rejects_submission() {
    let gate = Arc::new(Semaphore::new(0));
    let provider = ScriptedProvider::new().with_gate(gate.clone());
    let queue = queue_with(
        &provider,
        QueueConfig::default().with_max_pending(2),
        extractors(),
    );

    queue.submit(SourceKind::File, "a.txt").await.unwrap();
    queue.submit(SourceKind::File, "b.txt").await.unwrap();
    queue.submit(SourceKind::File, "c.txt").await.unwrap();

    let err = queue.submit(SourceKind::File, "d.txt").await.unwrap_err();
    assert!(matches!(err, Error::QueueFull(2)));
    assert_eq!(queue.list().len(), 3);

    gate.add_permits(3);
    settle(&queue).await;
}

#[tokio::test]
async fn test_remove_finished_job_only() {
    let gate = Arc::new(Semaphore::new(0));
    let provider = ScriptedProvider::new().with_gate(gate.clone());
    let queue = queue(&provider, 1);

    let id = queue.submit(SourceKind::File, "a.txt").await.unwrap();
    wait_for("job in provider", || provider.in_flight() == 1).await;
    assert!(matches!(queue.remove(id).await, Err(Error::InvalidInput(_))));

    gate.add_permits(1);
    settle(&queue).await;

    let removed = queue.remove(id).await.unwrap();
    assert_eq!(removed.status, JobStatus::Completed);
    assert!(queue.get(id).is_none());
    assert!(matches!(queue.remove(id).await, Err(Error::JobNotFound(_))));
}

#[tokio::test]
async fn test_storage_failures_do_not_fail_jobs() {
    let provider = ScriptedProvider::new().then_return("still fine");
    let queue = QueueBuilder::new(registry(&provider))
        .with_extractors(extractors())
        .with_store(Arc::new(BrokenStore))
        .build();

    let id = queue.submit(SourceKind::File, "a.txt").await.unwrap();
    settle(&queue).await;

    let job = queue.get(id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result_content.as_deref(), Some("still fine"));
}

#[tokio::test]
async fn test_list_is_in_submission_order() {
    let provider = ScriptedProvider::new();
    let queue = queue(&provider, 2);

    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(queue.submit(SourceKind::File, format!("{}.txt", i)).await.unwrap());
    }
    settle(&queue).await;

    let listed: Vec<Uuid> = queue.list().iter().map(|j| j.id).collect();
    assert_eq!(listed, ids);
    assert_eq!(queue.reports().len(), 4);
}
