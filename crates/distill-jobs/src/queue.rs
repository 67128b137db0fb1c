//! Processing queue: admission, FIFO scheduling and stop requests.
//!
//! Scheduler bookkeeping (limit, running set, pending order) lives behind one
//! mutex. Every admission, release and limit change goes through it, so a
//! slot is never claimed twice. Lock order is scheduler state, then board.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use distill_core::{
    defaults, Error, ErrorKind, Job, JobError, JobReport, JobStatus, JobStore, Result, SourceKind,
    SummaryOptions,
};
use distill_inference::ProviderRegistry;

use crate::board::JobBoard;
use crate::extraction::ExtractorRegistry;
use crate::pipeline::JobPipeline;
use crate::retry::RetryPolicy;
use crate::store::MemoryJobStore;

/// Configuration for the processing queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Initial concurrency limit.
    pub max_concurrent: usize,
    /// Upper bound for runtime limit changes.
    pub max_concurrency: usize,
    /// Pending jobs accepted before `submit` fails with `QueueFull`.
    pub max_pending: usize,
    pub extract_timeout: Duration,
    pub retry: RetryPolicy,
    pub summary: SummaryOptions,
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::QUEUE_CONCURRENCY,
            max_concurrency: defaults::QUEUE_MAX_CONCURRENCY,
            max_pending: defaults::QUEUE_MAX_PENDING,
            extract_timeout: Duration::from_secs(defaults::EXTRACT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            summary: SummaryOptions::default(),
            event_capacity: defaults::EVENT_BUS_CAPACITY,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_MAX_CONCURRENT` | `1` | Initial concurrency limit (clamped to 1..=10) |
    /// | `JOB_MAX_PENDING` | `1000` | Pending jobs before submissions are rejected |
    /// | `JOB_EXTRACT_TIMEOUT_SECS` | `60` | Timeout for one extraction |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_concurrent = std::env::var("JOB_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.max_concurrent)
            .clamp(1, defaults.max_concurrency);

        let max_pending = std::env::var("JOB_MAX_PENDING")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.max_pending)
            .max(1);

        let extract_timeout = std::env::var("JOB_EXTRACT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.extract_timeout);

        Self {
            max_concurrent,
            max_pending,
            extract_timeout,
            ..defaults
        }
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_max_pending(mut self, max: usize) -> Self {
        self.max_pending = max;
        self
    }

    pub fn with_extract_timeout(mut self, timeout: Duration) -> Self {
        self.extract_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_summary_options(mut self, options: SummaryOptions) -> Self {
        self.summary = options;
        self
    }
}

/// Event broadcast by the queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A job was accepted and is waiting for a slot.
    JobQueued {
        job_id: Uuid,
        source_kind: SourceKind,
    },
    /// A job was admitted to a worker slot.
    JobStarted { job_id: Uuid },
    /// A running job changed status or step.
    JobStep {
        job_id: Uuid,
        status: JobStatus,
        step: Option<String>,
    },
    JobCompleted {
        job_id: Uuid,
        elapsed_seconds: Option<f64>,
    },
    JobFailed {
        job_id: Uuid,
        kind: ErrorKind,
        message: String,
    },
    JobCancelled { job_id: Uuid },
    /// The concurrency limit changed.
    LimitChanged { limit: usize },
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// The job was still queued and is now cancelled.
    Cancelled,
    /// The job is running; its worker stops at the next checkpoint.
    Requested,
    /// The job had already finished. Nothing changed.
    AlreadyTerminal,
    NotFound,
}

#[derive(Default)]
struct SchedulerState {
    limit: usize,
    running: HashMap<Uuid, Arc<AtomicBool>>,
    pending: VecDeque<Uuid>,
    /// Submissions that passed the capacity check and are being persisted.
    reserved: usize,
}

struct Inner {
    config: QueueConfig,
    state: Mutex<SchedulerState>,
    board: Arc<JobBoard>,
    store: Arc<dyn JobStore>,
    pipeline: JobPipeline,
    events: broadcast::Sender<QueueEvent>,
    idle: Notify,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// FIFO queue running jobs under a runtime-adjustable concurrency limit.
///
/// Cheap to clone; all clones share one scheduler.
#[derive(Clone)]
pub struct ProcessingQueue {
    inner: Arc<Inner>,
}

impl ProcessingQueue {
    /// Accept a new job. Returns as soon as the record is queued.
    pub async fn submit(&self, kind: SourceKind, source_ref: impl Into<String>) -> Result<Uuid> {
        let source_ref = source_ref.into();
        let source_ref = source_ref.trim();
        if source_ref.is_empty() {
            return Err(Error::InvalidInput("Source reference is required".into()));
        }

        {
            let mut state = self.inner.lock();
            if state.pending.len() + state.reserved >= self.inner.config.max_pending {
                warn!(
                    pending = state.pending.len(),
                    max_pending = self.inner.config.max_pending,
                    "Rejecting submission, queue is full"
                );
                return Err(Error::QueueFull(self.inner.config.max_pending));
            }
            state.reserved += 1;
        }

        let job = Job::new(kind, source_ref);
        let job_id = job.id;
        if let Err(e) = self.inner.store.create(&job).await {
            warn!(%job_id, error = %e, "Failed to persist new job");
        }

        {
            let mut state = self.inner.lock();
            state.reserved -= 1;
            self.inner.board.insert(job);
            state.pending.push_back(job_id);
        }

        info!(%job_id, source_kind = %kind, source_ref, "Job queued");
        let _ = self.inner.events.send(QueueEvent::JobQueued {
            job_id,
            source_kind: kind,
        });
        self.pump();
        Ok(job_id)
    }

    /// Ask a job to stop.
    ///
    /// Queued jobs are cancelled on the spot and never admitted. Running jobs
    /// are flagged and stop at their next checkpoint. Finished or unknown
    /// jobs are left untouched.
    pub async fn request_stop(&self, job_id: Uuid) -> StopOutcome {
        let (outcome, cancelled) = {
            let mut state = self.inner.lock();
            if let Some(pos) = state.pending.iter().position(|id| *id == job_id) {
                state.pending.remove(pos);
                let cancelled = self.inner.board.update(job_id, |job| {
                    job.cancel_requested = true;
                    job.cancel().map(|_| job.clone())
                });
                match cancelled {
                    Some(Ok(job)) => (StopOutcome::Cancelled, Some(job)),
                    Some(Err(e)) => {
                        warn!(%job_id, error = %e, "Pending job could not be cancelled");
                        (StopOutcome::AlreadyTerminal, None)
                    }
                    None => (StopOutcome::NotFound, None),
                }
            } else if let Some(flag) = state.running.get(&job_id) {
                let outcome = self
                    .inner
                    .board
                    .update(job_id, |job| {
                        if job.is_terminal() {
                            StopOutcome::AlreadyTerminal
                        } else {
                            flag.store(true, Ordering::SeqCst);
                            job.cancel_requested = true;
                            StopOutcome::Requested
                        }
                    })
                    .unwrap_or(StopOutcome::NotFound);
                (outcome, None)
            } else {
                // neither pending nor running means finished
                let outcome = match self.inner.board.get(job_id) {
                    Some(_) => StopOutcome::AlreadyTerminal,
                    None => StopOutcome::NotFound,
                };
                (outcome, None)
            }
        };

        match (&outcome, cancelled) {
            (StopOutcome::Cancelled, Some(job)) => {
                if let Err(e) = self.inner.store.update(&job).await {
                    warn!(%job_id, error = %e, "Failed to persist cancelled job");
                }
                info!(%job_id, "Queued job cancelled");
                let _ = self.inner.events.send(QueueEvent::JobCancelled { job_id });
                self.notify_if_idle();
            }
            (StopOutcome::Requested, _) => info!(%job_id, "Stop requested for running job"),
            _ => debug!(%job_id, ?outcome, "Stop request ignored"),
        }
        outcome
    }

    /// Change the concurrency limit.
    ///
    /// Values above the configured maximum are clamped; the applied value is
    /// returned. Running jobs are never preempted. A raised limit admits
    /// pending jobs immediately.
    pub fn set_concurrency_limit(&self, limit: usize) -> Result<usize> {
        if limit == 0 {
            return Err(Error::InvalidInput(
                "Concurrency limit must be at least 1".into(),
            ));
        }
        let max = self.inner.config.max_concurrency.max(1);
        let applied = limit.min(max);
        if applied < limit {
            warn!(requested = limit, applied, "Concurrency limit clamped");
        }

        self.inner.lock().limit = applied;
        info!(limit = applied, "Concurrency limit changed");
        let _ = self
            .inner
            .events
            .send(QueueEvent::LimitChanged { limit: applied });
        self.pump();
        Ok(applied)
    }

    /// Delete a finished job from the board and the store.
    pub async fn remove(&self, job_id: Uuid) -> Result<Job> {
        let job = self
            .inner
            .board
            .get(job_id)
            .ok_or(Error::JobNotFound(job_id))?;
        if !job.is_terminal() {
            return Err(Error::InvalidInput(format!(
                "Job {} is still {}",
                job_id, job.status
            )));
        }
        self.inner.board.remove(job_id);
        if let Err(e) = self.inner.store.delete(job_id).await {
            warn!(%job_id, error = %e, "Failed to delete job from store");
        }
        debug!(%job_id, "Job removed");
        Ok(job)
    }

    /// Resolve once nothing is pending or running.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    pub fn concurrency_limit(&self) -> usize {
        self.inner.lock().limit
    }

    pub fn running_count(&self) -> usize {
        self.inner.lock().running.len()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Pending job ids in admission order.
    pub fn pending_ids(&self) -> Vec<Uuid> {
        self.inner.lock().pending.iter().copied().collect()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.inner.lock();
        state.running.is_empty() && state.pending.is_empty()
    }

    pub fn get(&self, job_id: Uuid) -> Option<Job> {
        self.inner.board.get(job_id)
    }

    pub fn report(&self, job_id: Uuid) -> Option<JobReport> {
        self.inner.board.report(job_id)
    }

    pub fn list(&self) -> Vec<Job> {
        self.inner.board.list()
    }

    pub fn reports(&self) -> Vec<JobReport> {
        self.inner.board.reports()
    }

    /// Subscribe to queue events.
    pub fn events(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        self.inner.pipeline.providers()
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Admit pending jobs while slots are free.
    fn pump(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime available, admission deferred");
            return;
        };

        let admitted = {
            let mut state = self.inner.lock();
            let mut admitted = Vec::new();
            while state.running.len() < state.limit {
                let Some(job_id) = state.pending.pop_front() else {
                    break;
                };
                let job = self.inner.board.update(job_id, |job| {
                    job.advance(JobStatus::Initializing, "Admitted to a worker slot")
                        .map(|_| job.clone())
                });
                match job {
                    Some(Ok(job)) => {
                        let flag = Arc::new(AtomicBool::new(false));
                        state.running.insert(job_id, Arc::clone(&flag));
                        admitted.push((job, flag));
                    }
                    Some(Err(e)) => {
                        warn!(%job_id, error = %e, "Skipping job that cannot be admitted")
                    }
                    None => warn!(%job_id, "Pending job missing from board"),
                }
            }
            admitted
        };

        // spawn outside the lock; a dropped task releases its slot
        for (job, flag) in admitted {
            let job_id = job.id;
            let guard = SlotGuard {
                queue: self.clone(),
                job_id,
            };
            info!(%job_id, source_kind = %job.source_kind, "Job admitted");
            let _ = self.inner.events.send(QueueEvent::JobStarted { job_id });
            runtime.spawn(async move {
                let guard = guard;
                let inner = &guard.queue.inner;
                if let Err(e) = inner.store.update(&job).await {
                    warn!(%job_id, error = %e, "Failed to persist admission");
                }
                inner.pipeline.run(job, flag).await;
                drop(guard);
            });
        }
    }

    fn release(&self, job_id: Uuid) {
        self.inner.lock().running.remove(&job_id);
        self.pump();
        self.notify_if_idle();
    }

    fn notify_if_idle(&self) {
        if self.is_idle() {
            self.inner.idle.notify_waiters();
        }
    }
}

/// Frees a worker slot when the task running a job ends, however it ends.
struct SlotGuard {
    queue: ProcessingQueue,
    job_id: Uuid,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let job_id = self.job_id;
        // a task that panicked or was dropped mid-run leaves a live record behind
        let abandoned = self.queue.inner.board.update(job_id, |job| {
            if job.is_terminal() {
                false
            } else {
                let _ = job.fail(JobError::new(
                    ErrorKind::Unknown,
                    "Worker stopped before the job finished",
                ));
                true
            }
        });
        if abandoned == Some(true) {
            warn!(%job_id, "Worker ended without finishing its job");
        }
        self.queue.release(job_id);
    }
}

/// Builder for creating a processing queue.
pub struct QueueBuilder {
    providers: Arc<ProviderRegistry>,
    config: QueueConfig,
    extractors: ExtractorRegistry,
    store: Option<Arc<dyn JobStore>>,
}

impl QueueBuilder {
    pub fn new(providers: Arc<ProviderRegistry>) -> Self {
        Self {
            providers,
            config: QueueConfig::default(),
            extractors: ExtractorRegistry::new(),
            store: None,
        }
    }

    pub fn with_config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    /// Persist jobs somewhere other than memory.
    pub fn with_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> ProcessingQueue {
        let config = self.config;
        let store: Arc<dyn JobStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryJobStore::new()),
        };
        let board = Arc::new(JobBoard::new());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let pipeline = JobPipeline::new(
            self.extractors,
            self.providers,
            Arc::clone(&store),
            Arc::clone(&board),
            events.clone(),
        )
        .with_retry(config.retry.clone())
        .with_options(config.summary.clone())
        .with_extract_timeout(config.extract_timeout);

        let state = SchedulerState {
            limit: config.max_concurrent.clamp(1, config.max_concurrency.max(1)),
            ..Default::default()
        };

        ProcessingQueue {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(state),
                board,
                store,
                pipeline,
                events,
                idle: Notify::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distill_inference::mock::ScriptedProvider;
    use distill_inference::ProviderConfig;

    fn queue(config: QueueConfig) -> ProcessingQueue {
        let providers = Arc::new(ProviderRegistry::with_adapter(
            ProviderConfig::default(),
            Arc::new(ScriptedProvider::new()),
        ));
        QueueBuilder::new(providers).with_config(config).build()
    }

    #[test]
    fn test_queue_config_default() {
        let config = QueueConfig::default();
        assert_eq!(config.max_concurrent, 1);
        assert_eq!(config.max_concurrency, 10);
        assert_eq!(config.max_pending, 1000);
        assert_eq!(config.extract_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_queue_config_builder() {
        let config = QueueConfig::default()
            .with_max_concurrent(3)
            .with_max_pending(5)
            .with_extract_timeout(Duration::from_secs(2));
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.max_pending, 5);
        assert_eq!(config.extract_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_initial_limit_is_clamped() {
        let q = queue(QueueConfig::default().with_max_concurrent(50));
        assert_eq!(q.concurrency_limit(), 10);
        let q = queue(QueueConfig::default().with_max_concurrent(0));
        assert_eq!(q.concurrency_limit(), 1);
    }

    #[test]
    fn test_set_limit_validation_and_clamp() {
        let q = queue(QueueConfig::default());
        assert!(matches!(
            q.set_concurrency_limit(0),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(q.concurrency_limit(), 1);
        assert_eq!(q.set_concurrency_limit(25).unwrap(), 10);
        assert_eq!(q.set_concurrency_limit(4).unwrap(), 4);
        assert_eq!(q.concurrency_limit(), 4);
    }

    #[tokio::test]
    async fn test_submit_rejects_blank_reference() {
        let q = queue(QueueConfig::default());
        let err = q.submit(SourceKind::File, "   ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(q.list().is_empty());
    }

    #[tokio::test]
    async fn test_stop_unknown_job() {
        let q = queue(QueueConfig::default());
        assert_eq!(q.request_stop(Uuid::new_v4()).await, StopOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_remove_unknown_job() {
        let q = queue(QueueConfig::default());
        let id = Uuid::new_v4();
        assert!(matches!(q.remove(id).await, Err(Error::JobNotFound(j)) if j == id));
    }

    #[test]
    fn test_event_serialization() {
        let id = Uuid::nil();
        let json = serde_json::to_value(QueueEvent::JobFailed {
            job_id: id,
            kind: ErrorKind::RateLimited,
            message: "slow down".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "job_failed");
        assert_eq!(json["kind"], "RateLimited");
        assert_eq!(
            serde_json::to_value(StopOutcome::AlreadyTerminal).unwrap(),
            "already_terminal"
        );
    }
}
