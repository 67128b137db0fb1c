//! Executes one admitted job to a terminal state.
//!
//! Stages run strictly in order: capture the provider snapshot, resolve the
//! extractor, extract, summarize with retry. The stop flag is checked between
//! stages and before every retry; a call already in flight is never aborted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use distill_core::{
    defaults, Error, ErrorKind, Extractor, Job, JobError, JobStatus, JobStore, LogEntry, LogLevel,
    SummaryOptions, SummaryProvider,
};
use distill_inference::ProviderRegistry;

use crate::board::JobBoard;
use crate::extraction::ExtractorRegistry;
use crate::queue::QueueEvent;
use crate::retry::{RetryDecision, RetryPolicy};

/// Why a job stopped short of `completed`.
enum Halt {
    Cancelled,
    Failed(JobError),
}

impl From<Error> for Halt {
    fn from(e: Error) -> Self {
        Halt::Failed(JobError::from(&e))
    }
}

/// The worker's private copy of the record being processed.
struct Run<'a> {
    job: Job,
    cancel: &'a AtomicBool,
    /// Log entries already mirrored to tracing.
    mirrored: usize,
}

impl Run<'_> {
    fn checkpoint(&self) -> Result<(), Halt> {
        if self.cancel.load(Ordering::SeqCst) {
            Err(Halt::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `delay`, waking early if a stop is requested.
    async fn backoff(&self, delay: Duration) -> Result<(), Halt> {
        let deadline = tokio::time::Instant::now() + delay;
        let tick = Duration::from_millis(defaults::STOP_POLL_INTERVAL_MS);
        loop {
            self.checkpoint()?;
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(());
            }
            tokio::time::sleep((deadline - now).min(tick)).await;
        }
    }
}

/// Runs jobs through extraction and summarization.
pub struct JobPipeline {
    extractors: ExtractorRegistry,
    providers: Arc<ProviderRegistry>,
    store: Arc<dyn JobStore>,
    board: Arc<JobBoard>,
    events: broadcast::Sender<QueueEvent>,
    retry: RetryPolicy,
    options: SummaryOptions,
    extract_timeout: Duration,
}

impl JobPipeline {
    pub fn new(
        extractors: ExtractorRegistry,
        providers: Arc<ProviderRegistry>,
        store: Arc<dyn JobStore>,
        board: Arc<JobBoard>,
        events: broadcast::Sender<QueueEvent>,
    ) -> Self {
        Self {
            extractors,
            providers,
            store,
            board,
            events,
            retry: RetryPolicy::default(),
            options: SummaryOptions::default(),
            extract_timeout: Duration::from_secs(defaults::EXTRACT_TIMEOUT_SECS),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_options(mut self, options: SummaryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_extract_timeout(mut self, timeout: Duration) -> Self {
        self.extract_timeout = timeout;
        self
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    /// Drive `job` (already `initializing`) to `completed`, `error` or
    /// `cancelled`, and return the final record.
    #[instrument(skip_all, fields(job_id = %job.id, source_kind = %job.source_kind))]
    pub async fn run(&self, job: Job, cancel: Arc<AtomicBool>) -> Job {
        let start = Instant::now();
        let mut run = Run {
            mirrored: job.logs.len(),
            job,
            cancel: &cancel,
        };

        let outcome = self.drive(&mut run).await;
        let job_id = run.job.id;

        let finished = match outcome {
            Ok(summary) => run.job.complete(summary),
            Err(Halt::Cancelled) => run.job.cancel(),
            Err(Halt::Failed(err)) => run.job.fail(err),
        };
        if let Err(e) = finished {
            // only reachable if a stage left the record in an unexpected state
            error!(%job_id, error = %e, status = %run.job.status, "Could not finish job");
            let _ = run
                .job
                .fail(JobError::new(ErrorKind::Unknown, e.to_string()));
        }
        self.publish(&mut run).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        match run.job.status {
            JobStatus::Completed => {
                info!(%job_id, duration_ms, attempts = run.job.attempts, "Job completed");
                let _ = self.events.send(QueueEvent::JobCompleted {
                    job_id,
                    elapsed_seconds: run.job.elapsed_seconds(),
                });
            }
            JobStatus::Cancelled => {
                info!(%job_id, duration_ms, "Job cancelled");
                let _ = self.events.send(QueueEvent::JobCancelled { job_id });
            }
            _ => {
                let (kind, message) = run
                    .job
                    .error
                    .as_ref()
                    .map(|e| (e.kind, e.message.clone()))
                    .unwrap_or((ErrorKind::Unknown, String::new()));
                warn!(%job_id, duration_ms, error_kind = %kind, error = %message, "Job failed");
                let _ = self.events.send(QueueEvent::JobFailed {
                    job_id,
                    kind,
                    message,
                });
            }
        }
        run.job
    }

    async fn drive(&self, run: &mut Run<'_>) -> Result<String, Halt> {
        // one snapshot for the whole job
        let snapshot = self.providers.snapshot();
        let adapter = Arc::clone(&snapshot.adapter);
        run.job.provider = Some(adapter.provider_id().to_string());
        run.job.model = Some(adapter.model_name().to_string());
        run.job.set_step(format!(
            "Using {} model {} (configuration v{})",
            adapter.provider_id(),
            adapter.model_name(),
            snapshot.version
        ));
        self.publish(run).await;

        let extractor = self.extractors.resolve(run.job.source_kind)?;
        run.checkpoint()?;
        run.job.advance(
            JobStatus::Extracting,
            format!("Extracting text with {}", extractor.name()),
        )?;
        self.publish(run).await;

        let raw = self
            .extract(extractor.as_ref(), &run.job.source_ref)
            .await
            .map_err(Halt::Failed)?;
        let char_count = raw.chars().count();
        run.job.set_raw_content(raw.clone())?;
        run.job
            .set_step(format!("Extracted {} characters", char_count));
        self.publish(run).await;

        run.checkpoint()?;
        run.job.advance(
            JobStatus::Summarizing,
            format!("Generating distillation with {}", adapter.model_name()),
        )?;
        let budget = adapter.max_input_length();
        if char_count > budget {
            run.job.log(
                LogLevel::Warn,
                format!(
                    "Content is {} characters; truncating to the {} character budget",
                    char_count, budget
                ),
            );
        }
        self.publish(run).await;

        self.summarize(run, adapter.as_ref(), &raw).await
    }

    async fn extract(&self, extractor: &dyn Extractor, source_ref: &str) -> Result<String, JobError> {
        match tokio::time::timeout(self.extract_timeout, extractor.extract(source_ref)).await {
            Err(_) => Err(JobError::new(
                ErrorKind::ExtractionFailed,
                format!(
                    "Extraction timed out after {}s",
                    self.extract_timeout.as_secs_f64()
                ),
            )),
            Ok(Err(e)) => Err(extraction_error(&e)),
            Ok(Ok(text)) if text.trim().is_empty() => Err(JobError::new(
                ErrorKind::ExtractionFailed,
                "Extractor returned no text",
            )),
            Ok(Ok(text)) => Ok(text),
        }
    }

    async fn summarize(
        &self,
        run: &mut Run<'_>,
        adapter: &dyn SummaryProvider,
        text: &str,
    ) -> Result<String, Halt> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if attempt > 1 {
                run.checkpoint()?;
            }
            run.job.attempts = attempt;
            run.job.log(
                LogLevel::Info,
                format!("Provider attempt {} via {}", attempt, adapter.provider_id()),
            );
            self.publish(run).await;

            let err = match adapter.generate_summary(text, &self.options).await {
                Ok(summary) => return Ok(summary),
                Err(err) => err,
            };

            match self.retry.decide(&err, attempt) {
                RetryDecision::RetryAfter(delay) => {
                    run.job.log(
                        LogLevel::Warn,
                        format!(
                            "Attempt {} failed ({}): {}; retrying in {} ms",
                            attempt,
                            err.kind(),
                            err.message(),
                            delay.as_millis()
                        ),
                    );
                    self.publish(run).await;
                    run.backoff(delay).await?;
                }
                RetryDecision::GiveUp => {
                    if err.is_retryable() {
                        run.job.log(
                            LogLevel::Warn,
                            format!("Giving up after {} attempts", attempt),
                        );
                    }
                    return Err(Halt::Failed(JobError::new(err.kind(), err.message())));
                }
            }
        }
    }

    /// Mirror new log lines, update the board, persist, notify.
    async fn publish(&self, run: &mut Run<'_>) {
        let job_id = run.job.id;
        for entry in &run.job.logs[run.mirrored..] {
            mirror(job_id, entry);
        }
        run.mirrored = run.job.logs.len();

        self.board.publish(&mut run.job, run.cancel);

        if let Err(e) = self.store.update(&run.job).await {
            warn!(%job_id, error = %e, "Failed to persist job update");
        }

        let _ = self.events.send(QueueEvent::JobStep {
            job_id,
            status: run.job.status,
            step: run.job.processing_step.clone(),
        });
    }
}

fn extraction_error(e: &Error) -> JobError {
    let kind = match e {
        Error::UnsupportedSource(_) => ErrorKind::UnsupportedSource,
        Error::Extraction(_)
        | Error::Io(_)
        | Error::Request(_)
        | Error::NotFound(_)
        | Error::InvalidInput(_) => ErrorKind::ExtractionFailed,
        other => {
            error!(error = ?other, "Unexpected extractor failure");
            ErrorKind::Unknown
        }
    };
    JobError::new(kind, e.to_string())
}

fn mirror(job_id: Uuid, entry: &LogEntry) {
    match entry.level {
        LogLevel::Debug => debug!(%job_id, "{}", entry.message),
        LogLevel::Info => info!(%job_id, "{}", entry.message),
        LogLevel::Warn => warn!(%job_id, "{}", entry.message),
        LogLevel::Error => error!(%job_id, "{}", entry.message),
    }
}
