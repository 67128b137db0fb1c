//! Job Record and the pipeline state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// =============================================================================
// SOURCE
// =============================================================================

/// Kind of knowledge source a job was submitted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A web page.
    Url,
    /// A YouTube video.
    Youtube,
    /// An uploaded document.
    File,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Youtube => "youtube",
            Self::File => "file",
        }
    }

    /// Classify a raw source reference.
    ///
    /// http(s) references on a YouTube host are `Youtube`, any other http(s)
    /// reference is `Url`, and everything else is treated as a file.
    pub fn detect(reference: &str) -> Self {
        let trimmed = reference.trim();
        let lower = trimmed.to_ascii_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return Self::File;
        }
        let host = reqwest::Url::parse(trimmed)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()));
        match host.as_deref() {
            Some(h) if h == "youtu.be" || h == "youtube.com" || h.ends_with(".youtube.com") => {
                Self::Youtube
            }
            _ => Self::Url,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "url" => Ok(Self::Url),
            "youtube" => Ok(Self::Youtube),
            "file" => Ok(Self::File),
            other => Err(Error::InvalidInput(format!("Unknown source kind: {}", other))),
        }
    }
}

// =============================================================================
// STATUS
// =============================================================================

/// Pipeline status of a job.
///
/// ```text
/// queued -> initializing -> extracting -> summarizing -> completed
///              |               |              |
///              +---------------+--------------+--> error
/// any non-terminal ------------------------------> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Initializing,
    Extracting,
    Summarizing,
    Completed,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Initializing => "initializing",
            Self::Extracting => "extracting",
            Self::Summarizing => "summarizing",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// `completed`, `error` and `cancelled` admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// Admitted and not yet terminal.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Initializing | Self::Extracting | Self::Summarizing
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Queued, Initializing)
            | (Initializing, Extracting)
            | (Extracting, Summarizing)
            | (Summarizing, Completed) => true,
            (Initializing | Extracting | Summarizing, Error) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// LOGS
// =============================================================================

/// Severity of a per-job log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One append-only entry in a job's log trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

// =============================================================================
// ERRORS ON THE RECORD
// =============================================================================

/// User-facing failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnsupportedSource,
    ExtractionFailed,
    AuthError,
    RateLimited,
    BadRequest,
    ProviderUnavailable,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    /// Only throttling and availability failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::ProviderUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Structured failure detail stored on a job that ended in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&Error> for JobError {
    fn from(e: &Error) -> Self {
        let message = match e {
            Error::Provider(p) => p.message().to_string(),
            other => other.to_string(),
        };
        Self::new(e.kind(), message)
    }
}

// =============================================================================
// JOB RECORD
// =============================================================================

/// One tracked submission and its processing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub source_kind: SourceKind,
    pub source_ref: String,
    pub status: JobStatus,
    /// Most recent worker action, human readable.
    pub processing_step: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub logs: Vec<LogEntry>,
    pub raw_content: Option<String>,
    pub result_content: Option<String>,
    pub error: Option<JobError>,
    pub cancel_requested: bool,
    /// Provider identity captured when the job was initialized.
    pub provider: Option<String>,
    /// Model captured when the job was initialized.
    pub model: Option<String>,
    /// Number of provider calls made.
    pub attempts: u32,
}

impl Job {
    /// Create a new record in `queued`.
    pub fn new(source_kind: SourceKind, source_ref: impl Into<String>) -> Self {
        let source_ref = source_ref.into();
        let mut job = Self {
            id: Uuid::now_v7(),
            source_kind,
            source_ref,
            status: JobStatus::Queued,
            processing_step: Some("Waiting in queue".to_string()),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            logs: Vec::new(),
            raw_content: None,
            result_content: None,
            error: None,
            cancel_requested: false,
            provider: None,
            model: None,
            attempts: 0,
        };
        job.log(
            LogLevel::Info,
            format!("Queued {} source: {}", job.source_kind, job.source_ref),
        );
        job
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Append a log line.
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        });
    }

    /// Move to a non-terminal stage, recording `step` as the processing step.
    pub fn advance(&mut self, next: JobStatus, step: impl Into<String>) -> Result<()> {
        if next.is_terminal() {
            return Err(Error::InvalidInput(format!(
                "{} is terminal; use complete, fail or cancel",
                next
            )));
        }
        self.enter(next)?;
        let step = step.into();
        self.log(LogLevel::Info, format!("[{}] {}", next, step));
        self.processing_step = Some(step);
        Ok(())
    }

    /// Record the processing step without changing status.
    pub fn set_step(&mut self, step: impl Into<String>) {
        let step = step.into();
        self.log(LogLevel::Info, step.clone());
        self.processing_step = Some(step);
    }

    /// Store extracted text. Write-once.
    pub fn set_raw_content(&mut self, text: impl Into<String>) -> Result<()> {
        if self.raw_content.is_some() {
            return Err(Error::InvalidInput("raw content already set".into()));
        }
        self.raw_content = Some(text.into());
        Ok(())
    }

    /// Store the distillation. Write-once, and only after raw content.
    pub fn set_result_content(&mut self, text: impl Into<String>) -> Result<()> {
        if self.raw_content.is_none() {
            return Err(Error::InvalidInput(
                "result content requires raw content".into(),
            ));
        }
        if self.result_content.is_some() {
            return Err(Error::InvalidInput("result content already set".into()));
        }
        self.result_content = Some(text.into());
        Ok(())
    }

    /// `summarizing -> completed` with the distillation text.
    pub fn complete(&mut self, result: impl Into<String>) -> Result<()> {
        self.check(JobStatus::Completed)?;
        self.set_result_content(result)?;
        self.enter(JobStatus::Completed)?;
        let step = "Distillation complete".to_string();
        self.log(LogLevel::Info, format!("[{}] {}", JobStatus::Completed, step));
        self.processing_step = Some(step);
        Ok(())
    }

    /// Any active stage `-> error`. The last processing step is kept.
    pub fn fail(&mut self, error: JobError) -> Result<()> {
        self.enter(JobStatus::Error)?;
        self.log(
            LogLevel::Error,
            format!("[{}] {}: {}", JobStatus::Error, error.kind, error.message),
        );
        self.error = Some(error);
        Ok(())
    }

    /// Any non-terminal stage `-> cancelled`. Partial results are dropped.
    pub fn cancel(&mut self) -> Result<()> {
        self.enter(JobStatus::Cancelled)?;
        self.result_content = None;
        self.error = None;
        self.log(
            LogLevel::Warn,
            format!("[{}] Processing stopped by request", JobStatus::Cancelled),
        );
        Ok(())
    }

    /// Seconds since `started_at`, frozen at `completed_at` once terminal.
    pub fn elapsed_seconds_at(&self, now: DateTime<Utc>) -> Option<f64> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or(now);
        let millis = (end - started).num_milliseconds().max(0);
        Some(millis as f64 / 1000.0)
    }

    pub fn elapsed_seconds(&self) -> Option<f64> {
        self.elapsed_seconds_at(Utc::now())
    }

    /// Read-only projection with the derived elapsed time.
    pub fn report(&self) -> JobReport {
        JobReport {
            elapsed_seconds: self.elapsed_seconds(),
            job: self.clone(),
        }
    }

    fn check(&self, next: JobStatus) -> Result<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            })
        }
    }

    fn enter(&mut self, next: JobStatus) -> Result<()> {
        self.check(next)?;
        let now = Utc::now();
        if self.status == JobStatus::Queued && next.is_active() {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = next;
        Ok(())
    }
}

/// Status projection handed to reporting layers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    #[serde(flatten)]
    pub job: Job,
    pub elapsed_seconds: Option<f64>,
}
