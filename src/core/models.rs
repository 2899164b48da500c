//! Core data models for background operations and their progress

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Progress event emitted by a running operation

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]

pub enum ProgressEvent {
    /// Numeric progress within the current step (or overall in single-step mode)
    Percent {
        value: f64,
        message: Option<String>,
    },

    StepStarted {
        index: usize,
        name: String,
    },

    StepCompleted {
        index: usize,
    },

    /// Work is happening but its extent is unknown
    Indeterminate {
        message: String,
    },
}

/// Snapshot of a run's progress, handed from the worker to the controlling context

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]

pub struct ProgressState {
    pub run_id: Uuid,

    /// Overall progress (0.0 - 100.0), non-decreasing within a run
    pub overall_percent: f64,

    pub current_message: String,

    pub current_step_index: usize,

    pub current_step_name: Option<String>,

    pub step_count: usize,

    pub indeterminate: bool,

    pub cancelled: bool,

    /// Set once the run's outcome has been delivered
    pub terminal: bool,
}

impl ProgressState {
    pub fn new(run_id: Uuid, step_count: usize) -> Self {
        Self {
            run_id,
            overall_percent: 0.0,
            current_message: String::new(),
            current_step_index: 0,
            current_step_name: None,
            step_count,
            indeterminate: false,
            cancelled: false,
            terminal: false,
        }
    }

    /// Move the overall percentage forward; smaller values are ignored.
    /// Returns true when the value changed.
    pub fn advance_to(&mut self, percent: f64) -> bool {
        let clamped = clamp_percent(percent);
        if clamped > self.overall_percent {
            self.overall_percent = clamped;
            true
        } else {
            false
        }
    }

    /// Explicit reset, the only way the overall percentage may go down
    pub fn reset(&mut self) {
        let run_id = self.run_id;
        let step_count = self.step_count;
        *self = Self::new(run_id, step_count);
    }

    pub fn percent_label(&self) -> String {
        if self.indeterminate {
            return String::new();
        }
        format!("{:.1}%", self.overall_percent)
    }

    pub fn step_label(&self) -> Option<String> {
        if self.step_count == 0 {
            return None;
        }
        if self.current_step_index >= self.step_count {
            return Some(format!("Done ({}/{})", self.step_count, self.step_count));
        }
        Some(format!(
            "Step {}/{}: {}",
            self.current_step_index + 1,
            self.step_count,
            self.current_step_name.as_deref().unwrap_or_default()
        ))
    }
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step_label() {
            Some(step) => write!(
                f,
                "[{}] {} {}",
                step,
                self.percent_label(),
                self.current_message
            ),
            None => write!(f, "{} {}", self.percent_label(), self.current_message),
        }
    }
}

/// Clamp into [0, 100]; NaN is treated as zero.
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Failure classification for operation errors

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]

pub enum ErrorKind {
    /// Bad input, detected before or at the start of work
    Validation,

    /// Network or disk failure during the operation
    TransientIo,

    /// The operation stopped because cancellation was requested
    CancelledByUser,

    /// The operation panicked or broke an internal invariant
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::TransientIo => "transient-io",
            Self::CancelledByUser => "cancelled-by-user",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Error returned by an operation body

#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{kind} error: {detail}")]
pub struct OperationError {
    pub kind: ErrorKind,

    pub detail: String,
}

impl OperationError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, detail)
    }

    pub fn transient_io(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientIo, detail)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::CancelledByUser, "cancelled by user")
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }

    pub fn is_cancellation(&self) -> bool {
        self.kind == ErrorKind::CancelledByUser
    }
}

impl From<std::io::Error> for OperationError {
    fn from(err: std::io::Error) -> Self {
        Self::transient_io(err.to_string())
    }
}

/// Sink misuse inside an operation (such as an out-of-range step) is a bug in
/// the operation, so it surfaces as an internal failure
impl From<AppError> for OperationError {
    fn from(err: AppError) -> Self {
        Self::internal(err.to_string())
    }
}

/// Outcome of one operation invocation, produced exactly once

#[derive(Debug, Clone, PartialEq)]

pub enum OperationResult<P> {
    Success(P),

    Failure { kind: ErrorKind, detail: String },

    Cancelled,
}

/// Typed result of a channel content download (transcripts + thumbnails)

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]

pub struct ChannelDownloadSummary {
    pub channel_name: String,

    pub total_videos: usize,

    pub transcripts_downloaded: usize,

    pub thumbnails_downloaded: usize,

    pub failed_downloads: usize,

    pub archive_path: Option<String>,
}

impl ChannelDownloadSummary {
    /// Percentage of attempted items that succeeded
    pub fn success_rate(&self) -> f64 {
        let succeeded = self.transcripts_downloaded + self.thumbnails_downloaded;
        let attempted = succeeded + self.failed_downloads;
        if attempted == 0 {
            return 0.0;
        }
        succeeded as f64 / attempted as f64 * 100.0
    }
}

/// Application error types

#[derive(Debug, thiserror::Error)]

pub enum AppError {
    #[error("An operation is already running")]
    AlreadyRunning,

    #[error("Step index {index} out of range (step count: {step_count})")]
    OutOfRange { index: usize, step_count: usize },

    #[error("Invalid progress pattern: {0}")]
    InvalidPattern(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for application operations

pub type AppResult<T> = Result<T, AppError>;
