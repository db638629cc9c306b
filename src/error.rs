//! Error taxonomy for the ingestion pipeline.
//!
//! Each concern gets its own `thiserror` enum, composed into the top-level
//! [`IngestError`] surfaced to public ingress callers as the structured
//! `{success:false, error:{code, message, details?}}` shape.

use crate::types::TaskId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from the incremental parser (C2).
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("syntax error in '{path}' at line {line}, column {column}: {reason}")]
    Syntax {
        path: PathBuf,
        line: u32,
        column: u32,
        reason: String,
    },

    #[error("unsupported file type '{extension}' for '{path}'")]
    UnsupportedFileType { path: PathBuf, extension: String },

    #[error("file not found: '{path}'")]
    FileMissing { path: PathBuf },
}

/// Errors from the partitioned queue (C4).
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue overflow: depth {depth} exceeds backpressure threshold {threshold}")]
    Overflow { depth: usize, threshold: usize },

    #[error("no such partition {0}")]
    NoSuchPartition(usize),
}

/// Errors from the worker pool and task dispatch (C5).
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("no handler registered for task type {0:?}")]
    NoHandler(crate::types::TaskType),

    #[error("task {task_id} failed: {reason}")]
    HandlerFailed { task_id: TaskId, reason: String },

    #[error("task {0} timed out")]
    Timeout(TaskId),
}

/// Errors from the batch/streaming writer (C6).
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("transient sink failure: {0}")]
    Transient(String),

    #[error("persistent sink failure: {0}")]
    Persistent(String),

    #[error("batch epoch {batch_epoch} is stale (current epoch {current_epoch})")]
    StaleEpoch {
        batch_epoch: u64,
        current_epoch: u64,
    },
}

/// Errors surfaced by the error/retry layer (C7).
#[derive(Error, Debug)]
pub enum ReliabilityError {
    #[error("circuit breaker open")]
    CircuitOpen,

    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

/// Errors from the subscription fan-out transport (C10).
#[derive(Error, Debug)]
pub enum FanoutError {
    #[error("authentication failed")]
    AuthFailure,

    #[error("insufficient scope, required: {required:?}")]
    InsufficientScope { required: Vec<String> },

    #[error("session backpressure cap exceeded")]
    TransportBackpressure,
}

/// Errors from checkpoint operations (C11).
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint {0} not found")]
    NotFound(String),

    #[error("seed entity {0} not found in graph")]
    SeedNotFound(String),
}

/// Top-level pipeline error, the union surfaced to ingress callers.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("pipeline is not running (state: {0})")]
    PipelineNotRunning(String),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Reliability(#[from] ReliabilityError),

    #[error(transparent)]
    Fanout(#[from] FanoutError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("enrichment failed (best-effort, non-fatal): {0}")]
    EnrichmentFailure(String),
}

impl IngestError {
    /// Stable machine-readable code for the `{error:{code,...}}` envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::PipelineNotRunning(_) => "pipeline_not_running",
            Self::Queue(QueueError::Overflow { .. }) => "queue_overflow",
            Self::Queue(QueueError::NoSuchPartition(_)) => "queue_no_such_partition",
            Self::Parse(_) => "parse_error",
            Self::Worker(_) => "worker_error",
            Self::Write(_) => "write_error",
            Self::Reliability(ReliabilityError::CircuitOpen) => "circuit_open",
            Self::Reliability(ReliabilityError::RetriesExhausted { .. }) => "retries_exhausted",
            Self::Fanout(FanoutError::AuthFailure) => "auth_failure",
            Self::Fanout(FanoutError::InsufficientScope { .. }) => "insufficient_scope",
            Self::Fanout(FanoutError::TransportBackpressure) => "transport_backpressure",
            Self::Checkpoint(_) => "checkpoint_error",
            Self::EnrichmentFailure(_) => "enrichment_failure",
        }
    }

    /// Whether this error kind is retryable per the §7 taxonomy table.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Queue(QueueError::Overflow { .. })
                | Self::Write(WriteError::Transient(_))
                | Self::Reliability(ReliabilityError::CircuitOpen)
                | Self::Fanout(FanoutError::TransportBackpressure)
        )
    }
}

/// Structured error envelope returned to any public ingress caller
///.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub request_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorEnvelope {
    pub fn from_error(err: &IngestError, request_id: impl Into<String>) -> Self {
        Self {
            success: false,
            code: err.code().to_string(),
            message: err.to_string(),
            request_id: request_id.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Substring set that marks an otherwise-untagged error as retryable
///.
pub const RETRYABLE_SUBSTRINGS: &[&str] = &[
    "timeout",
    "connection",
    "network",
    "temporary",
    "rate limit",
    "service unavailable",
];

pub fn message_looks_retryable(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_SUBSTRINGS.iter().any(|s| lower.contains(s))
}
