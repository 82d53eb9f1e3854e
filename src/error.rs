use thiserror::Error;

use crate::domain::utils::id::{DataName, WorkerName};

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Invalid configuration value: {0}")]
    ConversionError(#[from] ConversionError),

    #[error("Malformed task '{signature}': {reason}")]
    InvalidTask { signature: String, reason: String },

    #[error("Data '{0}' is not available")]
    DataNotAvailable(DataName),

    #[error("No worker can ever satisfy the constraints of '{0}'")]
    UnschedulableConstraint(String),

    #[error("Worker '{0}' is not registered")]
    UnknownWorker(WorkerName),

    #[error("Input transfer to worker '{worker}' failed: {reason}")]
    TransferFailed { worker: WorkerName, reason: String },

    #[error("Job submission to worker '{worker}' failed: {reason}")]
    SubmissionFailed { worker: WorkerName, reason: String },

    #[error("Job execution on worker '{worker}' failed: {reason}")]
    ExecutionFailed { worker: WorkerName, reason: String },

    #[error("Job on worker '{0}' exceeded its timeout")]
    Timeout(WorkerName),

    #[error("The runtime is shutting down")]
    ShutdownInProgress,

    #[error("Application failed: {0}")]
    ApplicationFailed(String),

    #[error("Runtime component is not reachable: {0}")]
    RuntimeUnavailable(#[from] actix::MailboxError),

    #[error("Failed to encode job frame: {0}")]
    CodecError(String),
}

/// Errors raised while turning configuration strings into domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Unknown scheduling policy '{0}'")]
    UnknownSchedulingPolicy(String),

    #[error("Unknown checkpoint policy '{0}'")]
    UnknownCheckpointPolicy(String),

    #[error("Unknown on-failure policy '{0}'")]
    UnknownOnFailure(String),

    #[error("Unknown parameter direction '{0}'")]
    UnknownDirection(String),

    #[error("Unknown data type '{0}'")]
    UnknownDataType(String),

    #[error("Unknown shutdown mode '{0}'")]
    UnknownShutdownMode(String),

    #[error("Missing field '{0}'")]
    MissingField(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Worker '{0}' is declared twice")]
    DuplicateWorker(String),
}

pub type Result<T> = std::result::Result<T, Error>;
