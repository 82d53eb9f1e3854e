use thiserror::Error;

use crate::domain::utils::id::{DataName, WorkerName};
use crate::error::Error;

/// Why a task did not complete. Cloneable so it can travel to every interested party.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("data '{0}' is not available")]
    DataNotAvailable(DataName),

    #[error("no worker can ever satisfy the constraints: {0}")]
    UnschedulableConstraint(String),

    #[error("input transfer to '{worker}' failed: {reason}")]
    TransferFailed { worker: WorkerName, reason: String },

    #[error("submission to '{worker}' failed: {reason}")]
    SubmissionFailed { worker: WorkerName, reason: String },

    #[error("execution on '{worker}' failed: {reason}")]
    ExecutionFailed { worker: WorkerName, reason: String, stdout: String, stderr: String },

    #[error("job on '{0}' timed out")]
    Timeout(WorkerName),
}

impl TaskError {
    /// Failures another attempt could fix.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TaskError::DataNotAvailable(_) | TaskError::UnschedulableConstraint(_))
    }
}

impl From<TaskError> for Error {
    fn from(error: TaskError) -> Self {
        match error {
            TaskError::DataNotAvailable(name) => Error::DataNotAvailable(name),
            TaskError::UnschedulableConstraint(reason) => Error::UnschedulableConstraint(reason),
            TaskError::TransferFailed { worker, reason } => Error::TransferFailed { worker, reason },
            TaskError::SubmissionFailed { worker, reason } => Error::SubmissionFailed { worker, reason },
            TaskError::ExecutionFailed { worker, reason, .. } => Error::ExecutionFailed { worker, reason },
            TaskError::Timeout(worker) => Error::Timeout(worker),
        }
    }
}

/// Final state of a task as seen by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    /// Not executed; results restored from a checkpoint of a previous run.
    Recovered,
    /// `ignored` is set when the task's policy let successors run anyway.
    Failed { error: TaskError, ignored: bool },
    Cancelled,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Completed | TaskOutcome::Recovered)
    }

    /// Whether dependents may consume this task's outputs.
    pub fn releases_successors(&self) -> bool {
        matches!(self, TaskOutcome::Completed | TaskOutcome::Recovered | TaskOutcome::Failed { ignored: true, .. })
    }
}
