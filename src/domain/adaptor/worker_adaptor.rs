use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;

use crate::domain::data::data_instance::DataInstanceId;
use crate::domain::data::data_location::DataLocation;
use crate::domain::job::job::ParameterResult;
use crate::domain::utils::id::{JobId, WorkerName};

/// Details reported by a worker whose job ran and failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionFailure {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// What the job managed to produce before failing.
    pub outputs: Vec<ParameterResult>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdaptorError {
    #[error("worker '{0}' is unknown to the adaptor")]
    UnknownWorker(WorkerName),

    #[error("submission refused: {0}")]
    SubmissionFailed(String),

    #[error("execution failed with exit code {}", .0.exit_code)]
    ExecutionFailed(ExecutionFailure),

    #[error("transfer failed: {0}")]
    TransferFailed(String),

    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

/// Result of a job that finished successfully on its worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutput {
    pub outputs: Vec<ParameterResult>,
    pub stdout: String,
    pub stderr: String,
}

/// Transport towards the workers. The runtime only ever talks to workers through this trait.
///
/// `send_job` resolves once the job finished on the worker. Dropping its future does not stop the job; use
/// `cancel_job` for that.
#[async_trait]
pub trait WorkerAdaptor: Send + Sync + fmt::Debug {
    async fn ping_worker(&self, worker: &WorkerName) -> Result<(), AdaptorError>;

    /// Ships a framed job invocation and waits for its outcome.
    async fn send_job(&self, worker: &WorkerName, job_id: JobId, frame: Bytes) -> Result<JobOutput, AdaptorError>;

    /// Copies `instance` from `source` to `destination`, returning the new replica.
    async fn transfer_data(
        &self,
        source: &DataLocation,
        destination: &WorkerName,
        instance: DataInstanceId,
    ) -> Result<DataLocation, AdaptorError>;

    async fn cancel_job(&self, worker: &WorkerName, job_id: JobId) -> Result<(), AdaptorError>;

    async fn shutdown_worker(&self, worker: &WorkerName) -> Result<(), AdaptorError>;
}
