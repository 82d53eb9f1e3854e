use actix::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::domain::action::action_graph::ActionKey;
use crate::domain::data::data_instance::DataInstanceId;
use crate::domain::data::data_location::DataLocation;
use crate::domain::task::implementation::{Implementation, ImplementationKind};
use crate::domain::task::parameter::{DataType, Direction};
use crate::domain::utils::id::{JobId, TaskId, WorkerName};

/// Terminal status a worker (or the job manager on its behalf) reports for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Ok,
    /// An input could not be staged; the job never started.
    TransfersFailed,
    SubmissionFailed,
    ExecutionFailed,
    Timeout,
    /// Killed on request.
    Cancelled,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Ok => "OK",
            JobStatus::TransfersFailed => "TRANSFERS_FAILED",
            JobStatus::SubmissionFailed => "SUBMISSION_FAILED",
            JobStatus::ExecutionFailed => "EXECUTION_FAILED",
            JobStatus::Timeout => "TIMEOUT",
            JobStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{}", name)
    }
}

/// What one parameter of a finished job produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterResult {
    pub index: usize,
    pub produced: bool,
    pub location: Option<DataLocation>,
}

/// Staging of one input version onto the job's worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub parameter: usize,
    pub instance: DataInstanceId,
    /// Every known replica; tried in order until one succeeds.
    pub sources: Vec<DataLocation>,
    pub destination: WorkerName,
}

/// Parameter as shipped to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParameter {
    pub index: usize,
    pub direction: Direction,
    pub data_type: DataType,
    pub value: Option<String>,
    pub read: Option<DataInstanceId>,
    /// Where the worker finds the value to read, filled after staging.
    pub source: Option<DataLocation>,
    pub write: Option<DataInstanceId>,
    /// Name under which the worker stores the written value.
    pub target: Option<String>,
}

/// Serialized invocation of one task attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCommand {
    pub job_id: JobId,
    pub task_id: TaskId,
    pub signature: String,
    pub implementation: ImplementationKind,
    pub parameters: Vec<JobParameter>,
}

/// One dispatch attempt of an action on a worker.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub key: ActionKey,
    pub task_id: TaskId,
    pub worker: WorkerName,
    pub implementation: Implementation,
    pub transfers: Vec<TransferRequest>,
    pub command: JobCommand,
    pub timeout: Option<Duration>,
}

/// The single notification a job produces.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct JobEvent {
    pub job_id: JobId,
    pub key: ActionKey,
    pub task_id: TaskId,
    pub worker: WorkerName,
    pub signature: String,
    pub status: JobStatus,
    pub outputs: Vec<ParameterResult>,
    pub stdout: String,
    pub stderr: String,
    pub message: Option<String>,
    pub elapsed: Duration,
}

impl JobEvent {
    pub fn new(job: &Job, status: JobStatus, elapsed: Duration) -> Self {
        JobEvent {
            job_id: job.id,
            key: job.key,
            task_id: job.task_id,
            worker: job.worker.clone(),
            signature: job.implementation.signature.clone(),
            status,
            outputs: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
            message: None,
            elapsed,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
