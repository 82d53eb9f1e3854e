use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::domain::action::action_graph::ActionKey;
use crate::domain::adaptor::storage_backend::StorageBackend;
use crate::domain::adaptor::worker_adaptor::{AdaptorError, WorkerAdaptor};
use crate::domain::data::data_info_provider::DataInfoProvider;
use crate::domain::data::data_location::DataLocation;
use crate::domain::job::codec::encode_frame;
use crate::domain::job::job::{Job, JobCommand, JobEvent, JobParameter, JobStatus, ParameterResult, TransferRequest};
use crate::domain::task::implementation::Implementation;
use crate::domain::task::parameter::{DataType, Direction};
use crate::domain::task::task::Task;
use crate::domain::utils::id::{JobId, WorkerName};

/// A launched action, as handed from the scheduler side to the job side.
#[derive(Debug, Clone)]
pub struct DispatchOrder {
    pub key: ActionKey,
    pub job_id: JobId,
    pub task: Arc<Task>,
    pub worker: WorkerName,
    /// Disks the worker mounts from shared storage.
    pub shared_disks: BTreeSet<String>,
    pub implementation: Implementation,
    pub timeout: Option<Duration>,
}

/// Builds jobs from dispatch orders and tracks the ones in flight so they can be cancelled.
///
/// The manager never touches action state. Each submitted job yields exactly one [`JobEvent`] through the
/// future returned by [`submit`](Self::submit), whatever happens to the worker.
#[derive(Debug)]
pub struct JobManager {
    adaptor: Arc<dyn WorkerAdaptor>,
    data: DataInfoProvider,
    storage: Option<Arc<dyn StorageBackend>>,
    running: HashMap<JobId, (WorkerName, CancellationToken)>,
}

impl JobManager {
    pub fn new(adaptor: Arc<dyn WorkerAdaptor>, data: DataInfoProvider) -> Self {
        JobManager { adaptor, data, storage: None, running: HashMap::new() }
    }

    pub fn with_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn adaptor(&self) -> Arc<dyn WorkerAdaptor> {
        self.adaptor.clone()
    }

    /// Resolves every parameter of the order against the data registry. Inputs already readable from the
    /// worker are referenced in place, the others get a transfer request listing all their replicas.
    pub fn create_job(&self, order: &DispatchOrder) -> Job {
        let mut parameters = Vec::with_capacity(order.task.parameters().len());
        let mut transfers = Vec::new();

        for (index, parameter) in order.task.parameters().iter().enumerate() {
            let mut job_parameter = JobParameter {
                index,
                direction: parameter.direction,
                data_type: parameter.data_type,
                value: parameter.value.clone(),
                read: None,
                source: None,
                write: None,
                target: None,
            };

            if let Some(access) = parameter.access {
                if let Some(read) = access.read_instance() {
                    // commutative members read whatever the previous member of their group left behind
                    let instance = match (parameter.direction, access.write_instance()) {
                        (Direction::Commutative, Some(write)) if !self.data.locations(write).is_empty() => write,
                        _ => read,
                    };
                    job_parameter.read = Some(instance);

                    let locations = self.data.locations(instance);
                    let local = locations
                        .iter()
                        .find(|l| matches!(l, DataLocation::Persistent { .. }) || l.is_local_to(&order.worker, &order.shared_disks));
                    match local {
                        Some(location) => job_parameter.source = Some(location.clone()),
                        // versions left behind by an ignored failure have no replica and reach the worker empty
                        None if locations.is_empty() => {}
                        None => transfers.push(TransferRequest {
                            parameter: index,
                            instance,
                            sources: locations,
                            destination: order.worker.clone(),
                        }),
                    }
                }

                if let Some(write) = access.write_instance() {
                    job_parameter.write = Some(write);
                    job_parameter.target = Some(match (&job_parameter.source, &self.storage) {
                        (Some(DataLocation::Persistent { object_id }), Some(storage)) if parameter.data_type == DataType::Psco => {
                            storage.new_version(object_id, false).unwrap_or_else(|_| write.rename())
                        }
                        _ => write.rename(),
                    });
                }
            }
            parameters.push(job_parameter);
        }

        let command = JobCommand {
            job_id: order.job_id,
            task_id: order.task.id,
            signature: order.implementation.signature.clone(),
            implementation: order.implementation.kind.clone(),
            parameters,
        };

        Job {
            id: order.job_id,
            key: order.key,
            task_id: order.task.id,
            worker: order.worker.clone(),
            implementation: order.implementation.clone(),
            transfers,
            command,
            timeout: order.timeout,
        }
    }

    /// Registers the job as running and returns the future that stages, ships and awaits it.
    pub fn submit(&mut self, job: Job) -> impl Future<Output = JobEvent> + use<> {
        let token = CancellationToken::new();
        self.running.insert(job.id, (job.worker.clone(), token.clone()));
        run_job(self.adaptor.clone(), self.data.clone(), job, token)
    }

    /// Requests the kill of a running job. Its event will carry `JobStatus::Cancelled`.
    pub fn cancel(&mut self, job_id: JobId) -> bool {
        match self.running.get(&job_id) {
            Some((worker, token)) => {
                tracing::info!("Cancelling {} on '{}'.", job_id, worker);
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) -> usize {
        for (_, token) in self.running.values() {
            token.cancel();
        }
        self.running.len()
    }

    pub fn job_finished(&mut self, job_id: JobId) {
        self.running.remove(&job_id);
    }

    pub fn running_jobs(&self) -> usize {
        self.running.len()
    }
}

struct Attempt {
    status: JobStatus,
    outputs: Vec<ParameterResult>,
    stdout: String,
    stderr: String,
    message: Option<String>,
}

impl Attempt {
    fn failed(status: JobStatus, message: impl Into<String>) -> Self {
        Attempt { status, outputs: Vec::new(), stdout: String::new(), stderr: String::new(), message: Some(message.into()) }
    }
}

/// Runs one job to its single terminal event. Cancellation and the timeout race the execution; whichever
/// finishes first decides the event and the loser is dropped.
pub async fn run_job(adaptor: Arc<dyn WorkerAdaptor>, data: DataInfoProvider, job: Job, token: CancellationToken) -> JobEvent {
    let started = Instant::now();
    tracing::info!("{} ({}) sent to '{}' with {} transfer(s).", job.id, job.task_id, job.worker, job.transfers.len());

    let deadline = job.timeout;
    let timeout = async move {
        match deadline {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };

    let event = tokio::select! {
        biased;
        _ = token.cancelled() => {
            if let Err(e) = adaptor.cancel_job(&job.worker, job.id).await {
                tracing::warn!("Kill of {} on '{}' failed: {}", job.id, job.worker, e);
            }
            JobEvent::new(&job, JobStatus::Cancelled, started.elapsed()).with_message("cancelled on request")
        }
        _ = timeout => {
            tracing::warn!("{} on '{}' exceeded its timeout of {:?}.", job.id, job.worker, job.timeout.unwrap_or_default());
            if let Err(e) = adaptor.cancel_job(&job.worker, job.id).await {
                tracing::warn!("Kill of {} on '{}' failed: {}", job.id, job.worker, e);
            }
            JobEvent::new(&job, JobStatus::Timeout, started.elapsed()).with_message("timeout")
        }
        attempt = execute(adaptor.clone(), data, job.clone()) => {
            let mut event = JobEvent::new(&job, attempt.status, started.elapsed());
            event.outputs = attempt.outputs;
            event.stdout = attempt.stdout;
            event.stderr = attempt.stderr;
            event.message = attempt.message;
            event
        }
    };

    match event.status {
        JobStatus::Ok => tracing::info!("{} finished OK after {:?}.", event.job_id, event.elapsed),
        status => tracing::warn!("{} ended with {}: {}", event.job_id, status, event.message.as_deref().unwrap_or("-")),
    }
    event
}

async fn execute(adaptor: Arc<dyn WorkerAdaptor>, data: DataInfoProvider, job: Job) -> Attempt {
    let staged = join_all(job.transfers.iter().map(|request| stage(adaptor.as_ref(), request))).await;

    let mut command = job.command.clone();
    for (request, result) in job.transfers.iter().zip(staged) {
        match result {
            Ok(location) => {
                data.add_location(request.instance, location.clone());
                if let Some(parameter) = command.parameters.get_mut(request.parameter) {
                    parameter.source = Some(location);
                }
            }
            Err(reason) => return Attempt::failed(JobStatus::TransfersFailed, reason),
        }
    }

    let frame = match encode_frame(&command) {
        Ok(frame) => frame,
        Err(e) => return Attempt::failed(JobStatus::SubmissionFailed, e.to_string()),
    };

    match adaptor.send_job(&job.worker, job.id, frame).await {
        Ok(output) => Attempt {
            status: JobStatus::Ok,
            outputs: output.outputs,
            stdout: output.stdout,
            stderr: output.stderr,
            message: None,
        },
        Err(AdaptorError::ExecutionFailed(failure)) => Attempt {
            status: JobStatus::ExecutionFailed,
            outputs: failure.outputs,
            stdout: failure.stdout,
            stderr: failure.stderr,
            message: Some(format!("exit code {}", failure.exit_code)),
        },
        Err(AdaptorError::TransferFailed(reason)) => Attempt::failed(JobStatus::TransfersFailed, reason),
        Err(e @ AdaptorError::ConnectionLost(_)) => Attempt::failed(JobStatus::ExecutionFailed, e.to_string()),
        Err(e) => Attempt::failed(JobStatus::SubmissionFailed, e.to_string()),
    }
}

/// Tries every replica in turn.
async fn stage(adaptor: &dyn WorkerAdaptor, request: &TransferRequest) -> Result<DataLocation, String> {
    let mut last_error = format!("no replica of {} is known", request.instance);
    for source in &request.sources {
        match adaptor.transfer_data(source, &request.destination, request.instance).await {
            Ok(location) => {
                tracing::debug!("{} staged from {} to '{}'.", request.instance, source, request.destination);
                return Ok(location);
            }
            Err(e) => {
                tracing::warn!("Transfer of {} from {} failed: {}", request.instance, source, e);
                last_error = e.to_string();
            }
        }
    }
    Err(last_error)
}
