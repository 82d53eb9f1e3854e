use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::domain::adaptor::worker_adaptor::{AdaptorError, ExecutionFailure, JobOutput, WorkerAdaptor};
use crate::domain::data::data_instance::DataInstanceId;
use crate::domain::data::data_location::DataLocation;
use crate::domain::job::codec::decode_frame;
use crate::domain::job::job::ParameterResult;
use crate::domain::task::parameter::DataType;
use crate::domain::utils::id::{JobId, TaskId, WorkerName};

/// Long enough to outlive any test or timeout.
const HANG_DURATION: Duration = Duration::from_secs(3600);
const KILLED_EXIT_CODE: i32 = 137;

/// How jobs of one signature behave on the simulated workers.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedBehaviour {
    pub duration: Duration,
    /// Fail the first `n` attempts of the signature, then succeed.
    pub fail_attempts: u32,
    pub always_fail: bool,
    /// Never finish on its own.
    pub hang: bool,
    pub exit_code: i32,
}

impl Default for SimulatedBehaviour {
    fn default() -> Self {
        SimulatedBehaviour { duration: Duration::from_millis(10), fail_attempts: 0, always_fail: false, hang: false, exit_code: 1 }
    }
}

/// A job the simulated workers ran to the end, in completion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedJob {
    pub job_id: JobId,
    pub task_id: TaskId,
    pub worker: WorkerName,
    pub signature: String,
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct SimulationState {
    workers: HashSet<WorkerName>,
    shut_down: HashSet<WorkerName>,
    attempts: HashMap<String, u32>,
    running: HashMap<WorkerName, u32>,
    max_running: HashMap<WorkerName, u32>,
    executed: Vec<ExecutedJob>,
    kills: HashMap<JobId, CancellationToken>,
    cancelled: Vec<JobId>,
    transfers: u32,
}

/// In-process stand-in for a fleet of workers. Jobs sleep instead of running; failures, hangs and broken
/// transfer sources are injected per signature or per host.
#[derive(Debug)]
pub struct SimulatedAdaptor {
    state: Mutex<SimulationState>,
    behaviours: HashMap<String, SimulatedBehaviour>,
    default_behaviour: SimulatedBehaviour,
    failure_rate: f64,
    broken_hosts: HashSet<WorkerName>,
    refusing: HashSet<WorkerName>,
}

impl SimulatedAdaptor {
    pub fn new<I, S>(workers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = SimulationState { workers: workers.into_iter().map(|w| WorkerName::new(w)).collect(), ..Default::default() };
        SimulatedAdaptor {
            state: Mutex::new(state),
            behaviours: HashMap::new(),
            default_behaviour: SimulatedBehaviour::default(),
            failure_rate: 0.0,
            broken_hosts: HashSet::new(),
            refusing: HashSet::new(),
        }
    }

    pub fn with_behaviour(mut self, signature: impl Into<String>, behaviour: SimulatedBehaviour) -> Self {
        self.behaviours.insert(signature.into(), behaviour);
        self
    }

    pub fn with_default_duration(mut self, duration: Duration) -> Self {
        self.default_behaviour.duration = duration;
        self
    }

    pub fn with_duration(self, signature: &str, duration: Duration) -> Self {
        let behaviour = SimulatedBehaviour { duration, ..self.behaviour(signature) };
        self.with_behaviour(signature, behaviour)
    }

    pub fn failing(self, signature: &str, attempts: u32) -> Self {
        let behaviour = SimulatedBehaviour { fail_attempts: attempts, ..self.behaviour(signature) };
        self.with_behaviour(signature, behaviour)
    }

    pub fn always_failing(self, signature: &str) -> Self {
        let behaviour = SimulatedBehaviour { always_fail: true, ..self.behaviour(signature) };
        self.with_behaviour(signature, behaviour)
    }

    pub fn hanging(self, signature: &str) -> Self {
        let behaviour = SimulatedBehaviour { hang: true, ..self.behaviour(signature) };
        self.with_behaviour(signature, behaviour)
    }

    /// Probability in `[0, 1]` that any job fails regardless of its behaviour.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Transfers reading from `host` fail.
    pub fn with_broken_host(mut self, host: &str) -> Self {
        self.broken_hosts.insert(WorkerName::new(host));
        self
    }

    /// Jobs sent to `worker` are refused at submission.
    pub fn refusing(mut self, worker: &str) -> Self {
        self.refusing.insert(WorkerName::new(worker));
        self
    }

    pub fn register_worker(&self, worker: &WorkerName) {
        let mut state = self.lock();
        state.shut_down.remove(worker);
        state.workers.insert(worker.clone());
    }

    fn behaviour(&self, signature: &str) -> SimulatedBehaviour {
        self.behaviours.get(signature).cloned().unwrap_or_else(|| self.default_behaviour.clone())
    }

    fn lock(&self) -> MutexGuard<'_, SimulationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_active(&self, worker: &WorkerName) -> bool {
        let state = self.lock();
        state.workers.contains(worker) && !state.shut_down.contains(worker)
    }

    pub fn executed(&self) -> Vec<ExecutedJob> {
        self.lock().executed.clone()
    }

    /// Highest number of jobs that ran at the same time on `worker`.
    pub fn max_concurrency(&self, worker: &str) -> u32 {
        self.lock().max_running.get(&WorkerName::new(worker)).copied().unwrap_or(0)
    }

    pub fn attempts(&self, signature: &str) -> u32 {
        self.lock().attempts.get(signature).copied().unwrap_or(0)
    }

    pub fn cancelled_jobs(&self) -> Vec<JobId> {
        self.lock().cancelled.clone()
    }

    pub fn transfer_count(&self) -> u32 {
        self.lock().transfers
    }

    pub fn is_shut_down(&self, worker: &str) -> bool {
        self.lock().shut_down.contains(&WorkerName::new(worker))
    }
}

#[async_trait]
impl WorkerAdaptor for SimulatedAdaptor {
    async fn ping_worker(&self, worker: &WorkerName) -> Result<(), AdaptorError> {
        if self.is_active(worker) { Ok(()) } else { Err(AdaptorError::UnknownWorker(worker.clone())) }
    }

    async fn send_job(&self, worker: &WorkerName, job_id: JobId, frame: Bytes) -> Result<JobOutput, AdaptorError> {
        if !self.is_active(worker) {
            return Err(AdaptorError::UnknownWorker(worker.clone()));
        }
        if self.refusing.contains(worker) {
            return Err(AdaptorError::SubmissionFailed(format!("'{}' refuses jobs", worker)));
        }
        let command = decode_frame(&frame).map_err(|e| AdaptorError::SubmissionFailed(e.to_string()))?;
        let behaviour = self.behaviour(&command.signature);

        let kill = CancellationToken::new();
        let attempt = {
            let mut state = self.lock();
            let attempt = state.attempts.entry(command.signature.clone()).or_insert(0);
            *attempt += 1;
            let attempt = *attempt;

            let running = state.running.entry(worker.clone()).or_insert(0);
            *running += 1;
            let running = *running;
            let max = state.max_running.entry(worker.clone()).or_insert(0);
            *max = (*max).max(running);
            state.kills.insert(job_id, kill.clone());
            attempt
        };

        let sleep_for = if behaviour.hang { HANG_DURATION } else { behaviour.duration };
        let killed = tokio::select! {
            _ = kill.cancelled() => true,
            _ = tokio::time::sleep(sleep_for) => false,
        };

        let failed = behaviour.always_fail || attempt <= behaviour.fail_attempts || rand::random::<f64>() < self.failure_rate;
        {
            let mut state = self.lock();
            if let Some(running) = state.running.get_mut(worker) {
                *running = running.saturating_sub(1);
            }
            state.kills.remove(&job_id);
            if !killed {
                state.executed.push(ExecutedJob {
                    job_id,
                    task_id: command.task_id,
                    worker: worker.clone(),
                    signature: command.signature.clone(),
                    succeeded: !failed,
                });
            }
        }

        if killed {
            return Err(AdaptorError::ExecutionFailed(ExecutionFailure {
                exit_code: KILLED_EXIT_CODE,
                stderr: "killed".to_string(),
                ..Default::default()
            }));
        }
        if failed {
            return Err(AdaptorError::ExecutionFailed(ExecutionFailure {
                exit_code: behaviour.exit_code,
                stdout: String::new(),
                stderr: format!("{} failed on attempt {}", command.signature, attempt),
                outputs: Vec::new(),
            }));
        }

        let outputs = command
            .parameters
            .iter()
            .filter_map(|p| {
                let target = p.target.clone()?;
                let location = match (p.data_type, &p.source) {
                    (DataType::Psco, _) | (_, Some(DataLocation::Persistent { .. })) => {
                        DataLocation::Persistent { object_id: target }
                    }
                    _ => DataLocation::worker(worker.clone(), format!("/sim/{}/{}", worker, target)),
                };
                Some(ParameterResult { index: p.index, produced: true, location: Some(location) })
            })
            .collect();

        Ok(JobOutput { outputs, stdout: format!("{} done", command.signature), stderr: String::new() })
    }

    async fn transfer_data(
        &self,
        source: &DataLocation,
        destination: &WorkerName,
        instance: DataInstanceId,
    ) -> Result<DataLocation, AdaptorError> {
        if !self.is_active(destination) {
            return Err(AdaptorError::UnknownWorker(destination.clone()));
        }
        if let DataLocation::Worker { host, .. } = source {
            if self.broken_hosts.contains(host) {
                return Err(AdaptorError::TransferFailed(format!("'{}' is unreachable", host)));
            }
        }
        self.lock().transfers += 1;
        Ok(DataLocation::worker(destination.clone(), format!("/sim/{}/{}", destination, instance.rename())))
    }

    async fn cancel_job(&self, _worker: &WorkerName, job_id: JobId) -> Result<(), AdaptorError> {
        let mut state = self.lock();
        state.cancelled.push(job_id);
        if let Some(kill) = state.kills.remove(&job_id) {
            kill.cancel();
        }
        Ok(())
    }

    async fn shutdown_worker(&self, worker: &WorkerName) -> Result<(), AdaptorError> {
        self.lock().shut_down.insert(worker.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::codec::encode_frame;
    use crate::domain::job::job::{JobCommand, JobParameter};
    use crate::domain::task::implementation::ImplementationKind;
    use crate::domain::task::parameter::Direction;

    fn frame(signature: &str) -> Bytes {
        encode_frame(&JobCommand {
            job_id: JobId(1),
            task_id: TaskId(1),
            signature: signature.to_string(),
            implementation: ImplementationKind::Method { declaring_class: "app".into(), method: "work".into() },
            parameters: vec![JobParameter {
                index: 0,
                direction: Direction::Out,
                data_type: DataType::File,
                value: None,
                read: None,
                source: None,
                write: None,
                target: Some("d1v2".into()),
            }],
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_job_produces_declared_outputs() {
        let adaptor = SimulatedAdaptor::new(["w1"]).with_default_duration(Duration::from_millis(1));
        let output = adaptor.send_job(&WorkerName::new("w1"), JobId(1), frame("app.work")).await.unwrap();
        assert_eq!(output.outputs.len(), 1);
        assert_eq!(output.outputs[0].location, Some(DataLocation::worker(WorkerName::new("w1"), "/sim/w1/d1v2")));
        assert_eq!(adaptor.executed().len(), 1);
        assert_eq!(adaptor.max_concurrency("w1"), 1);
    }

    #[tokio::test]
    async fn test_fails_first_attempts_only() {
        let adaptor = SimulatedAdaptor::new(["w1"]).failing("app.flaky", 1).with_duration("app.flaky", Duration::from_millis(1));
        let worker = WorkerName::new("w1");
        assert!(matches!(adaptor.send_job(&worker, JobId(1), frame("app.flaky")).await, Err(AdaptorError::ExecutionFailed(_))));
        assert!(adaptor.send_job(&worker, JobId(2), frame("app.flaky")).await.is_ok());
        assert_eq!(adaptor.attempts("app.flaky"), 2);
    }

    #[tokio::test]
    async fn test_unknown_and_shut_down_workers_refuse_jobs() {
        let adaptor = SimulatedAdaptor::new(["w1"]);
        assert!(adaptor.ping_worker(&WorkerName::new("w9")).await.is_err());
        adaptor.shutdown_worker(&WorkerName::new("w1")).await.unwrap();
        assert!(adaptor.is_shut_down("w1"));
        assert!(matches!(
            adaptor.send_job(&WorkerName::new("w1"), JobId(1), frame("app.work")).await,
            Err(AdaptorError::UnknownWorker(_))
        ));
    }

    #[tokio::test]
    async fn test_broken_host_fails_transfers() {
        let adaptor = SimulatedAdaptor::new(["w1", "w2"]).with_broken_host("w1");
        let instance = DataInstanceId::new(crate::domain::data::data_instance::DataId(1), 1);
        let from_w1 = DataLocation::worker(WorkerName::new("w1"), "/f");
        let shared = DataLocation::Shared { disk: "nfs".into(), path: "/f".into() };

        assert!(adaptor.transfer_data(&from_w1, &WorkerName::new("w2"), instance).await.is_err());
        assert!(adaptor.transfer_data(&shared, &WorkerName::new("w2"), instance).await.is_ok());
        assert_eq!(adaptor.transfer_count(), 1);
    }
}
