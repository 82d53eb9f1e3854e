use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::action::action_graph::{ActionGraph, ActionKey, Linked};
use crate::domain::action::allocatable_action::ActionState;
use crate::domain::data::data_info_provider::DataInfoProvider;
use crate::domain::job::job::{JobEvent, JobStatus, ParameterResult};
use crate::domain::job::job_listener::JobListener;
use crate::domain::job::job_manager::DispatchOrder;
use crate::domain::resource::resource_update::ResourceUpdate;
use crate::domain::resource::worker::Worker;
use crate::domain::scheduler::task_scheduler::{Assignment, Launch, SchedulingRequest, TaskScheduler};
use crate::domain::task::implementation::Implementation;
use crate::domain::task::outcome::{TaskError, TaskOutcome};
use crate::domain::task::task::{OnFailure, Task};
use crate::domain::utils::id::{JobId, TaskId, WorkerName};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Attempts granted to a RETRY task after its first failure, unless the task overrides it.
    pub retry_budget: u32,
    pub default_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig { retry_budget: 2, default_timeout: None }
    }
}

/// Terminal notification of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEnd {
    pub task_id: TaskId,
    pub outcome: TaskOutcome,
    /// Set when the failure must abort the application.
    pub fatal: bool,
}

/// Work the caller must carry out on behalf of the orchestrator.
#[derive(Debug, Clone)]
pub enum Effect {
    Dispatch(DispatchOrder),
    CancelJob { job_id: JobId, worker: WorkerName },
    TaskEnded(TaskEnd),
}

/// Drives every action through its state machine.
///
/// The orchestrator is purely synchronous: each call consumes one event (a new action, a job notification,
/// a cancellation, a resource change) and returns the effects it produced, in order. Job execution and
/// notification delivery are left to the caller.
#[derive(Debug)]
pub struct ActionOrchestrator {
    graph: ActionGraph,
    scheduler: TaskScheduler,
    data: DataInfoProvider,
    listener: JobListener,
    config: OrchestratorConfig,
    next_job_id: u64,
    effects: Vec<Effect>,
}

impl ActionOrchestrator {
    pub fn new(scheduler: TaskScheduler, data: DataInfoProvider, config: OrchestratorConfig) -> Self {
        ActionOrchestrator {
            graph: ActionGraph::new(),
            scheduler,
            data,
            listener: JobListener::new(),
            config,
            next_job_id: 0,
            effects: Vec::new(),
        }
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn action_state(&self, task_id: TaskId) -> Option<ActionState> {
        self.graph.state_of(task_id)
    }

    /// Number of actions that have not reached a terminal state.
    pub fn pending_actions(&self) -> usize {
        self.graph.live_keys().len()
    }

    pub fn discarded_notifications(&self) -> u64 {
        self.listener.discarded()
    }

    /// Inserts an analysed task. It becomes READY right away when nothing it depends on is pending.
    pub fn new_action(&mut self, task: Arc<Task>) -> Vec<Effect> {
        let retries = task.description.retry_budget.unwrap_or(self.config.retry_budget);
        let timeout = task.description.timeout.or(self.config.default_timeout);
        let (key, linked) = self.graph.insert(task.clone(), retries, timeout);
        self.set_state(key, ActionState::WaitingDeps);

        if let Some(name) = &task.missing_data {
            self.terminate_failed(key, TaskError::DataNotAvailable(name.clone()));
        } else {
            match linked {
                Linked::Free => {
                    self.set_state(key, ActionState::Ready);
                    self.try_schedule(key);
                }
                Linked::Waiting => log::debug!("{} waits for its predecessors.", task.id),
                Linked::PredecessorFailed => {
                    log::info!("{} cancelled: a predecessor did not complete.", task.id);
                    self.cancel_action(key);
                }
            }
        }
        self.take_effects()
    }

    /// Consumes the notification of a job. Duplicates and notifications of superseded attempts are discarded.
    pub fn job_event(&mut self, event: &JobEvent) -> Vec<Effect> {
        if !self.listener.accept(event.job_id) {
            return Vec::new();
        }
        let Some(action) = self.graph.get_mut(event.key) else {
            log::debug!("{} reported for a forgotten action.", event.job_id);
            self.listener.discard(event.job_id);
            return Vec::new();
        };
        if action.current_job != Some(event.job_id) || action.state() != ActionState::Running {
            log::debug!("{} of {} is stale.", event.job_id, event.task_id);
            self.listener.discard(event.job_id);
            return Vec::new();
        }
        action.current_job = None;
        let cancel_requested = action.cancel_requested;

        let launches = self.scheduler.release(&event.worker, event.key);
        match event.status {
            JobStatus::Ok => {
                self.scheduler.record_execution(&event.worker, &event.signature, event.elapsed);
                self.complete(event.key, &event.outputs);
            }
            JobStatus::Cancelled => self.cancel_action(event.key),
            _ if cancel_requested => self.cancel_action(event.key),
            _ => self.handle_failure(event.key, failure_of(event)),
        }
        self.apply_launches(launches);
        self.take_effects()
    }

    /// Cancels a task. A queued action is withdrawn at once; a running one gets its job killed and ends when
    /// the kill is reported.
    pub fn cancel_task(&mut self, task_id: TaskId) -> Vec<Effect> {
        if let Some(key) = self.graph.key_of(task_id) {
            self.request_cancel(key);
        }
        self.take_effects()
    }

    /// Cancels every live action, in submission order.
    pub fn cancel_all(&mut self) -> Vec<Effect> {
        for key in self.graph.live_keys() {
            self.request_cancel(key);
        }
        self.take_effects()
    }

    pub fn add_worker(&mut self, worker: Worker) -> Vec<Effect> {
        if self.scheduler.add_worker(worker) {
            let launches = self.scheduler.rebalance();
            self.apply_launches(launches);
        }
        self.take_effects()
    }

    /// Applies a resource change. Queued actions the worker can no longer host are placed again, failing when
    /// no worker qualifies.
    pub fn update_worker(&mut self, name: &WorkerName, update: &ResourceUpdate) -> Result<Vec<Effect>> {
        let outcome = self.scheduler.update_worker(name, update)?;
        for request in outcome.displaced {
            self.reschedule(request.key);
        }
        let mut launches = outcome.launches;
        launches.extend(self.scheduler.rebalance());
        self.apply_launches(launches);
        Ok(self.take_effects())
    }

    /// Stops using a worker. Actions queued on it are placed again; running ones fail through their jobs.
    pub fn remove_worker(&mut self, name: &WorkerName) -> Vec<Effect> {
        for request in self.scheduler.remove_worker(name) {
            self.reschedule(request.key);
        }
        self.take_effects()
    }

    pub fn steal_tasks(&mut self, from: &WorkerName, to: &WorkerName, count: usize) -> (usize, Vec<Effect>) {
        let (moved, launches) = self.scheduler.steal_tasks(from, to, count);
        self.apply_launches(launches);
        (moved, self.take_effects())
    }

    /// Hands the accumulated effects to the caller, after recording where moved queued actions now wait.
    fn take_effects(&mut self) -> Vec<Effect> {
        for moved in self.scheduler.take_requeued() {
            if let Some(action) = self.graph.get_mut(moved.key) {
                if action.state() == ActionState::Ready {
                    action.assigned_worker = Some(moved.worker);
                    action.assigned_implementation = Some(moved.implementation);
                    action.score = Some(moved.score);
                }
            }
        }
        std::mem::take(&mut self.effects)
    }

    /// Where a queued action waits, if it is queued.
    pub fn queued_on(&self, task_id: TaskId) -> Option<&WorkerName> {
        let action = self.graph.get(self.graph.key_of(task_id)?)?;
        match action.state() {
            ActionState::Ready => action.assigned_worker.as_ref(),
            _ => None,
        }
    }

    fn reschedule(&mut self, key: ActionKey) {
        if let Some(action) = self.graph.get_mut(key) {
            action.assigned_worker = None;
            action.assigned_implementation = None;
            action.score = None;
        }
        self.try_schedule(key);
    }

    fn set_state(&mut self, key: ActionKey, next: ActionState) -> bool {
        self.graph.get_mut(key).map(|a| a.transition(next)).unwrap_or(false)
    }

    fn request_for(&self, key: ActionKey) -> Option<SchedulingRequest> {
        let action = self.graph.get(key)?;
        Some(SchedulingRequest {
            key,
            action_id: action.id,
            task_id: action.task_id(),
            priority: action.task.description.priority,
            implementations: action.task.description.implementations.clone(),
            inputs: action.task.input_instances(),
            excluded_worker: action.excluded_worker.clone(),
        })
    }

    fn try_schedule(&mut self, key: ActionKey) {
        if self.graph.state_of_key(key) != Some(ActionState::Ready) {
            return;
        }
        if !self.graph.try_acquire_mutexes(key) {
            log::debug!("{:?} waits for its commutative group.", key);
            return;
        }
        let Some(request) = self.request_for(key) else {
            return;
        };

        match self.scheduler.schedule(&request) {
            Ok(Assignment::Launch { worker, implementation, score }) => {
                if let Some(action) = self.graph.get_mut(key) {
                    action.score = Some(score);
                }
                self.launch(key, worker, implementation);
            }
            Ok(Assignment::Queued { worker, implementation, score }) => {
                if let Some(action) = self.graph.get_mut(key) {
                    action.assigned_worker = Some(worker);
                    action.assigned_implementation = Some(implementation);
                    action.score = Some(score);
                }
            }
            Err(Error::UnschedulableConstraint(reason)) => self.terminate_failed(key, TaskError::UnschedulableConstraint(reason)),
            Err(e) => self.terminate_failed(key, TaskError::UnschedulableConstraint(e.to_string())),
        }
    }

    fn launch(&mut self, key: ActionKey, worker: WorkerName, implementation: Implementation) {
        let shared_disks = self.scheduler.worker(&worker).map(|w| w.shared_disks.clone()).unwrap_or_default();
        self.next_job_id += 1;
        let job_id = JobId(self.next_job_id);

        let Some(action) = self.graph.get_mut(key) else {
            return;
        };
        if !action.transition(ActionState::Scheduled) || !action.transition(ActionState::Running) {
            return;
        }
        action.assigned_worker = Some(worker.clone());
        action.assigned_implementation = Some(implementation.clone());
        action.attempts += 1;
        action.current_job = Some(job_id);
        self.listener.dispatched(job_id);

        log::info!("{} attempt {} dispatched to '{}' as {}.", action.task_id(), action.attempts, worker, job_id);
        self.effects.push(Effect::Dispatch(DispatchOrder {
            key,
            job_id,
            task: action.task.clone(),
            worker,
            shared_disks,
            implementation,
            timeout: action.timeout,
        }));
    }

    /// Starts every launch still wanted. A reservation taken for an action that ended meanwhile is handed back,
    /// which may in turn launch more.
    fn apply_launches(&mut self, launches: Vec<Launch>) {
        let mut pending: VecDeque<Launch> = launches.into();
        while let Some(launch) = pending.pop_front() {
            if self.graph.state_of_key(launch.key) == Some(ActionState::Ready) {
                self.launch(launch.key, launch.worker, launch.implementation);
            } else {
                pending.extend(self.scheduler.release(&launch.worker, launch.key));
            }
        }
    }

    fn complete(&mut self, key: ActionKey, outputs: &[ParameterResult]) {
        let Some(action) = self.graph.get_mut(key) else {
            return;
        };
        action.transition(ActionState::Completed);
        let task = action.task.clone();

        for (index, parameter) in task.parameters().iter().enumerate() {
            if let Some(write) = parameter.access.and_then(|a| a.write_instance()) {
                let locations = outputs
                    .iter()
                    .filter(|o| o.index == index && o.produced)
                    .filter_map(|o| o.location.clone())
                    .collect();
                self.data.version_produced(write, locations);
            }
        }
        log::info!("{} completed.", task.id);
        self.finish(key, TaskOutcome::Completed, false);
    }

    fn handle_failure(&mut self, key: ActionKey, error: TaskError) {
        let Some(action) = self.graph.get_mut(key) else {
            return;
        };

        let retry = action.task.description.on_failure == OnFailure::Retry && action.retries_left > 0 && error.is_retryable();
        if !retry {
            self.terminate_failed(key, error);
            return;
        }

        action.retries_left -= 1;
        action.excluded_worker = action.assigned_worker.take();
        action.assigned_implementation = None;
        log::warn!("{} failed ({}), retrying with {} retry(ies) left.", action.task_id(), error, action.retries_left);

        if action.transition(ActionState::WaitingDeps) && action.transition(ActionState::Ready) {
            self.try_schedule(key);
        }
    }

    /// Fails an action for good and applies its on-failure policy.
    fn terminate_failed(&mut self, key: ActionKey, error: TaskError) {
        let Some(action) = self.graph.get_mut(key) else {
            return;
        };
        if !action.transition(ActionState::Failed) {
            return;
        }
        let policy = action.task.description.on_failure;
        log::error!("{} failed under policy {:?}: {}", action.task_id(), policy, error);

        match policy {
            OnFailure::Ignore => {
                action.failure_ignored = true;
                for write in action.task.output_instances() {
                    self.data.version_produced(write, Vec::new());
                }
                self.finish(key, TaskOutcome::Failed { error, ignored: true }, false);
            }
            OnFailure::CancelSuccessors => self.finish(key, TaskOutcome::Failed { error, ignored: false }, false),
            OnFailure::Fail | OnFailure::Retry => self.finish(key, TaskOutcome::Failed { error, ignored: false }, true),
        }
    }

    fn request_cancel(&mut self, key: ActionKey) {
        let Some(action) = self.graph.get_mut(key) else {
            return;
        };
        match action.state() {
            state if state.is_terminal() => {}
            ActionState::Running => {
                if !action.cancel_requested {
                    action.cancel_requested = true;
                    if let (Some(job_id), Some(worker)) = (action.current_job, action.assigned_worker.clone()) {
                        log::info!("Kill of {} requested for {}.", job_id, action.task_id());
                        self.effects.push(Effect::CancelJob { job_id, worker });
                    }
                }
            }
            _ => {
                self.scheduler.cancel(key);
                self.cancel_action(key);
            }
        }
    }

    fn cancel_action(&mut self, key: ActionKey) {
        if self.set_state(key, ActionState::Cancelled) {
            self.finish(key, TaskOutcome::Cancelled, false);
        }
    }

    /// Common tail of every terminal transition: data bookkeeping, mutex hand-over, successor release or
    /// cancellation, then the notification.
    fn finish(&mut self, key: ActionKey, outcome: TaskOutcome, fatal: bool) {
        let Some(task) = self.graph.get(key).map(|a| a.task.clone()) else {
            return;
        };
        self.release_data(&task, &outcome);
        self.graph.detach(key);
        let woken = self.graph.release_mutexes(key);
        self.effects.push(Effect::TaskEnded(TaskEnd { task_id: task.id, outcome: outcome.clone(), fatal }));

        if outcome.releases_successors() {
            for successor in self.graph.release_successors(key) {
                self.set_state(successor, ActionState::Ready);
                self.try_schedule(successor);
            }
        } else {
            for cancelled in self.graph.cancel_successors(key) {
                self.cascade_cancelled(cancelled);
            }
        }
        self.graph.prune(key);

        for waiter in woken {
            self.try_schedule(waiter);
        }
    }

    /// Bookkeeping of a successor the graph already moved to CANCELLED.
    fn cascade_cancelled(&mut self, key: ActionKey) {
        let Some(task) = self.graph.get(key).map(|a| a.task.clone()) else {
            return;
        };
        log::info!("{} cancelled: a predecessor did not complete.", task.id);
        self.scheduler.cancel(key);
        self.release_data(&task, &TaskOutcome::Cancelled);
        self.graph.detach(key);
        let woken = self.graph.release_mutexes(key);
        self.effects.push(Effect::TaskEnded(TaskEnd { task_id: task.id, outcome: TaskOutcome::Cancelled, fatal: false }));
        self.graph.prune(key);
        for waiter in woken {
            self.try_schedule(waiter);
        }
    }

    fn release_data(&self, task: &Task, outcome: &TaskOutcome) {
        if !outcome.releases_successors() {
            for write in task.output_instances() {
                self.data.version_failed(write);
            }
        }
        for parameter in task.parameters() {
            if let Some(access) = &parameter.access {
                self.data.access_finished(access);
            }
        }
    }
}

fn failure_of(event: &JobEvent) -> TaskError {
    let worker = event.worker.clone();
    let reason = event.message.clone().unwrap_or_else(|| event.status.to_string());
    match event.status {
        JobStatus::TransfersFailed => TaskError::TransferFailed { worker, reason },
        JobStatus::SubmissionFailed => TaskError::SubmissionFailed { worker, reason },
        JobStatus::Timeout => TaskError::Timeout(worker),
        JobStatus::ExecutionFailed | JobStatus::Ok | JobStatus::Cancelled => {
            TaskError::ExecutionFailed { worker, reason, stdout: event.stdout.clone(), stderr: event.stderr.clone() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::data::data_instance::AccessMode;
    use crate::domain::data::data_location::DataLocation;
    use crate::domain::resource::resource_description::ResourceDescription;
    use crate::domain::scheduler::scheduling_policy::SchedulingPolicy;
    use crate::domain::task::implementation::Constraints;
    use crate::domain::task::parameter::{DataType, Direction, Parameter};
    use crate::domain::task::task::{MutexGroupId, TaskDescription};
    use crate::domain::utils::id::DataName;

    struct Harness {
        orchestrator: ActionOrchestrator,
        data: DataInfoProvider,
    }

    impl Harness {
        fn new(workers: &[(&str, u32)]) -> Self {
            let data = DataInfoProvider::new();
            let scheduler = TaskScheduler::new(SchedulingPolicy::Fifo, data.clone());
            let config = OrchestratorConfig { retry_budget: 1, default_timeout: None };
            let mut orchestrator = ActionOrchestrator::new(scheduler, data.clone(), config);
            for (name, cores) in workers {
                orchestrator.add_worker(Worker::new(*name, ResourceDescription::new(*cores, 4096)));
            }
            Harness { orchestrator, data }
        }

        fn task(&self, id: u64, cores: u32, predecessors: &[u64], on_failure: OnFailure) -> Arc<Task> {
            let implementation = Implementation::method(0, "app.work", Constraints::with_cores(cores));
            let description = TaskDescription::new("app.work", vec![implementation]).with_on_failure(on_failure);
            let mut task = Task::new(TaskId(id), description);
            task.predecessors = predecessors.iter().map(|p| TaskId(*p)).collect();
            Arc::new(task)
        }

        fn submit(&mut self, task: Arc<Task>) -> Vec<Effect> {
            self.orchestrator.new_action(task)
        }

        fn state(&self, id: u64) -> Option<ActionState> {
            self.orchestrator.action_state(TaskId(id))
        }
    }

    fn dispatches(effects: &[Effect]) -> Vec<DispatchOrder> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Dispatch(order) => Some(order.clone()),
                _ => None,
            })
            .collect()
    }

    fn ends(effects: &[Effect]) -> Vec<TaskEnd> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::TaskEnded(end) => Some(end.clone()),
                _ => None,
            })
            .collect()
    }

    fn event(order: &DispatchOrder, status: JobStatus) -> JobEvent {
        JobEvent {
            job_id: order.job_id,
            key: order.key,
            task_id: order.task.id,
            worker: order.worker.clone(),
            signature: order.implementation.signature.clone(),
            status,
            outputs: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
            message: None,
            elapsed: Duration::from_millis(3),
        }
    }

    #[test]
    fn test_successor_waits_for_predecessor() {
        let mut h = Harness::new(&[("w1", 4)]);
        let first = dispatches(&h.submit(h.task(1, 1, &[], OnFailure::Retry)));
        assert!(dispatches(&h.submit(h.task(2, 1, &[1], OnFailure::Retry))).is_empty());
        assert_eq!(h.state(2), Some(ActionState::WaitingDeps));

        let effects = h.orchestrator.job_event(&event(&first[0], JobStatus::Ok));
        assert_eq!(ends(&effects)[0].outcome, TaskOutcome::Completed);
        assert_eq!(dispatches(&effects).len(), 1);
        assert_eq!(h.state(2), Some(ActionState::Running));
        assert_eq!(h.state(1), None, "completed actions are pruned");
    }

    #[test]
    fn test_writer_output_becomes_readable_version() {
        let mut h = Harness::new(&[("w1", 1)]);
        let name = DataName::new("f");
        let write = h.data.will_access(&name, AccessMode::Write, DataType::File, TaskId(1)).unwrap();
        let mut task = (*h.task(1, 1, &[], OnFailure::Retry)).clone();
        let mut parameter = Parameter::file(Direction::Out, "f");
        parameter.access = Some(write);
        task.description.parameters.push(parameter);

        let order = dispatches(&h.submit(Arc::new(task))).remove(0);
        let mut done = event(&order, JobStatus::Ok);
        let location = DataLocation::worker(WorkerName::new("w1"), "/out/f");
        done.outputs.push(ParameterResult { index: 0, produced: true, location: Some(location) });
        h.orchestrator.job_event(&done);

        let instance = write.write_instance().unwrap();
        assert_eq!(h.data.locations(instance), vec![DataLocation::worker(WorkerName::new("w1"), "/out/f")]);
    }

    #[test]
    fn test_two_core_worker_runs_two_single_core_tasks() {
        let mut h = Harness::new(&[("w1", 2)]);
        let mut running = Vec::new();
        for id in 1..=3 {
            running.extend(dispatches(&h.submit(h.task(id, 1, &[], OnFailure::Retry))));
        }
        assert_eq!(running.len(), 2);
        assert_eq!(h.state(3), Some(ActionState::Ready));

        let effects = h.orchestrator.job_event(&event(&running[0], JobStatus::Ok));
        let next = dispatches(&effects);
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].task.id, TaskId(3));
    }

    #[test]
    fn test_unschedulable_fails_without_retry() {
        let mut h = Harness::new(&[("w1", 2)]);
        let effects = h.submit(h.task(1, 16, &[], OnFailure::Retry));

        assert!(dispatches(&effects).is_empty());
        let end = &ends(&effects)[0];
        assert!(matches!(end.outcome, TaskOutcome::Failed { error: TaskError::UnschedulableConstraint(_), ignored: false }));
        assert!(end.fatal);
        assert_eq!(h.state(1), None, "nothing depends on it, so it is forgotten");
        assert_eq!(h.orchestrator.pending_actions(), 0);
    }

    #[test]
    fn test_cancel_successors_cascades() {
        let mut h = Harness::new(&[("w1", 4)]);
        let root = dispatches(&h.submit(h.task(1, 1, &[], OnFailure::CancelSuccessors))).remove(0);
        h.submit(h.task(2, 1, &[1], OnFailure::Retry));
        h.submit(h.task(3, 1, &[2], OnFailure::Retry));
        h.submit(h.task(4, 1, &[], OnFailure::Retry));

        let effects = h.orchestrator.job_event(&event(&root, JobStatus::ExecutionFailed));
        assert!(dispatches(&effects).is_empty(), "no successor may run");
        let ended = ends(&effects);
        assert_eq!(ended.len(), 3);
        assert!(!ended[0].fatal);
        assert_eq!(ended[1], TaskEnd { task_id: TaskId(2), outcome: TaskOutcome::Cancelled, fatal: false });
        assert_eq!(ended[2].task_id, TaskId(3));
        assert_eq!(h.state(3), None);
        assert_eq!(h.state(4), Some(ActionState::Running));

        let late = h.submit(h.task(5, 1, &[3], OnFailure::Retry));
        assert_eq!(ends(&late)[0].outcome, TaskOutcome::Cancelled);
    }

    #[test]
    fn test_late_success_after_timeout_is_discarded() {
        let mut h = Harness::new(&[("w1", 1)]);
        let order = dispatches(&h.submit(h.task(1, 1, &[], OnFailure::Fail))).remove(0);

        let effects = h.orchestrator.job_event(&event(&order, JobStatus::Timeout));
        assert!(matches!(ends(&effects)[0].outcome, TaskOutcome::Failed { error: TaskError::Timeout(_), .. }));

        assert!(h.orchestrator.job_event(&event(&order, JobStatus::Ok)).is_empty());
        assert_eq!(h.state(1), None);
        assert_eq!(h.orchestrator.discarded_notifications(), 1);
    }

    #[test]
    fn test_duplicate_notification_releases_once() {
        let mut h = Harness::new(&[("w1", 1)]);
        let first = dispatches(&h.submit(h.task(1, 1, &[], OnFailure::Retry))).remove(0);
        h.submit(h.task(2, 1, &[], OnFailure::Retry));
        h.submit(h.task(3, 1, &[], OnFailure::Retry));

        let done = event(&first, JobStatus::Ok);
        let effects = h.orchestrator.job_event(&done);
        let second = dispatches(&effects).remove(0);
        assert_eq!(second.task.id, TaskId(2));

        assert!(h.orchestrator.job_event(&done).is_empty());
        assert_eq!(h.orchestrator.discarded_notifications(), 1);
        assert_eq!(h.state(3), Some(ActionState::Ready), "the duplicate freed no capacity");
        let w1 = h.orchestrator.scheduler().resource_scheduler(&WorkerName::new("w1")).unwrap();
        assert_eq!((w1.running_len(), w1.queue_len()), (1, 1));
        assert_eq!(w1.worker().running_tasks(), 1);

        let effects = h.orchestrator.job_event(&event(&second, JobStatus::Ok));
        assert_eq!(dispatches(&effects)[0].task.id, TaskId(3));
    }

    #[test]
    fn test_retry_avoids_failed_worker() {
        let mut h = Harness::new(&[("w1", 1), ("w2", 1)]);
        let first = dispatches(&h.submit(h.task(1, 1, &[], OnFailure::Retry))).remove(0);

        let effects = h.orchestrator.job_event(&event(&first, JobStatus::ExecutionFailed));
        assert!(ends(&effects).is_empty());
        let second = dispatches(&effects).remove(0);
        assert_ne!(second.worker, first.worker);
        assert_ne!(second.job_id, first.job_id);

        let effects = h.orchestrator.job_event(&event(&second, JobStatus::ExecutionFailed));
        let end = &ends(&effects)[0];
        assert!(end.fatal, "budget exhausted");
        assert!(dispatches(&effects).is_empty());
    }

    #[test]
    fn test_ignore_releases_successors() {
        let mut h = Harness::new(&[("w1", 2)]);
        let root = dispatches(&h.submit(h.task(1, 1, &[], OnFailure::Ignore))).remove(0);
        h.submit(h.task(2, 1, &[1], OnFailure::Retry));

        let effects = h.orchestrator.job_event(&event(&root, JobStatus::ExecutionFailed));
        assert!(matches!(ends(&effects)[0].outcome, TaskOutcome::Failed { ignored: true, .. }));
        assert_eq!(dispatches(&effects)[0].task.id, TaskId(2));
    }

    #[test]
    fn test_cancel_queued_and_running_tasks() {
        let mut h = Harness::new(&[("w1", 1)]);
        let running = dispatches(&h.submit(h.task(1, 1, &[], OnFailure::Retry))).remove(0);
        h.submit(h.task(2, 1, &[], OnFailure::Retry));

        let effects = h.orchestrator.cancel_task(TaskId(2));
        assert_eq!(ends(&effects)[0].outcome, TaskOutcome::Cancelled);
        assert_eq!(h.orchestrator.scheduler().queued_count(), 0);

        let effects = h.orchestrator.cancel_task(TaskId(1));
        assert!(matches!(effects[0], Effect::CancelJob { job_id, .. } if job_id == running.job_id));
        assert_eq!(h.state(1), Some(ActionState::Running));

        let effects = h.orchestrator.job_event(&event(&running, JobStatus::ExecutionFailed));
        assert_eq!(ends(&effects)[0].outcome, TaskOutcome::Cancelled);
    }

    #[test]
    fn test_commutative_members_run_one_at_a_time() {
        let mut h = Harness::new(&[("w1", 4)]);
        let member = |h: &Harness, id| {
            let mut task = (*h.task(id, 1, &[], OnFailure::Retry)).clone();
            task.mutex_groups.push(MutexGroupId(1));
            Arc::new(task)
        };

        let first = dispatches(&h.submit(member(&h, 1))).remove(0);
        assert!(dispatches(&h.submit(member(&h, 2))).is_empty());
        assert_eq!(h.state(2), Some(ActionState::Ready));

        let effects = h.orchestrator.job_event(&event(&first, JobStatus::Ok));
        assert_eq!(dispatches(&effects)[0].task.id, TaskId(2));
    }

    #[test]
    fn test_removed_worker_queue_is_replaced() {
        let mut h = Harness::new(&[("w1", 1), ("w2", 1)]);
        for id in 1..=3 {
            h.submit(h.task(id, 1, &[], OnFailure::Retry));
        }
        assert_eq!(h.orchestrator.scheduler().queued_count(), 1);

        let queued_on = h.orchestrator.scheduler().worker_names().into_iter().find(|w| {
            h.orchestrator.scheduler().resource_scheduler(w).map(|rs| rs.queue_len() > 0).unwrap_or(false)
        });
        let queued_on = queued_on.unwrap();
        h.orchestrator.remove_worker(&queued_on);
        assert_eq!(h.state(3), Some(ActionState::Ready));
        assert_eq!(h.orchestrator.scheduler().queued_count(), 1, "re-queued on the remaining worker");
    }

    #[test]
    fn test_reduced_worker_fails_work_nobody_can_host() {
        let mut h = Harness::new(&[("w1", 4), ("w2", 2)]);
        let big = dispatches(&h.submit(h.task(1, 4, &[], OnFailure::Retry))).remove(0);
        assert!(dispatches(&h.submit(h.task(2, 4, &[], OnFailure::Retry))).is_empty());
        h.submit(h.task(3, 1, &[2], OnFailure::Retry));
        assert_eq!(h.orchestrator.queued_on(TaskId(2)), Some(&WorkerName::new("w1")));

        let update = ResourceUpdate::Reduce(ResourceDescription::new(2, 0));
        let effects = h.orchestrator.update_worker(&WorkerName::new("w1"), &update).unwrap();
        let ended = ends(&effects);
        assert_eq!(ended.len(), 2);
        assert!(matches!(ended[0].outcome, TaskOutcome::Failed { error: TaskError::UnschedulableConstraint(_), .. }));
        assert_eq!(ended[0].task_id, TaskId(2));
        assert_eq!(ended[1], TaskEnd { task_id: TaskId(3), outcome: TaskOutcome::Cancelled, fatal: false });
        assert_eq!(h.orchestrator.scheduler().queued_count(), 0);

        let effects = h.orchestrator.job_event(&event(&big, JobStatus::Ok));
        assert_eq!(ends(&effects)[0].outcome, TaskOutcome::Completed);
        assert_eq!(h.orchestrator.pending_actions(), 0);
    }

    #[test]
    fn test_reduced_worker_hands_queued_work_to_another() {
        let mut h = Harness::new(&[("w1", 4), ("w2", 4)]);
        let mut running = dispatches(&h.submit(h.task(1, 4, &[], OnFailure::Retry)));
        running.extend(dispatches(&h.submit(h.task(2, 4, &[], OnFailure::Retry))));
        assert_eq!(running.len(), 2);
        h.submit(h.task(3, 4, &[], OnFailure::Retry));

        let reduced = h.orchestrator.queued_on(TaskId(3)).cloned().unwrap();
        let update = ResourceUpdate::Reduce(ResourceDescription::new(2, 0));
        assert!(h.orchestrator.update_worker(&reduced, &update).unwrap().is_empty());
        let other = h.orchestrator.queued_on(TaskId(3)).cloned().unwrap();
        assert_ne!(other, reduced);

        let holder = running.iter().find(|order| order.worker == other).unwrap();
        let effects = h.orchestrator.job_event(&event(holder, JobStatus::Ok));
        let next = dispatches(&effects).remove(0);
        assert_eq!((next.task.id, next.worker), (TaskId(3), other));
    }

    #[test]
    fn test_retry_is_not_stolen_back_by_failed_worker() {
        let mut h = Harness::new(&[("w1", 1), ("w2", 1)]);
        let first = dispatches(&h.submit(h.task(1, 1, &[], OnFailure::Retry))).remove(0);
        let other = dispatches(&h.submit(h.task(2, 1, &[], OnFailure::Retry))).remove(0);
        h.submit(h.task(3, 1, &[], OnFailure::Retry));
        assert_eq!(h.orchestrator.queued_on(TaskId(3)), Some(&first.worker));

        let effects = h.orchestrator.job_event(&event(&first, JobStatus::ExecutionFailed));
        let third = dispatches(&effects).remove(0);
        assert_eq!((third.task.id, &third.worker), (TaskId(3), &first.worker));
        assert_eq!(h.orchestrator.queued_on(TaskId(1)), Some(&other.worker));

        let effects = h.orchestrator.job_event(&event(&third, JobStatus::Ok));
        assert!(dispatches(&effects).is_empty(), "the idle failed worker must leave the retry alone");
        let (moved, effects) = h.orchestrator.steal_tasks(&other.worker, &first.worker, 1);
        assert_eq!(moved, 0);
        assert!(effects.is_empty());

        let effects = h.orchestrator.job_event(&event(&other, JobStatus::Ok));
        let retry = dispatches(&effects).remove(0);
        assert_eq!((retry.task.id, &retry.worker), (TaskId(1), &other.worker));
    }

    #[test]
    fn test_moved_queued_action_follows_its_worker() {
        let mut h = Harness::new(&[("w1", 1)]);
        h.submit(h.task(1, 1, &[], OnFailure::Retry));
        h.submit(h.task(2, 1, &[], OnFailure::Retry));
        h.submit(h.task(3, 1, &[], OnFailure::Retry));

        let effects = h.orchestrator.add_worker(Worker::new("w2", ResourceDescription::new(1, 1024)));
        assert_eq!(dispatches(&effects)[0].task.id, TaskId(3));
        assert_eq!(h.orchestrator.queued_on(TaskId(2)), Some(&WorkerName::new("w1")));

        let (moved, effects) = h.orchestrator.steal_tasks(&WorkerName::new("w1"), &WorkerName::new("w2"), 1);
        assert_eq!(moved, 1);
        assert!(dispatches(&effects).is_empty());
        assert_eq!(h.orchestrator.queued_on(TaskId(2)), Some(&WorkerName::new("w2")));
    }

    #[test]
    fn test_added_worker_takes_queued_work() {
        let mut h = Harness::new(&[("w1", 1)]);
        h.submit(h.task(1, 1, &[], OnFailure::Retry));
        h.submit(h.task(2, 1, &[], OnFailure::Retry));

        let effects = h.orchestrator.add_worker(Worker::new("w2", ResourceDescription::new(1, 1024)));
        let order = dispatches(&effects).remove(0);
        assert_eq!(order.task.id, TaskId(2));
        assert_eq!(order.worker, WorkerName::new("w2"));
    }

    #[test]
    fn test_missing_data_fails_at_once() {
        let mut h = Harness::new(&[("w1", 1)]);
        let mut task = (*h.task(1, 1, &[], OnFailure::Ignore)).clone();
        task.missing_data = Some(DataName::new("ghost"));

        let effects = h.submit(Arc::new(task));
        assert!(dispatches(&effects).is_empty());
        assert!(matches!(ends(&effects)[0].outcome, TaskOutcome::Failed { error: TaskError::DataNotAvailable(_), ignored: true }));
    }
}
