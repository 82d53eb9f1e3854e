use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::action::action_graph::ActionKey;
use crate::domain::adaptor::storage_backend::StorageBackend;
use crate::domain::data::data_info_provider::DataInfoProvider;
use crate::domain::data::data_instance::DataInstanceId;
use crate::domain::resource::resource_update::ResourceUpdate;
use crate::domain::resource::worker::Worker;
use crate::domain::scheduler::resource_scheduler::{QueuedAction, ResourceScheduler};
use crate::domain::scheduler::scheduling_policy::SchedulingPolicy;
use crate::domain::scheduler::score::Score;
use crate::domain::task::implementation::Implementation;
use crate::domain::utils::id::{TaskId, WorkerName};
use crate::error::{Error, Result};

/// What the scheduler needs to know about an action to place it.
#[derive(Debug, Clone)]
pub struct SchedulingRequest {
    pub key: ActionKey,
    pub action_id: u64,
    pub task_id: TaskId,
    pub priority: bool,
    pub implementations: Vec<Implementation>,
    pub inputs: Vec<DataInstanceId>,
    /// Worker the previous attempt failed on. Avoided unless it is the only candidate.
    pub excluded_worker: Option<WorkerName>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// Resources are reserved; the action can be dispatched now.
    Launch { worker: WorkerName, implementation: Implementation, score: Score },
    /// The action waits in the worker's queue until capacity frees up.
    Queued { worker: WorkerName, implementation: Implementation, score: Score },
}

/// An action whose reservation was just taken, ready to become a job.
#[derive(Debug, Clone, PartialEq)]
pub struct Launch {
    pub key: ActionKey,
    pub worker: WorkerName,
    pub implementation: Implementation,
}

/// A queued action that changed worker without starting.
#[derive(Debug, Clone, PartialEq)]
pub struct Requeued {
    pub key: ActionKey,
    pub worker: WorkerName,
    pub implementation: Implementation,
    pub score: Score,
}

/// Outcome of a resource update on one worker.
#[derive(Debug, Default)]
pub struct WorkerUpdate {
    /// Queued actions that fit now.
    pub launches: Vec<Launch>,
    /// Queued actions the worker can no longer host. They must be placed again.
    pub displaced: Vec<SchedulingRequest>,
}

/// Places ready actions onto workers, keeping one [`ResourceScheduler`] per worker.
#[derive(Debug)]
pub struct TaskScheduler {
    policy: SchedulingPolicy,
    workers: BTreeMap<WorkerName, ResourceScheduler>,
    data: DataInfoProvider,
    storage: Option<Arc<dyn StorageBackend>>,
    requeued: Vec<Requeued>,
}

impl TaskScheduler {
    pub fn new(policy: SchedulingPolicy, data: DataInfoProvider) -> Self {
        TaskScheduler { policy, workers: BTreeMap::new(), data, storage: None, requeued: Vec::new() }
    }

    pub fn with_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn policy(&self) -> SchedulingPolicy {
        self.policy
    }

    pub fn worker(&self, name: &WorkerName) -> Option<&Worker> {
        self.workers.get(name).map(|rs| rs.worker())
    }

    pub fn resource_scheduler(&self, name: &WorkerName) -> Option<&ResourceScheduler> {
        self.workers.get(name)
    }

    pub fn worker_names(&self) -> Vec<WorkerName> {
        self.workers.keys().cloned().collect()
    }

    pub fn queued_count(&self) -> usize {
        self.workers.values().map(|rs| rs.queue_len()).sum()
    }

    /// Registers a worker. Returns false when a worker with the same name is already active.
    pub fn add_worker(&mut self, worker: Worker) -> bool {
        if let Some(existing) = self.workers.get(&worker.name) {
            if !existing.worker().is_terminated() {
                log::warn!("Worker '{}' is already registered.", worker.name);
                return false;
            }
        }
        log::info!("Worker '{}' added with {} core(s).", worker.name, worker.description.cores);
        self.workers.insert(worker.name.clone(), ResourceScheduler::new(worker));
        true
    }

    /// Applies a resource update. Queued actions the worker can no longer host are handed back, whatever now
    /// fits is launched.
    pub fn update_worker(&mut self, name: &WorkerName, update: &ResourceUpdate) -> Result<WorkerUpdate> {
        let rs = self.workers.get_mut(name).ok_or_else(|| Error::UnknownWorker(name.clone()))?;
        rs.worker_mut().apply_update(update);
        log::info!("Worker '{}' updated: {:?}.", name, rs.worker().description);

        let displaced: Vec<SchedulingRequest> = rs.take_unhostable().into_iter().map(|q| q.request).collect();
        if !displaced.is_empty() {
            log::warn!("Worker '{}' can no longer host {} queued action(s).", name, displaced.len());
        }
        Ok(WorkerUpdate { launches: Self::launch_queued(rs), displaced })
    }

    /// Terminates a worker and hands back the actions that were waiting on it, so they can be rescheduled.
    pub fn remove_worker(&mut self, name: &WorkerName) -> Vec<SchedulingRequest> {
        match self.workers.get_mut(name) {
            Some(rs) => {
                rs.worker_mut().terminate();
                log::info!("Worker '{}' removed, {} queued action(s) to reschedule.", name, rs.queue_len());
                rs.drain_queue().into_iter().map(|q| q.request).collect()
            }
            None => Vec::new(),
        }
    }

    /// Picks the best worker and implementation for the request.
    ///
    /// Fails with `UnschedulableConstraint` when no registered worker could ever host any implementation.
    pub fn schedule(&mut self, request: &SchedulingRequest) -> Result<Assignment> {
        let candidates: Vec<WorkerName> =
            self.workers.values().filter(|rs| rs.can_host_any(request)).map(|rs| rs.name().clone()).collect();

        if candidates.is_empty() {
            let signature = request.implementations.first().map(|i| i.signature.clone()).unwrap_or_default();
            return Err(Error::UnschedulableConstraint(signature));
        }

        let only_excluded = candidates.iter().all(|name| Some(name) == request.excluded_worker.as_ref());

        let mut best: Option<(WorkerName, Implementation, Score)> = None;
        for name in &candidates {
            if !only_excluded && Some(name) == request.excluded_worker.as_ref() {
                continue;
            }
            let Some(rs) = self.workers.get(name) else {
                continue;
            };

            let resource_score = rs.resource_score(request, &self.data, self.storage.as_deref());
            for implementation in request.implementations.iter().filter(|i| rs.worker().can_host(&i.constraints)) {
                let score = rs.score(request, implementation, resource_score);
                let better = match &best {
                    None => true,
                    Some((_, _, best_score)) => self.policy.is_better(&score, best_score),
                };
                if better {
                    best = Some((name.clone(), implementation.clone(), score));
                }
            }
        }

        let Some((worker, implementation, score)) = best else {
            return Err(Error::UnschedulableConstraint(format!("{}", request.task_id)));
        };
        let Some(rs) = self.workers.get_mut(&worker) else {
            return Err(Error::UnschedulableConstraint(format!("{}", request.task_id)));
        };

        if rs.reserve(request.key, &implementation.constraints) {
            log::debug!("{} placed on '{}' using '{}'.", request.task_id, worker, implementation.signature);
            Ok(Assignment::Launch { worker, implementation, score })
        } else {
            log::debug!("{} queued on busy worker '{}'.", request.task_id, worker);
            rs.enqueue(QueuedAction { request: request.clone(), implementation: implementation.clone(), score }, self.policy);
            Ok(Assignment::Queued { worker, implementation, score })
        }
    }

    /// Releases the reservation of `key` on `worker`. Launches what fits afterwards, stealing for idle workers.
    pub fn release(&mut self, worker: &WorkerName, key: ActionKey) -> Vec<Launch> {
        let mut launches = Vec::new();
        if let Some(rs) = self.workers.get_mut(worker) {
            if rs.release(key) {
                launches.extend(Self::launch_queued(rs));
            }
        }
        launches.extend(self.rebalance());
        launches
    }

    /// Drops a queued action. Returns false when it was not queued anywhere.
    pub fn cancel(&mut self, key: ActionKey) -> bool {
        self.workers.values_mut().any(|rs| rs.remove_queued(key).is_some())
    }

    /// Queued actions moved to another worker since the last call.
    pub fn take_requeued(&mut self) -> Vec<Requeued> {
        std::mem::take(&mut self.requeued)
    }

    pub fn record_execution(&mut self, worker: &WorkerName, signature: &str, elapsed: Duration) {
        if let Some(rs) = self.workers.get_mut(worker) {
            rs.record_execution(signature, elapsed);
        }
    }

    /// Moves up to `count` queued actions from `from` to `to`. Returns how many moved and which of them could
    /// start right away on `to`.
    pub fn steal_tasks(&mut self, from: &WorkerName, to: &WorkerName, count: usize) -> (usize, Vec<Launch>) {
        if from == to || count == 0 {
            return (0, Vec::new());
        }
        let Some(thief) = self.workers.get(to).map(|rs| rs.worker().clone()) else {
            return (0, Vec::new());
        };
        if thief.is_terminated() {
            return (0, Vec::new());
        }

        let hosts = self.active_workers();
        let stolen = match self.workers.get_mut(from) {
            Some(victim) => victim.take_queued(count, |request| {
                request.implementations.iter().any(|i| thief.can_host(&i.constraints)) && may_move_to(request, &thief, &hosts)
            }),
            None => Vec::new(),
        };

        let moved = stolen.len();
        let mut launches = Vec::new();
        for queued in stolen {
            launches.extend(self.place_on(to, queued.request));
        }
        if moved > 0 {
            log::info!("Moved {} queued action(s) from '{}' to '{}'.", moved, from, to);
        }
        (moved, launches)
    }

    /// Lets workers with an empty queue and free capacity steal from the most loaded queue.
    pub fn rebalance(&mut self) -> Vec<Launch> {
        let mut launches = Vec::new();
        let names = self.worker_names();

        for thief_name in &names {
            loop {
                let Some(thief) = self.workers.get(thief_name) else {
                    break;
                };
                if thief.queue_len() > 0 || thief.worker().is_terminated() {
                    break;
                }
                let thief_worker = thief.worker().clone();

                let victim = self
                    .workers
                    .values()
                    .filter(|rs| rs.name() != thief_name && rs.queue_len() > 0)
                    .max_by_key(|rs| rs.queue_len())
                    .map(|rs| rs.name().clone());
                let Some(victim) = victim else {
                    break;
                };

                let hosts = self.active_workers();
                let stolen = match self.workers.get_mut(&victim) {
                    Some(rs) => rs.take_queued(1, |request| {
                        request.implementations.iter().any(|i| thief_worker.can_run_now(&i.constraints))
                            && may_move_to(request, &thief_worker, &hosts)
                    }),
                    None => Vec::new(),
                };
                let Some(queued) = stolen.into_iter().next() else {
                    break;
                };

                log::debug!("Idle worker '{}' stole {} from '{}'.", thief_name, queued.request.task_id, victim);
                match self.place_on(thief_name, queued.request) {
                    Some(launch) => launches.push(launch),
                    None => break,
                }
            }
        }
        launches
    }

    /// Reserves on `worker` with its best implementation, or queues there when it is busy.
    fn place_on(&mut self, worker: &WorkerName, request: SchedulingRequest) -> Option<Launch> {
        let policy = self.policy;
        let resource_score = self.workers.get(worker)?.resource_score(&request, &self.data, self.storage.as_deref());
        let rs = self.workers.get_mut(worker)?;

        let mut best: Option<(Implementation, Score)> = None;
        for implementation in request.implementations.iter().filter(|i| rs.worker().can_host(&i.constraints)) {
            let score = rs.score(&request, implementation, resource_score);
            if best.as_ref().map(|(_, b)| policy.is_better(&score, b)).unwrap_or(true) {
                best = Some((implementation.clone(), score));
            }
        }
        let (implementation, score) = best?;

        if rs.reserve(request.key, &implementation.constraints) {
            Some(Launch { key: request.key, worker: worker.clone(), implementation })
        } else {
            self.requeued.push(Requeued {
                key: request.key,
                worker: worker.clone(),
                implementation: implementation.clone(),
                score,
            });
            rs.enqueue(QueuedAction { request, implementation, score }, policy);
            None
        }
    }

    fn active_workers(&self) -> Vec<Worker> {
        self.workers.values().map(|rs| rs.worker()).filter(|w| !w.is_terminated()).cloned().collect()
    }

    fn launch_queued(rs: &mut ResourceScheduler) -> Vec<Launch> {
        let worker = rs.name().clone();
        rs.pop_launchable()
            .into_iter()
            .map(|q| Launch { key: q.request.key, worker: worker.clone(), implementation: q.implementation })
            .collect()
    }
}

/// Whether a queued request may move to `thief`. A retry goes back to the worker it failed on only when no
/// other worker could host it.
fn may_move_to(request: &SchedulingRequest, thief: &Worker, workers: &[Worker]) -> bool {
    if request.excluded_worker.as_ref() != Some(&thief.name) {
        return true;
    }
    !workers
        .iter()
        .filter(|w| w.name != thief.name)
        .any(|w| request.implementations.iter().any(|i| w.can_host(&i.constraints)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::data::data_location::DataLocation;
    use crate::domain::resource::resource_description::ResourceDescription;
    use crate::domain::task::implementation::Constraints;
    use crate::domain::task::parameter::DataType;
    use crate::domain::utils::id::DataName;
    use slotmap::SlotMap;

    struct Fixture {
        keys: SlotMap<ActionKey, ()>,
        next_id: u64,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture { keys: SlotMap::with_key(), next_id: 0 }
        }

        fn request(&mut self, cores: u32) -> SchedulingRequest {
            self.next_id += 1;
            SchedulingRequest {
                key: self.keys.insert(()),
                action_id: self.next_id,
                task_id: TaskId(self.next_id),
                priority: false,
                implementations: vec![Implementation::method(0, "app.work", Constraints::with_cores(cores))],
                inputs: Vec::new(),
                excluded_worker: None,
            }
        }
    }

    fn scheduler(policy: SchedulingPolicy, workers: &[(&str, u32)]) -> TaskScheduler {
        let mut scheduler = TaskScheduler::new(policy, DataInfoProvider::new());
        for (name, cores) in workers {
            scheduler.add_worker(Worker::new(*name, ResourceDescription::new(*cores, 0)));
        }
        scheduler
    }

    fn worker_of(assignment: &Assignment) -> &WorkerName {
        match assignment {
            Assignment::Launch { worker, .. } | Assignment::Queued { worker, .. } => worker,
        }
    }

    #[test]
    fn test_impossible_constraint_is_unschedulable() {
        let mut fixture = Fixture::new();
        let mut scheduler = scheduler(SchedulingPolicy::Fifo, &[("w1", 4)]);
        let result = scheduler.schedule(&fixture.request(999));
        assert!(matches!(result, Err(Error::UnschedulableConstraint(_))));
    }

    #[test]
    fn test_two_cores_run_two_tasks() {
        let mut fixture = Fixture::new();
        let mut scheduler = scheduler(SchedulingPolicy::Fifo, &[("w1", 2)]);
        let requests: Vec<SchedulingRequest> = (0..3).map(|_| fixture.request(1)).collect();

        assert!(matches!(scheduler.schedule(&requests[0]).unwrap(), Assignment::Launch { .. }));
        assert!(matches!(scheduler.schedule(&requests[1]).unwrap(), Assignment::Launch { .. }));
        assert!(matches!(scheduler.schedule(&requests[2]).unwrap(), Assignment::Queued { .. }));

        let launches = scheduler.release(&WorkerName::new("w1"), requests[0].key);
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].key, requests[2].key);
        assert_eq!(scheduler.queued_count(), 0);
    }

    #[test]
    fn test_free_worker_preferred_over_busy_one() {
        let mut fixture = Fixture::new();
        let mut scheduler = scheduler(SchedulingPolicy::Fifo, &[("w1", 1), ("w2", 1)]);

        let first = scheduler.schedule(&fixture.request(1)).unwrap();
        let second = scheduler.schedule(&fixture.request(1)).unwrap();
        assert!(matches!(second, Assignment::Launch { .. }));
        assert_ne!(worker_of(&first), worker_of(&second));
    }

    #[test]
    fn test_locality_attracts_action() {
        let mut fixture = Fixture::new();
        let data = DataInfoProvider::new();
        let instance = data.register_data(&DataName::new("f"), DataType::File, DataLocation::worker(WorkerName::new("w2"), "/f"));

        let mut scheduler = TaskScheduler::new(SchedulingPolicy::Fifo, data);
        scheduler.add_worker(Worker::new("w1", ResourceDescription::new(4, 0)));
        scheduler.add_worker(Worker::new("w2", ResourceDescription::new(4, 0)));

        let mut request = fixture.request(1);
        request.inputs.push(instance);
        let assignment = scheduler.schedule(&request).unwrap();
        assert_eq!(worker_of(&assignment), &WorkerName::new("w2"));
    }

    #[test]
    fn test_excluded_worker_avoided_unless_only_option() {
        let mut fixture = Fixture::new();
        let mut sched = scheduler(SchedulingPolicy::Fifo, &[("w1", 1), ("w2", 1)]);

        let mut request = fixture.request(1);
        request.excluded_worker = Some(WorkerName::new("w1"));
        assert_eq!(worker_of(&sched.schedule(&request).unwrap()), &WorkerName::new("w2"));

        let mut lonely = scheduler(SchedulingPolicy::Fifo, &[("w1", 1)]);
        let mut request = fixture.request(1);
        request.excluded_worker = Some(WorkerName::new("w1"));
        assert_eq!(worker_of(&lonely.schedule(&request).unwrap()), &WorkerName::new("w1"));
    }

    #[test]
    fn test_load_balancing_spreads_queued_work() {
        let mut fixture = Fixture::new();
        let mut scheduler = scheduler(SchedulingPolicy::LoadBalancing, &[("w1", 1), ("w2", 1)]);
        let assignments: Vec<WorkerName> =
            (0..4).map(|_| worker_of(&scheduler.schedule(&fixture.request(1)).unwrap()).clone()).collect();

        let on_w1 = assignments.iter().filter(|w| w.as_str() == "w1").count();
        assert_eq!(on_w1, 2);
    }

    #[test]
    fn test_steal_tasks_moves_queued_actions() {
        let mut fixture = Fixture::new();
        let mut scheduler = scheduler(SchedulingPolicy::Fifo, &[("w1", 1)]);
        let requests: Vec<SchedulingRequest> = (0..3).map(|_| fixture.request(1)).collect();
        for request in &requests {
            scheduler.schedule(request).unwrap();
        }
        assert_eq!(scheduler.queued_count(), 2);

        scheduler.add_worker(Worker::new("w2", ResourceDescription::new(1, 0)));
        let (moved, launches) = scheduler.steal_tasks(&WorkerName::new("w1"), &WorkerName::new("w2"), 2);
        assert_eq!(moved, 2);
        assert_eq!(launches.len(), 1, "w2 has room for one");
        assert_eq!(scheduler.resource_scheduler(&WorkerName::new("w2")).unwrap().queue_len(), 1);
        assert_eq!(scheduler.resource_scheduler(&WorkerName::new("w1")).unwrap().queue_len(), 0);
    }

    #[test]
    fn test_idle_worker_steals_on_release() {
        let mut fixture = Fixture::new();
        let mut scheduler = scheduler(SchedulingPolicy::Fifo, &[("w1", 1)]);
        let requests: Vec<SchedulingRequest> = (0..3).map(|_| fixture.request(1)).collect();
        for request in &requests {
            scheduler.schedule(request).unwrap();
        }

        scheduler.add_worker(Worker::new("w2", ResourceDescription::new(1, 0)));
        let launches = scheduler.rebalance();
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].worker, WorkerName::new("w2"));
        assert_eq!(scheduler.queued_count(), 1);
    }

    #[test]
    fn test_removed_worker_returns_queue() {
        let mut fixture = Fixture::new();
        let mut scheduler = scheduler(SchedulingPolicy::Fifo, &[("w1", 1)]);
        scheduler.schedule(&fixture.request(1)).unwrap();
        scheduler.schedule(&fixture.request(1)).unwrap();

        let orphans = scheduler.remove_worker(&WorkerName::new("w1"));
        assert_eq!(orphans.len(), 1);
        assert!(matches!(scheduler.schedule(&fixture.request(1)), Err(Error::UnschedulableConstraint(_))));
    }

    #[test]
    fn test_update_worker_launches_queued() {
        let mut fixture = Fixture::new();
        let mut scheduler = scheduler(SchedulingPolicy::Fifo, &[("w1", 1)]);
        scheduler.schedule(&fixture.request(1)).unwrap();
        scheduler.schedule(&fixture.request(1)).unwrap();

        let update = ResourceUpdate::Increase(ResourceDescription::new(1, 0));
        let outcome = scheduler.update_worker(&WorkerName::new("w1"), &update).unwrap();
        assert_eq!(outcome.launches.len(), 1);
        assert!(outcome.displaced.is_empty());
    }

    #[test]
    fn test_reduced_worker_hands_back_unhostable_queue() {
        let mut fixture = Fixture::new();
        let mut scheduler = scheduler(SchedulingPolicy::Fifo, &[("w1", 4)]);
        let running = fixture.request(4);
        let big = fixture.request(4);
        let small = fixture.request(1);
        assert!(matches!(scheduler.schedule(&running).unwrap(), Assignment::Launch { .. }));
        scheduler.schedule(&big).unwrap();
        scheduler.schedule(&small).unwrap();
        assert_eq!(scheduler.queued_count(), 2);

        let update = ResourceUpdate::Reduce(ResourceDescription::new(2, 0));
        let outcome = scheduler.update_worker(&WorkerName::new("w1"), &update).unwrap();
        assert!(outcome.launches.is_empty(), "the 4-core action still holds the worker");
        assert_eq!(outcome.displaced.len(), 1);
        assert_eq!(outcome.displaced[0].key, big.key);
        assert!(matches!(scheduler.schedule(&outcome.displaced[0]), Err(Error::UnschedulableConstraint(_))));

        let launches = scheduler.release(&WorkerName::new("w1"), running.key);
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].key, small.key);
        assert_eq!(scheduler.queued_count(), 0);
    }

    #[test]
    fn test_retry_is_not_stolen_back_by_failed_worker() {
        let mut fixture = Fixture::new();
        let mut scheduler = scheduler(SchedulingPolicy::Fifo, &[("w1", 1), ("w2", 1)]);
        let on_w1 = fixture.request(1);
        let on_w2 = fixture.request(1);
        scheduler.schedule(&on_w1).unwrap();
        scheduler.schedule(&on_w2).unwrap();

        let mut retry = fixture.request(1);
        retry.excluded_worker = Some(WorkerName::new("w1"));
        assert_eq!(worker_of(&scheduler.schedule(&retry).unwrap()), &WorkerName::new("w2"));

        let launches = scheduler.release(&WorkerName::new("w1"), on_w1.key);
        assert!(launches.is_empty(), "w1 must not take the retry back");
        assert_eq!(scheduler.resource_scheduler(&WorkerName::new("w2")).unwrap().queue_len(), 1);

        let (moved, launches) = scheduler.steal_tasks(&WorkerName::new("w2"), &WorkerName::new("w1"), 1);
        assert_eq!(moved, 0);
        assert!(launches.is_empty());

        let launches = scheduler.release(&WorkerName::new("w2"), on_w2.key);
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].key, retry.key);
        assert_eq!(launches[0].worker, WorkerName::new("w2"));
    }

    #[test]
    fn test_retry_returns_to_failed_worker_when_alone() {
        let mut fixture = Fixture::new();
        let mut scheduler = scheduler(SchedulingPolicy::Fifo, &[("w1", 1), ("w2", 1)]);
        let on_w1 = fixture.request(1);
        let on_w2 = fixture.request(1);
        scheduler.schedule(&on_w1).unwrap();
        scheduler.schedule(&on_w2).unwrap();

        let mut retry = fixture.request(1);
        retry.excluded_worker = Some(WorkerName::new("w1"));
        scheduler.schedule(&retry).unwrap();

        let orphans = scheduler.remove_worker(&WorkerName::new("w2"));
        assert_eq!(orphans.len(), 1);
        scheduler.add_worker(Worker::new("w3", ResourceDescription::new(1, 0)));
        let replaced = scheduler.schedule(&orphans[0]).unwrap();
        assert!(matches!(replaced, Assignment::Launch { ref worker, .. } if worker.as_str() == "w3"));

        scheduler.remove_worker(&WorkerName::new("w3"));
        let mut lonely = fixture.request(1);
        lonely.excluded_worker = Some(WorkerName::new("w1"));
        assert_eq!(worker_of(&scheduler.schedule(&lonely).unwrap()), &WorkerName::new("w1"));
    }

    #[test]
    fn test_moved_requests_are_reported() {
        let mut fixture = Fixture::new();
        let mut scheduler = scheduler(SchedulingPolicy::Fifo, &[("w1", 1)]);
        let requests: Vec<SchedulingRequest> = (0..3).map(|_| fixture.request(1)).collect();
        for request in &requests {
            scheduler.schedule(request).unwrap();
        }
        assert!(scheduler.take_requeued().is_empty());

        scheduler.add_worker(Worker::new("w2", ResourceDescription::new(1, 0)));
        let (moved, launches) = scheduler.steal_tasks(&WorkerName::new("w1"), &WorkerName::new("w2"), 2);
        assert_eq!((moved, launches.len()), (2, 1));

        let requeued = scheduler.take_requeued();
        assert_eq!(requeued.len(), 1);
        assert_eq!(requeued[0].worker, WorkerName::new("w2"));
        assert!(requests.iter().any(|r| r.key == requeued[0].key));
        assert!(scheduler.take_requeued().is_empty());
    }
}
