use std::collections::HashMap;
use std::time::Duration;

use crate::domain::action::action_graph::ActionKey;
use crate::domain::adaptor::storage_backend::StorageBackend;
use crate::domain::data::data_info_provider::DataInfoProvider;
use crate::domain::data::data_location::DataLocation;
use crate::domain::resource::worker::Worker;
use crate::domain::scheduler::profile::ExecutionProfile;
use crate::domain::scheduler::scheduling_policy::SchedulingPolicy;
use crate::domain::scheduler::score::{Score, UNAVAILABLE_PENALTY};
use crate::domain::scheduler::task_scheduler::SchedulingRequest;
use crate::domain::task::implementation::{Constraints, Implementation};
use crate::domain::utils::id::WorkerName;

/// An action assigned to a worker that had no free capacity when it was scheduled.
#[derive(Debug, Clone)]
pub struct QueuedAction {
    pub request: SchedulingRequest,
    pub implementation: Implementation,
    pub score: Score,
}

/// Per-worker view of the scheduler: reservations, the ranked queue of waiting actions and execution profiles.
#[derive(Debug)]
pub struct ResourceScheduler {
    worker: Worker,
    queue: Vec<QueuedAction>,
    running: HashMap<ActionKey, Constraints>,
    profiles: HashMap<String, ExecutionProfile>,
}

impl ResourceScheduler {
    pub fn new(worker: Worker) -> Self {
        ResourceScheduler { worker, queue: Vec::new(), running: HashMap::new(), profiles: HashMap::new() }
    }

    pub fn name(&self) -> &WorkerName {
        &self.worker.name
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    pub fn worker_mut(&mut self) -> &mut Worker {
        &mut self.worker
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    pub fn is_running(&self, key: ActionKey) -> bool {
        self.running.contains_key(&key)
    }

    pub fn queued(&self) -> impl Iterator<Item = &QueuedAction> {
        self.queue.iter()
    }

    pub fn load(&self) -> u32 {
        (self.running.len() + self.queue.len()) as u32
    }

    /// Whether the worker could ever host at least one implementation of the request.
    pub fn can_host_any(&self, request: &SchedulingRequest) -> bool {
        request.implementations.iter().any(|i| self.worker.can_host(&i.constraints))
    }

    /// Number of input versions of the request that need no transfer to reach this worker.
    pub fn resource_score(
        &self,
        request: &SchedulingRequest,
        data: &DataInfoProvider,
        storage: Option<&dyn StorageBackend>,
    ) -> i64 {
        let mut local = 0;
        for instance in &request.inputs {
            let locations = data.locations(*instance);
            let resident = locations.iter().any(|location| match location {
                DataLocation::Persistent { object_id } => storage
                    .and_then(|s| s.get_locations(object_id).ok())
                    .map(|hosts| hosts.contains(&self.worker.name))
                    .unwrap_or(false),
                other => other.is_local_to(&self.worker.name, &self.worker.shared_disks),
            });
            if resident {
                local += 1;
            }
        }
        local
    }

    pub fn score(&self, request: &SchedulingRequest, implementation: &Implementation, resource_score: i64) -> Score {
        let mut score = Score::new(request.priority, request.action_id);
        score.resource_score = if self.worker.can_run_now(&implementation.constraints) {
            resource_score
        } else {
            resource_score - UNAVAILABLE_PENALTY
        };
        score.waiting_score = -(self.queue.len() as i64);
        score.implementation_score = -(self.profile(&implementation.signature).average_ms() as i64);
        score.resource_load = self.load();
        score
    }

    /// Reserves capacity for `key`. Reserving twice for the same action is a no-op that reports success.
    pub fn reserve(&mut self, key: ActionKey, constraints: &Constraints) -> bool {
        if self.running.contains_key(&key) {
            return true;
        }
        if !self.worker.reserve(constraints) {
            return false;
        }
        self.running.insert(key, constraints.clone());
        true
    }

    /// Frees the capacity held by `key`. Returns false when nothing was reserved, so double releases are harmless.
    pub fn release(&mut self, key: ActionKey) -> bool {
        match self.running.remove(&key) {
            Some(constraints) => {
                self.worker.release(&constraints);
                true
            }
            None => false,
        }
    }

    /// Inserts an action in the queue, keeping it ranked best-first by `policy`.
    pub fn enqueue(&mut self, queued: QueuedAction, policy: SchedulingPolicy) {
        let rank = queued.score.for_queue_ranking();
        let position = self
            .queue
            .iter()
            .position(|other| policy.is_better(&rank, &other.score.for_queue_ranking()))
            .unwrap_or(self.queue.len());
        self.queue.insert(position, queued);
    }

    /// Pops queued actions, best first, while they fit. Stops at the first one that does not fit so a large
    /// action at the head is not starved by smaller ones behind it. Entries the worker can no longer host at
    /// all are stepped over.
    pub fn pop_launchable(&mut self) -> Vec<QueuedAction> {
        let mut launched = Vec::new();
        let mut index = 0;
        while let Some(head) = self.queue.get(index) {
            let key = head.request.key;
            let constraints = head.implementation.constraints.clone();
            if !self.worker.can_host(&constraints) {
                index += 1;
                continue;
            }
            if !self.reserve(key, &constraints) {
                break;
            }
            launched.push(self.queue.remove(index));
        }
        launched
    }

    /// Removes the queued actions whose implementation no longer fits the worker, e.g. after a reduction.
    pub fn take_unhostable(&mut self) -> Vec<QueuedAction> {
        let queue = std::mem::take(&mut self.queue);
        let (kept, unhostable): (Vec<QueuedAction>, Vec<QueuedAction>) =
            queue.into_iter().partition(|q| self.worker.can_host(&q.implementation.constraints));
        self.queue = kept;
        unhostable
    }

    pub fn remove_queued(&mut self, key: ActionKey) -> Option<QueuedAction> {
        let position = self.queue.iter().position(|q| q.request.key == key)?;
        Some(self.queue.remove(position))
    }

    /// Takes up to `count` queued actions, worst ranked first, that `accepts` agrees to host.
    pub fn take_queued(&mut self, count: usize, accepts: impl Fn(&SchedulingRequest) -> bool) -> Vec<QueuedAction> {
        let mut taken = Vec::new();
        let mut index = self.queue.len();
        while index > 0 && taken.len() < count {
            index -= 1;
            if accepts(&self.queue[index].request) {
                taken.push(self.queue.remove(index));
            }
        }
        taken
    }

    /// Empties the queue, for instance when the worker goes away.
    pub fn drain_queue(&mut self) -> Vec<QueuedAction> {
        std::mem::take(&mut self.queue)
    }

    pub fn profile(&self, signature: &str) -> ExecutionProfile {
        self.profiles.get(signature).copied().unwrap_or_default()
    }

    pub fn record_execution(&mut self, signature: &str, elapsed: Duration) {
        self.profiles.entry(signature.to_string()).or_default().record(elapsed);
    }
}
