use std::collections::BTreeSet;

use crate::domain::resource::resource_description::ResourceDescription;
use crate::domain::resource::resource_update::ResourceUpdate;
use crate::domain::task::implementation::Constraints;
use crate::domain::utils::id::WorkerName;

/// A node able to run jobs, with its static description and current reservations.
///
/// Reservations are taken by the scheduler and released by the job event path; both happen inside the
/// dispatcher, so the counters need no synchronization of their own.
#[derive(Debug, Clone)]
pub struct Worker {
    pub name: WorkerName,
    pub description: ResourceDescription,
    pub limit_of_tasks: u32,
    /// Disks mounted from shared storage. Values living there need no transfer.
    pub shared_disks: BTreeSet<String>,
    used_cores: u32,
    used_memory_mb: u64,
    running_tasks: u32,
    terminated: bool,
}

impl Worker {
    /// Creates a worker that runs at most one task per core.
    pub fn new(name: impl Into<String>, description: ResourceDescription) -> Self {
        let limit_of_tasks = description.cores;
        Worker {
            name: WorkerName::new(name),
            description,
            limit_of_tasks,
            shared_disks: BTreeSet::new(),
            used_cores: 0,
            used_memory_mb: 0,
            running_tasks: 0,
            terminated: false,
        }
    }

    pub fn with_limit_of_tasks(mut self, limit_of_tasks: u32) -> Self {
        self.limit_of_tasks = limit_of_tasks;
        self
    }

    pub fn with_shared_disk(mut self, disk: impl Into<String>) -> Self {
        let disk = disk.into();
        self.description.disks.insert(disk.clone());
        self.shared_disks.insert(disk);
        self
    }

    /// Whether the worker could ever run something with `constraints`.
    pub fn can_host(&self, constraints: &Constraints) -> bool {
        !self.terminated && self.limit_of_tasks > 0 && self.description.can_host(constraints)
    }

    /// Whether the worker has enough free capacity for `constraints` right now.
    pub fn can_run_now(&self, constraints: &Constraints) -> bool {
        self.can_host(constraints)
            && self.running_tasks < self.limit_of_tasks
            && self.free_cores() >= constraints.cores
            && self.free_memory_mb() >= constraints.memory_mb
    }

    /// Takes the capacity needed by `constraints`. Returns false, leaving the counters untouched, when it does not fit.
    pub fn reserve(&mut self, constraints: &Constraints) -> bool {
        if !self.can_run_now(constraints) {
            return false;
        }
        self.used_cores += constraints.cores;
        self.used_memory_mb += constraints.memory_mb;
        self.running_tasks += 1;
        true
    }

    pub fn release(&mut self, constraints: &Constraints) {
        self.used_cores = self.used_cores.saturating_sub(constraints.cores);
        self.used_memory_mb = self.used_memory_mb.saturating_sub(constraints.memory_mb);
        self.running_tasks = self.running_tasks.saturating_sub(1);
    }

    pub fn apply_update(&mut self, update: &ResourceUpdate) {
        let previous_cores = self.description.cores;
        match update {
            ResourceUpdate::Increase(extra) => self.description.increase(extra),
            ResourceUpdate::Reduce(removed) => self.description.reduce(removed),
        }

        // a limit that tracked the core count keeps tracking it
        if self.limit_of_tasks == previous_cores {
            self.limit_of_tasks = self.description.cores;
        }
    }

    pub fn free_cores(&self) -> u32 {
        self.description.cores.saturating_sub(self.used_cores)
    }

    pub fn free_memory_mb(&self) -> u64 {
        self.description.memory_mb.saturating_sub(self.used_memory_mb)
    }

    pub fn running_tasks(&self) -> u32 {
        self.running_tasks
    }

    pub fn is_idle(&self) -> bool {
        self.running_tasks == 0
    }

    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}
