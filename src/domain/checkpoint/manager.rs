use std::collections::{BTreeMap, HashMap, HashSet};

use crate::domain::checkpoint::policy::CheckpointPolicy;
use crate::domain::checkpoint::record::{CheckpointRecord, CheckpointStore, RecordedOutput};
use crate::domain::data::data_info_provider::DataInfoProvider;
use crate::domain::task::task::Task;
use crate::domain::utils::id::{CheckpointGroupName, TaskId};
use crate::error::Result;

const DEFAULT_GROUP: &str = "default";

#[derive(Debug)]
struct CheckpointGroup {
    members: HashSet<TaskId>,
    finished: HashSet<TaskId>,
    unsaved: Vec<CheckpointRecord>,
    /// No further task joins the group.
    full: bool,
}

impl CheckpointGroup {
    fn new() -> Self {
        CheckpointGroup { members: HashSet::new(), finished: HashSet::new(), unsaved: Vec::new(), full: false }
    }

    fn is_complete(&self) -> bool {
        self.full && self.finished.len() == self.members.len()
    }
}

/// Persists finished tasks according to a [`CheckpointPolicy`] and recognises tasks a previous run already
/// finished.
#[derive(Debug)]
pub struct CheckpointManager {
    policy: CheckpointPolicy,
    avoid_signatures: HashSet<String>,
    store: Option<CheckpointStore>,
    recovered: HashMap<TaskId, CheckpointRecord>,
    groups: BTreeMap<CheckpointGroupName, CheckpointGroup>,
    group_of: HashMap<TaskId, CheckpointGroupName>,
    counting_group: u64,
    finished_since_save: u32,
    saved: usize,
}

impl CheckpointManager {
    /// A manager that neither recovers nor persists anything.
    pub fn disabled() -> Self {
        CheckpointManager {
            policy: CheckpointPolicy::None,
            avoid_signatures: HashSet::new(),
            store: None,
            recovered: HashMap::new(),
            groups: BTreeMap::new(),
            group_of: HashMap::new(),
            counting_group: 1,
            finished_since_save: 0,
            saved: 0,
        }
    }

    /// Opens the store and loads what previous runs left in it.
    pub fn new(policy: CheckpointPolicy, store: CheckpointStore, avoid_signatures: HashSet<String>) -> Result<Self> {
        let recovered = store.load()?;
        Ok(CheckpointManager { policy, avoid_signatures, store: Some(store), recovered, ..Self::disabled() })
    }

    pub fn policy(&self) -> CheckpointPolicy {
        self.policy
    }

    /// Number of records written by this run.
    pub fn saved(&self) -> usize {
        self.saved
    }

    /// Record of a previous run for this very task, if it can be reused.
    pub fn recovered(&self, task: &Task) -> Option<&CheckpointRecord> {
        self.recovered.get(&task.id).filter(|record| record.signature == task.signature())
    }

    /// Puts the outputs of a recovered task back in place. Returns false when the task was not checkpointed.
    pub fn recover_task(&mut self, task: &Task, data: &DataInfoProvider) -> bool {
        let Some(record) = self.recovered(task).cloned() else {
            return false;
        };

        for (index, parameter) in task.parameters().iter().enumerate() {
            let Some(write) = parameter.access.and_then(|a| a.write_instance()) else {
                continue;
            };
            let locations = record.outputs.iter().find(|o| o.index == index).map(|o| o.locations.clone()).unwrap_or_default();
            data.version_produced(write, locations);
        }
        for parameter in task.parameters() {
            if let Some(access) = &parameter.access {
                data.access_finished(access);
            }
        }
        log::info!("{} ({}) recovered from checkpoint.", task.id, task.signature());
        true
    }

    /// Assigns a task that will run to its checkpoint group.
    pub fn new_task(&mut self, task: &Task) {
        if !self.policy.is_enabled() || self.avoid_signatures.contains(task.signature()) {
            return;
        }

        let name = match self.policy {
            CheckpointPolicy::InstantiatedGroup { .. } => CheckpointGroupName::new(format!("group-{}", self.counting_group)),
            _ => CheckpointGroupName::new(DEFAULT_GROUP),
        };
        let group = self.groups.entry(name.clone()).or_insert_with(CheckpointGroup::new);
        group.members.insert(task.id);

        if let CheckpointPolicy::InstantiatedGroup { size } = self.policy {
            if group.members.len() >= size {
                group.full = true;
                self.counting_group += 1;
            }
        }
        log::debug!("{} assigned to checkpoint group '{}'.", task.id, name);
        self.group_of.insert(task.id, name);
    }

    /// Records a task that completed. Persists whatever the policy says is due.
    pub fn end_task(&mut self, task: &Task, data: &DataInfoProvider) -> Result<()> {
        let Some(name) = self.group_of.remove(&task.id) else {
            return Ok(());
        };

        let outputs = task
            .parameters()
            .iter()
            .enumerate()
            .filter_map(|(index, parameter)| {
                let write = parameter.access.and_then(|a| a.write_instance())?;
                Some(RecordedOutput { index, data: parameter.data.clone()?, locations: data.locations(write) })
            })
            .collect();
        let record = CheckpointRecord {
            task_id: task.id,
            signature: task.signature().to_string(),
            group: name.clone(),
            outputs,
            saved_at: String::new(),
        };

        let Some(group) = self.groups.get_mut(&name) else {
            return Ok(());
        };
        group.finished.insert(task.id);
        group.unsaved.push(record);

        match self.policy {
            CheckpointPolicy::InstantiatedGroup { .. } => {
                if group.is_complete() {
                    let records = std::mem::take(&mut group.unsaved);
                    self.groups.remove(&name);
                    self.persist(&records)?;
                }
            }
            CheckpointPolicy::FinishedTasks { span } => {
                self.finished_since_save += 1;
                if self.finished_since_save >= span {
                    self.finished_since_save = 0;
                    self.snapshot()?;
                }
            }
            CheckpointPolicy::Periodic { .. } | CheckpointPolicy::None => {}
        }
        Ok(())
    }

    /// Forgets a task that did not complete; its group no longer waits for it.
    pub fn task_failed(&mut self, task_id: TaskId) -> Result<()> {
        let Some(name) = self.group_of.remove(&task_id) else {
            return Ok(());
        };
        let Some(group) = self.groups.get_mut(&name) else {
            return Ok(());
        };
        group.members.remove(&task_id);
        if group.is_complete() {
            let records = std::mem::take(&mut group.unsaved);
            self.groups.remove(&name);
            self.persist(&records)?;
        }
        Ok(())
    }

    /// Persists every finished task that was not saved yet.
    pub fn snapshot(&mut self) -> Result<()> {
        let records: Vec<CheckpointRecord> = self.groups.values_mut().flat_map(|g| std::mem::take(&mut g.unsaved)).collect();
        if !matches!(self.policy, CheckpointPolicy::InstantiatedGroup { .. }) {
            // the shared group only tracks tasks still running
            for group in self.groups.values_mut() {
                for task in group.finished.drain() {
                    group.members.remove(&task);
                }
            }
        }
        self.groups.retain(|_, g| !g.is_complete());
        self.persist(&records)
    }

    pub fn shutdown(&mut self) -> Result<()> {
        self.snapshot()?;
        self.groups.clear();
        self.group_of.clear();
        Ok(())
    }

    fn persist(&mut self, records: &[CheckpointRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(store) = &self.store {
            store.append(records)?;
        }
        self.saved += records.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::checkpoint::record::CheckpointStore;
    use crate::domain::data::data_instance::AccessMode;
    use crate::domain::data::data_location::DataLocation;
    use crate::domain::task::implementation::{Constraints, Implementation};
    use crate::domain::task::parameter::{DataType, Direction, Parameter};
    use crate::domain::task::task::TaskDescription;
    use crate::domain::utils::id::{DataName, WorkerName};
    use std::path::{Path, PathBuf};

    fn directory() -> PathBuf {
        std::env::temp_dir().join(format!("cp-manager-{}", uuid::Uuid::new_v4()))
    }

    fn manager_in(dir: &Path, policy: CheckpointPolicy, avoid: HashSet<String>) -> CheckpointManager {
        CheckpointManager::new(policy, CheckpointStore::new(dir), avoid).unwrap()
    }

    fn task(data: &DataInfoProvider, id: u64, signature: &str) -> Task {
        let output = format!("out{}", id);
        let mut parameter = Parameter::file(Direction::Out, output.as_str());
        let access = data.will_access(&DataName::new(output), AccessMode::Write, DataType::File, TaskId(id)).unwrap();
        parameter.access = Some(access);
        let implementation = Implementation::method(0, signature, Constraints::default());
        let description = TaskDescription::new(signature, vec![implementation]).with_parameter(parameter);
        Task::new(TaskId(id), description)
    }

    fn finish(manager: &mut CheckpointManager, data: &DataInfoProvider, task: &Task) {
        let write = task.parameters()[0].access.unwrap().write_instance().unwrap();
        data.version_produced(write, vec![DataLocation::worker(WorkerName::new("w1"), format!("/{}", write.rename()))]);
        manager.end_task(task, data).unwrap();
    }

    #[test]
    fn test_finished_tasks_span() {
        let data = DataInfoProvider::new();
        let dir = directory();
        let mut manager = manager_in(&dir, CheckpointPolicy::FinishedTasks { span: 2 }, HashSet::new());

        let tasks: Vec<Task> = (1..=3).map(|id| task(&data, id, "app.work")).collect();
        for t in &tasks {
            manager.new_task(t);
        }
        finish(&mut manager, &data, &tasks[0]);
        assert_eq!(manager.saved(), 0);
        finish(&mut manager, &data, &tasks[1]);
        assert_eq!(manager.saved(), 2);
        finish(&mut manager, &data, &tasks[2]);
        manager.shutdown().unwrap();
        assert_eq!(manager.saved(), 3);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_instantiated_group_waits_for_all_members() {
        let data = DataInfoProvider::new();
        let dir = directory();
        let mut manager = manager_in(&dir, CheckpointPolicy::InstantiatedGroup { size: 2 }, HashSet::new());

        let tasks: Vec<Task> = (1..=3).map(|id| task(&data, id, "app.work")).collect();
        for t in &tasks {
            manager.new_task(t);
        }
        finish(&mut manager, &data, &tasks[1]);
        finish(&mut manager, &data, &tasks[2]);
        assert_eq!(manager.saved(), 0, "group-1 still waits for T1, group-2 is not full");
        finish(&mut manager, &data, &tasks[0]);
        assert_eq!(manager.saved(), 2);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_avoided_signature_is_never_saved() {
        let data = DataInfoProvider::new();
        let dir = directory();
        let avoid = HashSet::from(["app.noisy".to_string()]);
        let mut manager = manager_in(&dir, CheckpointPolicy::FinishedTasks { span: 1 }, avoid);

        let noisy = task(&data, 1, "app.noisy");
        manager.new_task(&noisy);
        finish(&mut manager, &data, &noisy);
        assert_eq!(manager.saved(), 0);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_next_run_recovers_matching_tasks() {
        let dir = directory();
        {
            let data = DataInfoProvider::new();
            let mut manager = manager_in(&dir, CheckpointPolicy::FinishedTasks { span: 1 }, HashSet::new());
            let first = task(&data, 1, "app.work");
            manager.new_task(&first);
            finish(&mut manager, &data, &first);
        }

        let data = DataInfoProvider::new();
        let mut manager = manager_in(&dir, CheckpointPolicy::FinishedTasks { span: 1 }, HashSet::new());
        let same = task(&data, 1, "app.work");
        let renamed = task(&data, 2, "app.other");

        assert!(manager.recover_task(&same, &data));
        assert!(!manager.recover_task(&renamed, &data));
        let write = same.parameters()[0].access.unwrap().write_instance().unwrap();
        assert_eq!(data.locations(write).len(), 1);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_disabled_manager_ignores_everything() {
        let data = DataInfoProvider::new();
        let mut manager = CheckpointManager::disabled();
        let t = task(&data, 1, "app.work");
        manager.new_task(&t);
        finish(&mut manager, &data, &t);
        manager.snapshot().unwrap();
        assert_eq!(manager.saved(), 0);
    }
}
