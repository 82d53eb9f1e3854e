use std::collections::{BTreeSet, HashMap, HashSet};

use crate::domain::data::data_info::VersionState;
use crate::domain::data::data_info_provider::DataInfoProvider;
use crate::domain::data::data_instance::{DataAccessId, DataId, DataInstanceId};
use crate::domain::data::data_location::DataLocation;
use crate::domain::task::parameter::{DataType, Direction, Parameter};
use crate::domain::task::task::{MutexGroupId, Task, TaskDescription};
use crate::domain::utils::id::{DataName, TaskId};
use crate::error::{Error, Result};

/// Open run of consecutive commutative accesses to one data item.
#[derive(Debug, Clone)]
struct CommutativeGroup {
    mutex: MutexGroupId,
    /// Shared by every member: read the version before the group, write the one after it.
    access: DataAccessId,
    members: Vec<TaskId>,
    /// What the first member depended on; every later member inherits it.
    preceding: BTreeSet<TaskId>,
}

/// Who touched the current version of one data item since it was written.
#[derive(Debug, Clone, Default)]
struct AccessHistory {
    /// Writers of the current version: a single task, or every member of a closed commutative group.
    writers: Vec<TaskId>,
    readers: Vec<TaskId>,
    concurrent: Vec<TaskId>,
    group: Option<CommutativeGroup>,
}

impl AccessHistory {
    /// Turns an open commutative group into the writers of the version it produces.
    fn close_group(&mut self) {
        if let Some(group) = self.group.take() {
            self.writers = group.members;
        }
    }

    fn all(&self) -> impl Iterator<Item = &TaskId> {
        self.writers.iter().chain(self.readers.iter()).chain(self.concurrent.iter())
    }

    fn forget(&mut self, task: TaskId) {
        self.writers.retain(|t| *t != task);
        self.readers.retain(|t| *t != task);
        self.concurrent.retain(|t| *t != task);
    }
}

/// Whether a version can be handed to the main program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Ready(Vec<DataLocation>),
    Pending,
    Failed,
}

/// Dependency analyzer: turns the accesses of submitted tasks, in submission order, into data versions and
/// task-to-task edges.
#[derive(Debug)]
pub struct AccessProcessor {
    data: DataInfoProvider,
    histories: HashMap<DataId, AccessHistory>,
    /// Tasks still expected to write each version.
    pending_writers: HashMap<DataInstanceId, HashSet<TaskId>>,
    accessed_by: HashMap<TaskId, Vec<DataId>>,
    next_task_id: u64,
    next_mutex_id: u64,
}

impl AccessProcessor {
    pub fn new(data: DataInfoProvider) -> Self {
        AccessProcessor {
            data,
            histories: HashMap::new(),
            pending_writers: HashMap::new(),
            accessed_by: HashMap::new(),
            next_task_id: 0,
            next_mutex_id: 0,
        }
    }

    pub fn data(&self) -> &DataInfoProvider {
        &self.data
    }

    /// Id the next submitted task will get.
    pub fn peek_task_id(&self) -> TaskId {
        TaskId(self.next_task_id + 1)
    }

    /// Validates the description, assigns the next task id and registers every parameter access.
    ///
    /// A reading access to data that does not exist is not an error here: the access is left unresolved and
    /// the task is marked so it fails under its own on-failure policy.
    pub fn register_task(&mut self, mut description: TaskDescription) -> Result<Task> {
        description.validate()?;
        self.next_task_id += 1;
        let task_id = TaskId(self.next_task_id);

        let mut predecessors = BTreeSet::new();
        let mut mutex_groups = Vec::new();
        let mut missing_data = None;

        for parameter in description.parameters.iter_mut() {
            if !parameter.is_tracked() {
                continue;
            }
            match self.register_access(task_id, parameter, &mut predecessors) {
                Ok((access, mutex)) => {
                    parameter.access = Some(access);
                    mutex_groups.extend(mutex);
                }
                Err(Error::DataNotAvailable(name)) => {
                    log::warn!("{} reads '{}' which is not available.", task_id, name);
                    missing_data.get_or_insert(name);
                }
                Err(e) => return Err(e),
            }
        }
        predecessors.remove(&task_id);

        log::debug!("{} ({}) registered with {} predecessor(s).", task_id, description.signature, predecessors.len());
        let mut task = Task::new(task_id, description);
        task.predecessors = predecessors;
        task.mutex_groups = mutex_groups;
        task.missing_data = missing_data;
        Ok(task)
    }

    fn register_access(
        &mut self,
        task: TaskId,
        parameter: &Parameter,
        predecessors: &mut BTreeSet<TaskId>,
    ) -> Result<(DataAccessId, Option<MutexGroupId>)> {
        let Some(name) = parameter.data.as_ref() else {
            return Err(Error::InvalidTask { signature: String::new(), reason: "untracked parameter".to_string() });
        };

        if parameter.direction == Direction::Commutative {
            if let Some(result) = self.join_commutative_group(task, name, predecessors) {
                return Ok(result);
            }
        }

        let access = self.data.will_access(name, parameter.direction.access_mode(), parameter.data_type, task)?;
        let data_id = access.data_id();
        self.accessed_by.entry(task).or_default().push(data_id);
        if let Some(write) = access.write_instance() {
            self.pending_writers.entry(write).or_default().insert(task);
        }

        let history = self.histories.entry(data_id).or_default();
        history.close_group();

        let mut mutex = None;
        match parameter.direction {
            Direction::In => {
                predecessors.extend(history.writers.iter().chain(history.concurrent.iter()).copied());
                history.readers.push(task);
            }
            Direction::Concurrent => {
                predecessors.extend(history.writers.iter().copied());
                history.concurrent.push(task);
            }
            Direction::Out | Direction::InOut => {
                predecessors.extend(history.all().copied());
                *history = AccessHistory { writers: vec![task], ..Default::default() };
            }
            Direction::Commutative => {
                let preceding: BTreeSet<TaskId> = history.all().copied().collect();
                predecessors.extend(preceding.iter().copied());
                self.next_mutex_id += 1;
                let group = MutexGroupId(self.next_mutex_id);
                *history = AccessHistory {
                    group: Some(CommutativeGroup { mutex: group, access, members: vec![task], preceding }),
                    ..Default::default()
                };
                mutex = Some(group);
            }
        }
        Ok((access, mutex))
    }

    /// Adds `task` to the open commutative group of `name`, if there is one.
    fn join_commutative_group(
        &mut self,
        task: TaskId,
        name: &DataName,
        predecessors: &mut BTreeSet<TaskId>,
    ) -> Option<(DataAccessId, Option<MutexGroupId>)> {
        let data_id = self.data.data_id(name)?;
        let group = self.histories.get_mut(&data_id)?.group.as_mut()?;

        group.members.push(task);
        predecessors.extend(group.preceding.iter().copied());
        let (access, mutex) = (group.access, group.mutex);

        if let Some(read) = access.read_instance() {
            self.data.add_reader(read);
        }
        if let Some(write) = access.write_instance() {
            self.pending_writers.entry(write).or_default().insert(task);
        }
        self.accessed_by.entry(task).or_default().push(data_id);
        Some((access, Some(mutex)))
    }

    /// Main program write of an input value. Later tasks read the new version without depending on anybody.
    pub fn register_data(&mut self, name: &DataName, data_type: DataType, location: DataLocation) -> DataInstanceId {
        let instance = self.data.register_data(name, data_type, location);
        self.histories.insert(instance.data_id, AccessHistory::default());
        instance
    }

    /// Resolves the version the main program wants to read. Closes any open commutative group on the item.
    pub fn main_access(&mut self, name: &DataName) -> Result<DataInstanceId> {
        let instance = self.data.current_instance(name).ok_or_else(|| Error::DataNotAvailable(name.clone()))?;
        if let Some(history) = self.histories.get_mut(&instance.data_id) {
            history.close_group();
        }
        Ok(instance)
    }

    pub fn availability(&self, instance: DataInstanceId) -> Availability {
        let writing = self.pending_writers.get(&instance).map(|w| !w.is_empty()).unwrap_or(false);
        match self.data.version_state(instance) {
            Some(VersionState::Failed) | None => Availability::Failed,
            Some(VersionState::Produced) if !writing => Availability::Ready(self.data.locations(instance)),
            Some(_) => Availability::Pending,
        }
    }

    /// Forgets an ended task: it no longer orders later accesses nor blocks main accesses.
    pub fn task_ended(&mut self, task: TaskId) {
        for writers in self.pending_writers.values_mut() {
            writers.remove(&task);
        }
        self.pending_writers.retain(|_, writers| !writers.is_empty());

        for data_id in self.accessed_by.remove(&task).unwrap_or_default() {
            if let Some(history) = self.histories.get_mut(&data_id) {
                history.forget(task);
                if let Some(group) = history.group.as_mut() {
                    group.preceding.remove(&task);
                }
            }
        }
    }

    /// Releases a data item. Versions still read by pending tasks are kept until those tasks end.
    pub fn delete_data(&mut self, name: &DataName) -> Result<()> {
        let data_id = self.data.delete_data(name)?;
        self.histories.remove(&data_id);
        log::debug!("Data '{}' released by the application.", name);
        Ok(())
    }

    /// Whether `name` is currently known, for a main access that must fail fast.
    pub fn knows(&self, name: &DataName) -> bool {
        self.data.data_id(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::implementation::{Constraints, Implementation};
    use crate::domain::utils::id::WorkerName;

    fn processor() -> AccessProcessor {
        let mut ap = AccessProcessor::new(DataInfoProvider::new());
        ap.register_data(&DataName::new("f"), DataType::File, DataLocation::worker(WorkerName::new("w1"), "/f"));
        ap
    }

    fn submit(ap: &mut AccessProcessor, direction: Direction) -> Task {
        let description = TaskDescription::new("app.work", vec![Implementation::method(0, "app.work", Constraints::default())])
            .with_parameter(Parameter::file(direction, "f"));
        ap.register_task(description).unwrap()
    }

    fn preds(task: &Task) -> Vec<u64> {
        task.predecessors.iter().map(|t| t.0).collect()
    }

    #[test]
    fn test_task_ids_are_sequential() {
        let mut ap = processor();
        assert_eq!(ap.peek_task_id(), TaskId(1));
        assert_eq!(submit(&mut ap, Direction::In).id, TaskId(1));
        assert_eq!(submit(&mut ap, Direction::In).id, TaskId(2));
    }

    #[test]
    fn test_inout_after_out_depends_on_writer() {
        let mut ap = processor();
        let a = submit(&mut ap, Direction::Out);
        let b = submit(&mut ap, Direction::InOut);

        assert!(a.predecessors.is_empty());
        assert_eq!(preds(&b), vec![1]);
        let DataAccessId::ReadWrite { read, .. } = b.parameters()[0].access.unwrap() else { panic!("expected read-write") };
        assert_eq!(Some(read), a.parameters()[0].access.unwrap().write_instance());
    }

    #[test]
    fn test_readers_share_version_and_writer_waits_for_them() {
        let mut ap = processor();
        let w = submit(&mut ap, Direction::Out);
        let r1 = submit(&mut ap, Direction::In);
        let r2 = submit(&mut ap, Direction::In);
        let w2 = submit(&mut ap, Direction::Out);

        assert_eq!(preds(&r1), vec![w.id.0]);
        assert_eq!(preds(&r2), vec![w.id.0], "readers never order against each other");
        assert_eq!(preds(&w2), vec![1, 2, 3]);
    }

    #[test]
    fn test_concurrent_accesses_are_unordered() {
        let mut ap = processor();
        submit(&mut ap, Direction::Out);
        let c1 = submit(&mut ap, Direction::Concurrent);
        let c2 = submit(&mut ap, Direction::Concurrent);
        let reader = submit(&mut ap, Direction::In);
        let writer = submit(&mut ap, Direction::InOut);

        assert_eq!(preds(&c1), vec![1]);
        assert_eq!(preds(&c2), vec![1]);
        assert_eq!(preds(&reader), vec![1, 2, 3]);
        assert_eq!(preds(&writer), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_commutative_group() {
        let mut ap = processor();
        let first = submit(&mut ap, Direction::Out);
        let m1 = submit(&mut ap, Direction::Commutative);
        let m2 = submit(&mut ap, Direction::Commutative);
        let after = submit(&mut ap, Direction::In);

        assert_eq!(preds(&m1), vec![first.id.0]);
        assert_eq!(preds(&m2), vec![first.id.0], "members do not depend on each other");
        assert_eq!(m1.mutex_groups, m2.mutex_groups);
        assert_eq!(m1.mutex_groups.len(), 1);
        assert_eq!(m1.parameters()[0].access, m2.parameters()[0].access);
        assert_eq!(preds(&after), vec![2, 3]);

        let next_group = submit(&mut ap, Direction::Commutative);
        assert_ne!(next_group.mutex_groups, m1.mutex_groups);
        assert_eq!(preds(&next_group), vec![2, 3, 4]);
    }

    #[test]
    fn test_unknown_data_marks_task() {
        let mut ap = processor();
        let description = TaskDescription::new("app.work", vec![Implementation::method(0, "app.work", Constraints::default())])
            .with_parameter(Parameter::file(Direction::In, "ghost"))
            .with_parameter(Parameter::file(Direction::Out, "result"));
        let task = ap.register_task(description).unwrap();

        assert_eq!(task.missing_data, Some(DataName::new("ghost")));
        assert!(task.parameters()[0].access.is_none());
        assert!(task.parameters()[1].access.is_some());
    }

    #[test]
    fn test_invalid_description_is_rejected_without_id() {
        let mut ap = processor();
        assert!(ap.register_task(TaskDescription::new("app.work", Vec::new())).is_err());
        assert_eq!(ap.peek_task_id(), TaskId(1));
    }

    #[test]
    fn test_ended_task_no_longer_orders() {
        let mut ap = processor();
        let w = submit(&mut ap, Direction::Out);
        ap.task_ended(w.id);
        let r = submit(&mut ap, Direction::In);
        assert!(r.predecessors.is_empty());
    }

    #[test]
    fn test_availability_waits_for_every_commutative_member() {
        let mut ap = processor();
        let m1 = submit(&mut ap, Direction::Commutative);
        let m2 = submit(&mut ap, Direction::Commutative);
        let instance = ap.main_access(&DataName::new("f")).unwrap();
        assert_eq!(Some(instance), m1.parameters()[0].access.unwrap().write_instance());
        assert_eq!(ap.availability(instance), Availability::Pending);

        ap.data().version_produced(instance, vec![DataLocation::worker(WorkerName::new("w1"), "/f.1")]);
        ap.task_ended(m1.id);
        assert_eq!(ap.availability(instance), Availability::Pending);
        ap.data().version_produced(instance, vec![DataLocation::worker(WorkerName::new("w1"), "/f.2")]);
        ap.task_ended(m2.id);
        assert_eq!(ap.availability(instance), Availability::Ready(vec![DataLocation::worker(WorkerName::new("w1"), "/f.2")]));
    }

    #[test]
    fn test_main_access_to_unknown_data() {
        let mut ap = processor();
        assert!(matches!(ap.main_access(&DataName::new("ghost")), Err(Error::DataNotAvailable(_))));
        ap.delete_data(&DataName::new("f")).unwrap();
        assert!(!ap.knows(&DataName::new("f")));
    }
}
