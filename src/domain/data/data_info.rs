use std::collections::BTreeMap;

use crate::domain::data::data_instance::{DataId, DataInstanceId};
use crate::domain::data::data_location::DataLocation;
use crate::domain::task::parameter::DataType;
use crate::domain::utils::id::{DataName, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionState {
    /// A writer has been registered but has not produced the value yet.
    Pending,
    Produced,
    /// The writer failed or was cancelled; the value will never exist.
    Failed,
}

#[derive(Debug, Clone)]
pub struct DataVersion {
    pub instance: DataInstanceId,
    pub state: VersionState,
    /// `None` for values registered by the main program.
    pub writer: Option<TaskId>,
    pub pending_readers: u32,
    pub locations: Vec<DataLocation>,
}

/// Version history of one logical data item.
///
/// Versions are immutable once produced and only the latest one accepts new writers. Old versions are
/// pruned as soon as nobody is going to read them anymore.
#[derive(Debug, Clone)]
pub struct DataInfo {
    pub data_id: DataId,
    pub name: DataName,
    pub data_type: DataType,
    versions: BTreeMap<u32, DataVersion>,
    current_version: u32,
    deleted: bool,
}

impl DataInfo {
    pub fn new(data_id: DataId, name: DataName, data_type: DataType) -> Self {
        DataInfo { data_id, name, data_type, versions: BTreeMap::new(), current_version: 0, deleted: false }
    }

    pub fn current_instance(&self) -> Option<DataInstanceId> {
        self.versions.get(&self.current_version).map(|v| v.instance)
    }

    pub fn current(&self) -> Option<&DataVersion> {
        self.versions.get(&self.current_version)
    }

    pub fn version(&self, version: u32) -> Option<&DataVersion> {
        self.versions.get(&version)
    }

    pub fn version_mut(&mut self, version: u32) -> Option<&mut DataVersion> {
        self.versions.get_mut(&version)
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Registers a reader of the current version and returns it.
    pub fn will_be_read(&mut self) -> Option<DataInstanceId> {
        let current = self.versions.get_mut(&self.current_version)?;
        current.pending_readers += 1;
        Some(current.instance)
    }

    /// Appends a new pending version written by `writer` and makes it current.
    pub fn will_be_written(&mut self, writer: Option<TaskId>) -> DataInstanceId {
        self.current_version += 1;
        let instance = DataInstanceId::new(self.data_id, self.current_version);
        self.versions.insert(
            self.current_version,
            DataVersion { instance, state: VersionState::Pending, writer, pending_readers: 0, locations: Vec::new() },
        );
        instance
    }

    pub fn reader_finished(&mut self, version: u32) {
        if let Some(v) = self.versions.get_mut(&version) {
            v.pending_readers = v.pending_readers.saturating_sub(1);
        }
    }

    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    /// Drops every non-current version nobody waits on. Returns the locations that became garbage.
    pub fn prune_versions(&mut self) -> Vec<DataLocation> {
        let current = self.current_version;
        let obsolete: Vec<u32> = self
            .versions
            .iter()
            .filter(|(number, v)| **number != current && v.pending_readers == 0 && v.state != VersionState::Pending)
            .map(|(number, _)| *number)
            .collect();

        let mut garbage = Vec::new();
        for number in obsolete {
            if let Some(v) = self.versions.remove(&number) {
                garbage.extend(v.locations);
            }
        }
        garbage
    }

    /// A deleted item can go once nothing is pending on any version.
    pub fn can_be_removed(&self) -> bool {
        self.deleted && self.versions.values().all(|v| v.pending_readers == 0 && v.state != VersionState::Pending)
    }
}
