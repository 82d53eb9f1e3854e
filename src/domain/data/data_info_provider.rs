use bimap::BiMap;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::data::data_info::{DataInfo, VersionState};
use crate::domain::data::data_instance::{AccessMode, DataAccessId, DataId, DataInstanceId};
use crate::domain::data::data_location::DataLocation;
use crate::domain::task::parameter::DataType;
use crate::domain::utils::id::{DataName, TaskId};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct ProviderInner {
    names: BiMap<DataName, DataId>,
    infos: HashMap<DataId, DataInfo>,
    next_data_id: u32,
}

impl ProviderInner {
    fn info_by_name_mut(&mut self, name: &DataName) -> Option<&mut DataInfo> {
        let data_id = *self.names.get_by_left(name)?;
        self.infos.get_mut(&data_id)
    }

    fn info_or_create(&mut self, name: &DataName, data_type: DataType) -> &mut DataInfo {
        let existing = self.names.get_by_left(name).copied().filter(|data_id| self.infos.contains_key(data_id));
        match existing {
            Some(data_id) => self.infos.entry(data_id).or_insert_with(|| DataInfo::new(data_id, name.clone(), data_type)),
            None => self.create(name, data_type),
        }
    }

    fn create(&mut self, name: &DataName, data_type: DataType) -> &mut DataInfo {
        self.next_data_id += 1;
        let data_id = DataId(self.next_data_id);
        self.names.insert(name.clone(), data_id);
        self.infos.entry(data_id).or_insert_with(|| DataInfo::new(data_id, name.clone(), data_type))
    }

    fn collect_garbage(&mut self, data_id: DataId) {
        let Some(info) = self.infos.get_mut(&data_id) else {
            return;
        };

        let garbage = info.prune_versions();
        if !garbage.is_empty() {
            log::debug!("Dropped {} obsolete location(s) of '{}'.", garbage.len(), info.name);
        }

        if info.can_be_removed() {
            log::debug!("Data '{}' ({:?}) removed.", info.name, data_id);
            self.infos.remove(&data_id);
        }
    }
}

/// Shared registry of every logical data item, its versions and their locations.
///
/// Cloning the provider clones the handle; all clones see the same registry. The access processor decides
/// versions, while the dispatch path records locations as jobs produce or transfer values.
#[derive(Debug, Clone, Default)]
pub struct DataInfoProvider {
    inner: Arc<RwLock<ProviderInner>>,
}

impl DataInfoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, ProviderInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ProviderInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Main program write: creates a new produced version of `name` living at `location`.
    pub fn register_data(&self, name: &DataName, data_type: DataType, location: DataLocation) -> DataInstanceId {
        let mut inner = self.write();
        let info = inner.info_or_create(name, data_type);
        let instance = info.will_be_written(None);
        if let Some(version) = info.version_mut(instance.version) {
            version.state = VersionState::Produced;
            version.locations.push(location);
        }

        let data_id = info.data_id;
        inner.collect_garbage(data_id);
        log::debug!("Main program registered {} for '{}'.", instance, name);
        instance
    }

    /// Registers an access of `task` and returns the versions it reads and/or writes.
    ///
    /// Reading an unknown item, or a version whose writer failed, is `DataNotAvailable`. A write to an unknown
    /// item creates it.
    pub fn will_access(&self, name: &DataName, mode: AccessMode, data_type: DataType, task: TaskId) -> Result<DataAccessId> {
        let mut inner = self.write();

        if mode == AccessMode::Write {
            let info = inner.info_or_create(name, data_type);
            return Ok(DataAccessId::Write(info.will_be_written(Some(task))));
        }

        let info = inner.info_by_name_mut(name).ok_or_else(|| Error::DataNotAvailable(name.clone()))?;
        if info.current().map(|v| v.state == VersionState::Failed).unwrap_or(true) {
            return Err(Error::DataNotAvailable(name.clone()));
        }

        let read = info.will_be_read().ok_or_else(|| Error::DataNotAvailable(name.clone()))?;
        match mode {
            AccessMode::Read => Ok(DataAccessId::Read(read)),
            _ => {
                let write = info.will_be_written(Some(task));
                Ok(DataAccessId::ReadWrite { read, write })
            }
        }
    }

    /// Adds one more reader to an already allocated version (shared commutative accesses).
    pub fn add_reader(&self, instance: DataInstanceId) {
        let mut inner = self.write();
        if let Some(version) = inner.infos.get_mut(&instance.data_id).and_then(|info| info.version_mut(instance.version)) {
            version.pending_readers += 1;
        }
    }

    /// Releases the read side of an access once its task ended.
    pub fn access_finished(&self, access: &DataAccessId) {
        let mut inner = self.write();
        let data_id = access.data_id();
        if let (Some(read), Some(info)) = (access.read_instance(), inner.infos.get_mut(&data_id)) {
            info.reader_finished(read.version);
        }
        inner.collect_garbage(data_id);
    }

    pub fn data_id(&self, name: &DataName) -> Option<DataId> {
        self.read().names.get_by_left(name).copied()
    }

    pub fn name_of(&self, data_id: DataId) -> Option<DataName> {
        self.read().infos.get(&data_id).map(|info| info.name.clone())
    }

    pub fn current_instance(&self, name: &DataName) -> Option<DataInstanceId> {
        let inner = self.read();
        let data_id = inner.names.get_by_left(name)?;
        inner.infos.get(data_id)?.current_instance()
    }

    pub fn version_state(&self, instance: DataInstanceId) -> Option<VersionState> {
        let inner = self.read();
        inner.infos.get(&instance.data_id)?.version(instance.version).map(|v| v.state)
    }

    pub fn locations(&self, instance: DataInstanceId) -> Vec<DataLocation> {
        let inner = self.read();
        inner
            .infos
            .get(&instance.data_id)
            .and_then(|info| info.version(instance.version))
            .map(|v| v.locations.clone())
            .unwrap_or_default()
    }

    /// Records a new replica of an existing version, typically after a transfer.
    pub fn add_location(&self, instance: DataInstanceId, location: DataLocation) {
        let mut inner = self.write();
        if let Some(version) = inner.infos.get_mut(&instance.data_id).and_then(|info| info.version_mut(instance.version)) {
            if !version.locations.contains(&location) {
                version.locations.push(location);
            }
        }
    }

    /// Marks a version as produced at `locations`, replacing whatever was recorded before.
    pub fn version_produced(&self, instance: DataInstanceId, locations: Vec<DataLocation>) {
        let mut inner = self.write();
        if let Some(version) = inner.infos.get_mut(&instance.data_id).and_then(|info| info.version_mut(instance.version)) {
            version.state = VersionState::Produced;
            if !locations.is_empty() {
                version.locations = locations;
            }
        }
        inner.collect_garbage(instance.data_id);
    }

    /// Marks a version whose writer failed or was cancelled. Later readers get `DataNotAvailable`.
    pub fn version_failed(&self, instance: DataInstanceId) {
        let mut inner = self.write();
        if let Some(version) = inner.infos.get_mut(&instance.data_id).and_then(|info| info.version_mut(instance.version)) {
            if version.state == VersionState::Pending {
                version.state = VersionState::Failed;
            }
        }
        inner.collect_garbage(instance.data_id);
    }

    /// Unbinds `name`. Its versions stay until no pending access references them.
    pub fn delete_data(&self, name: &DataName) -> Result<DataId> {
        let mut inner = self.write();
        let (_, data_id) = inner.names.remove_by_left(name).ok_or_else(|| Error::DataNotAvailable(name.clone()))?;
        if let Some(info) = inner.infos.get_mut(&data_id) {
            info.mark_deleted();
        }
        inner.collect_garbage(data_id);
        log::info!("Data '{}' deleted.", name);
        Ok(data_id)
    }

    pub fn len(&self) -> usize {
        self.read().infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
