use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric id of a logical data item. Bound to a [`DataName`](crate::domain::utils::id::DataName) by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataId(pub u32);

/// One immutable version of a data item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataInstanceId {
    pub data_id: DataId,
    pub version: u32,
}

impl DataInstanceId {
    pub fn new(data_id: DataId, version: u32) -> Self {
        DataInstanceId { data_id, version }
    }

    /// File-system friendly name of the version, used for worker side paths.
    pub fn rename(&self) -> String {
        format!("d{}v{}", self.data_id.0, self.version)
    }
}

impl fmt::Display for DataInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}v{}", self.data_id.0, self.version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

/// Versions touched by one parameter of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataAccessId {
    Read(DataInstanceId),
    Write(DataInstanceId),
    ReadWrite { read: DataInstanceId, write: DataInstanceId },
}

impl DataAccessId {
    pub fn data_id(&self) -> DataId {
        match self {
            DataAccessId::Read(instance) | DataAccessId::Write(instance) => instance.data_id,
            DataAccessId::ReadWrite { write, .. } => write.data_id,
        }
    }

    pub fn read_instance(&self) -> Option<DataInstanceId> {
        match self {
            DataAccessId::Read(instance) => Some(*instance),
            DataAccessId::ReadWrite { read, .. } => Some(*read),
            DataAccessId::Write(_) => None,
        }
    }

    pub fn write_instance(&self) -> Option<DataInstanceId> {
        match self {
            DataAccessId::Write(instance) => Some(*instance),
            DataAccessId::ReadWrite { write, .. } => Some(*write),
            DataAccessId::Read(_) => None,
        }
    }
}
