use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::domain::utils::id::WorkerName;

/// Physical place holding the value of a data version. A version with several locations has replicas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataLocation {
    /// Private storage of one worker.
    Worker { host: WorkerName, path: String },
    /// Disk mounted by every worker that lists it among its shared disks.
    Shared { disk: String, path: String },
    /// Object kept by the storage backend, resolved through it.
    Persistent { object_id: String },
}

impl DataLocation {
    pub fn worker(host: WorkerName, path: impl Into<String>) -> Self {
        DataLocation::Worker { host, path: path.into() }
    }

    /// Whether a worker with the given name and mounted disks can read this location without a transfer.
    ///
    /// Persistent objects are never local here; their hosts come from the storage backend.
    pub fn is_local_to(&self, host: &WorkerName, shared_disks: &BTreeSet<String>) -> bool {
        match self {
            DataLocation::Worker { host: owner, .. } => owner == host,
            DataLocation::Shared { disk, .. } => shared_disks.contains(disk),
            DataLocation::Persistent { .. } => false,
        }
    }
}

impl fmt::Display for DataLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataLocation::Worker { host, path } => write!(f, "{}:{}", host, path),
            DataLocation::Shared { disk, path } => write!(f, "shared://{}/{}", disk, path),
            DataLocation::Persistent { object_id } => write!(f, "storage://{}", object_id),
        }
    }
}
