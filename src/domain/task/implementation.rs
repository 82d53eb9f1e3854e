use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Resources an implementation needs on the worker that runs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    pub cores: u32,
    pub memory_mb: u64,
    pub architecture: Option<String>,
    /// Names of disks that must be mounted on the worker.
    pub disks: BTreeSet<String>,
    pub tags: BTreeSet<String>,
}

impl Default for Constraints {
    fn default() -> Self {
        Constraints { cores: 1, memory_mb: 0, architecture: None, disks: BTreeSet::new(), tags: BTreeSet::new() }
    }
}

impl Constraints {
    pub fn with_cores(cores: u32) -> Self {
        Constraints { cores, ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImplementationKind {
    Method { declaring_class: String, method: String },
    Binary { path: String },
    Mpi { binary: String, processes: u32 },
    Service { namespace: String, port: String, operation: String },
}

/// One way of running a task. The scheduler picks one implementation per dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    pub id: u32,
    /// Unique name of the implementation, also the key of its execution profile.
    pub signature: String,
    pub kind: ImplementationKind,
    pub constraints: Constraints,
}

impl Implementation {
    pub fn method(id: u32, signature: impl Into<String>, constraints: Constraints) -> Self {
        let signature = signature.into();
        let (declaring_class, method) = match signature.rsplit_once('.') {
            Some((class, method)) => (class.to_string(), method.to_string()),
            None => (String::new(), signature.clone()),
        };
        Implementation { id, signature, kind: ImplementationKind::Method { declaring_class, method }, constraints }
    }
}
