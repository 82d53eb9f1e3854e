use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::task::implementation::Constraints;

/// Capabilities of a worker.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceDescription {
    pub cores: u32,
    pub memory_mb: u64,
    pub architecture: Option<String>,
    pub disks: BTreeSet<String>,
    pub tags: BTreeSet<String>,
}

impl ResourceDescription {
    pub fn new(cores: u32, memory_mb: u64) -> Self {
        ResourceDescription { cores, memory_mb, ..Default::default() }
    }

    pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = Some(architecture.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_disk(mut self, disk: impl Into<String>) -> Self {
        self.disks.insert(disk.into());
        self
    }

    /// Static check: could this description ever run something with `constraints`, ignoring current load.
    pub fn can_host(&self, constraints: &Constraints) -> bool {
        let architecture_matches = match (&constraints.architecture, &self.architecture) {
            (None, _) => true,
            (Some(required), Some(offered)) => required == offered,
            (Some(_), None) => false,
        };

        self.cores >= constraints.cores
            && self.memory_mb >= constraints.memory_mb
            && architecture_matches
            && constraints.disks.is_subset(&self.disks)
            && constraints.tags.is_subset(&self.tags)
    }

    pub fn increase(&mut self, other: &ResourceDescription) {
        self.cores += other.cores;
        self.memory_mb += other.memory_mb;
        if self.architecture.is_none() {
            self.architecture = other.architecture.clone();
        }
        self.disks.extend(other.disks.iter().cloned());
        self.tags.extend(other.tags.iter().cloned());
    }

    pub fn reduce(&mut self, other: &ResourceDescription) {
        self.cores = self.cores.saturating_sub(other.cores);
        self.memory_mb = self.memory_mb.saturating_sub(other.memory_mb);
        for disk in &other.disks {
            self.disks.remove(disk);
        }
        for tag in &other.tags {
            self.tags.remove(tag);
        }
    }
}
