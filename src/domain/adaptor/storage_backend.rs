use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::domain::adaptor::worker_adaptor::AdaptorError;
use crate::domain::utils::id::WorkerName;

/// Persistent object store. Consulted only for PSCO parameters.
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Hosts keeping a copy of the object.
    fn get_locations(&self, object_id: &str) -> Result<Vec<WorkerName>, AdaptorError>;

    /// Id of a fresh version of the object, optionally keeping the source untouched.
    fn new_version(&self, object_id: &str, preserve_source: bool) -> Result<String, AdaptorError>;
}

/// Storage backend kept in memory, for local runs.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    objects: Mutex<HashMap<String, Vec<WorkerName>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, object_id: impl Into<String>, hosts: Vec<WorkerName>) {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner).insert(object_id.into(), hosts);
    }
}

impl StorageBackend for InMemoryStorage {
    fn get_locations(&self, object_id: &str) -> Result<Vec<WorkerName>, AdaptorError> {
        let objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(objects.get(object_id).cloned().unwrap_or_default())
    }

    fn new_version(&self, object_id: &str, preserve_source: bool) -> Result<String, AdaptorError> {
        let mut objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        let hosts = if preserve_source {
            objects.get(object_id).cloned().unwrap_or_default()
        } else {
            objects.remove(object_id).unwrap_or_default()
        };

        let new_id = format!("{}-{}", object_id, uuid::Uuid::new_v4());
        objects.insert(new_id.clone(), hosts);
        Ok(new_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_version() {
        let storage = InMemoryStorage::new();
        storage.put("obj", vec![WorkerName::new("w1")]);

        let kept = storage.new_version("obj", true).unwrap();
        assert_ne!(kept, "obj");
        assert_eq!(storage.get_locations("obj").unwrap(), vec![WorkerName::new("w1")]);
        assert_eq!(storage.get_locations(&kept).unwrap(), vec![WorkerName::new("w1")]);

        let moved = storage.new_version("obj", false).unwrap();
        assert!(storage.get_locations("obj").unwrap().is_empty());
        assert_eq!(storage.get_locations(&moved).unwrap().len(), 1);
    }
}
