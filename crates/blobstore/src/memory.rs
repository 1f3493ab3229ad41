use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::digest::{Algorithm, Id};
use crate::error::{Result, StoreError};
use crate::metadata::MetadataKey;
use crate::store::{StoreBackend, WalkFn};

#[derive(Debug, Default)]
struct Entry {
    data: Vec<u8>,
    metadata: HashMap<String, Vec<u8>>,
}

/// In-memory, HashMap-based store.
///
/// Intended for tests and embedding. Follows the same contract as
/// [`crate::FsStore`]; since nothing outside the process can touch its
/// contents, reads skip digest verification.
#[derive(Debug, Default)]
pub struct MemoryStore {
    algorithm: Algorithm,
    entries: RwLock<HashMap<Id, Entry>>,
}

impl MemoryStore {
    /// Create an empty store using the canonical algorithm.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store addressing content with `algorithm`.
    pub fn with_algorithm(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            entries: RwLock::default(),
        }
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StoreBackend for MemoryStore {
    fn set(&self, data: &[u8]) -> Result<Id> {
        let id = Id::compute(self.algorithm, data)?;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.entry(id.clone()).or_insert_with(|| Entry {
            data: data.to_vec(),
            metadata: HashMap::new(),
        });
        Ok(id)
    }

    fn get(&self, id: &Id) -> Result<Vec<u8>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(id)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn delete(&self, id: &Id) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        Ok(())
    }

    fn set_metadata(&self, id: &Id, key: &str, value: &[u8]) -> Result<()> {
        let key = MetadataKey::new(key)?;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        entry.metadata.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get_metadata(&self, id: &Id, key: &str) -> Result<Vec<u8>> {
        let key = MetadataKey::new(key)?;
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        entry
            .metadata
            .get(key.as_str())
            .cloned()
            .ok_or_else(|| StoreError::MetadataNotFound {
                id: id.clone(),
                key: key.to_string(),
            })
    }

    fn walk(&self, visit: &mut WalkFn<'_>) -> Result<()> {
        // Snapshot first so the visitor may call back into the store.
        let ids: Vec<Id> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        for id in &ids {
            visit(id)?;
        }
        Ok(())
    }
}
