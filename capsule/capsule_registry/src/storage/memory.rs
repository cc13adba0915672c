use capsule_core::{CapabilityIdentity, CapabilityStorage, CapabilityStorageItem, StorageError};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Volatile storage, for tests and embedded use.
#[derive(Clone, Default)]
pub struct InMemoryCapabilityStorage {
    items: Arc<DashMap<CapabilityIdentity, CapabilityStorageItem>>,
}

impl InMemoryCapabilityStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The item stored under `id`.
    pub fn get(&self, id: CapabilityIdentity) -> Option<CapabilityStorageItem> {
        self.items.get(&id).map(|entry| entry.value().clone())
    }
}

impl CapabilityStorage for InMemoryCapabilityStorage {
    fn add(&self, item: CapabilityStorageItem) -> Result<CapabilityIdentity, StorageError> {
        let id = CapabilityIdentity::new();
        self.items.insert(id, item);
        Ok(id)
    }

    fn update(
        &self,
        id: CapabilityIdentity,
        item: CapabilityStorageItem,
    ) -> Result<(), StorageError> {
        match self.items.get_mut(&id) {
            Some(mut entry) => {
                *entry = item;
                Ok(())
            }
            None => Err(StorageError::NotFound(id)),
        }
    }

    fn remove(&self, id: CapabilityIdentity) -> Result<bool, StorageError> {
        Ok(self.items.remove(&id).is_some())
    }

    fn get_all(&self) -> Result<HashMap<CapabilityIdentity, CapabilityStorageItem>, StorageError> {
        Ok(self
            .items
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect())
    }
}
