//! Durable capability storage.

use crate::error::StorageError;
use crate::id::CapabilityIdentity;
use crate::types::CapabilityStorageItem;
use std::collections::HashMap;

/// Durable key/item store keyed by capability identity.
///
/// Implementations must never reuse an identity and must return previously
/// assigned identities unchanged from [`get_all`](Self::get_all).
pub trait CapabilityStorage: Send + Sync {
    /// Persist a new item.
    ///
    /// # Returns
    ///
    /// The identity assigned to the item.
    fn add(&self, item: CapabilityStorageItem) -> Result<CapabilityIdentity, StorageError>;

    /// Replace the item stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if nothing is stored under `id`.
    fn update(&self, id: CapabilityIdentity, item: CapabilityStorageItem)
        -> Result<(), StorageError>;

    /// Delete the item stored under `id`.
    ///
    /// Returns `true` if an item was deleted.
    fn remove(&self, id: CapabilityIdentity) -> Result<bool, StorageError>;

    /// Read every stored item.
    fn get_all(&self) -> Result<HashMap<CapabilityIdentity, CapabilityStorageItem>, StorageError>;
}
