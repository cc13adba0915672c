//! Strongly-typed identifiers for the capability framework.
//!
//! Every identifier is a thin wrapper around a UUID with a phantom type
//! parameter, so a capability identity can never be confused with a
//! condition or subscription handle even though all three share the same
//! representation.
//!
//! # Examples
//!
//! ```
//! use capsule_core::id::{CapabilityIdentity, ConditionId};
//! use std::str::FromStr;
//!
//! let capability = CapabilityIdentity::new();
//! let condition = ConditionId::new();
//! assert_ne!(capability.to_string(), condition.to_string());
//!
//! let id_str = "550e8400-e29b-41d4-a716-446655440000";
//! let capability = CapabilityIdentity::from_str(id_str).unwrap();
//! assert_eq!(capability.to_string(), id_str);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use uuid::Uuid;

/// A type-safe identifier based on UUID.
///
/// Identifiers serialize as their bare UUID string, which keeps them usable
/// as JSON object keys in persisted documents.
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T> {
    uuid: Uuid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    /// Create a new random identifier.
    ///
    /// # Examples
    ///
    /// ```
    /// use capsule_core::id::CapabilityIdentity;
    ///
    /// let id = CapabilityIdentity::new();
    /// assert!(!id.is_nil());
    /// ```
    pub fn new() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    /// Create an identifier from a specific UUID.
    ///
    /// Used when rebuilding identities that were assigned by a storage
    /// backend in an earlier run.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self {
            uuid,
            _marker: PhantomData,
        }
    }

    /// Get the underlying UUID.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Create a nil (all zeros) identifier.
    pub fn nil() -> Self {
        Self::from_uuid(Uuid::nil())
    }

    /// Check if this is a nil identifier.
    pub fn is_nil(&self) -> bool {
        self.uuid.is_nil()
    }
}

// Manual impls: the marker type never needs to implement anything itself.
impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl<T> Eq for Id<T> {}

impl<T> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uuid.hash(state);
    }
}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.uuid.cmp(&other.uuid)
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid)
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid)
    }
}

impl<T> FromStr for Id<T> {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_uuid(Uuid::parse_str(s)?))
    }
}

/// Marker type for capability instances.
pub struct CapabilityMarker;
/// Identity of one persisted capability instance.
pub type CapabilityIdentity = Id<CapabilityMarker>;

/// Marker type for conditions.
pub struct ConditionMarker;
/// Identity of one condition instance, unique even for structurally equal conditions.
pub type ConditionId = Id<ConditionMarker>;

/// Marker type for event bus subscriptions.
pub struct SubscriptionMarker;
/// Handle returned by the event bus when subscribing.
pub type SubscriptionId = Id<SubscriptionMarker>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_id_new() {
        let id1 = CapabilityIdentity::new();
        let id2 = CapabilityIdentity::new();
        assert_ne!(id1, id2, "Generated IDs should be unique");
    }

    #[test]
    fn test_id_from_str() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let id = ConditionId::from_str(uuid_str).unwrap();
        assert_eq!(id.to_string(), uuid_str);
        assert!(ConditionId::from_str("not-a-uuid").is_err());
    }

    #[test]
    fn test_id_nil() {
        let nil_id = SubscriptionId::nil();
        assert_eq!(nil_id.to_string(), "00000000-0000-0000-0000-000000000000");
        assert!(nil_id.is_nil());
    }

    #[test]
    fn test_id_serializes_as_plain_string() {
        let id = CapabilityIdentity::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));

        let back: CapabilityIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_id_as_map_key() {
        let id = CapabilityIdentity::new();
        let mut map = HashMap::new();
        map.insert(id, 7u32);

        let json = serde_json::to_string(&map).unwrap();
        let back: HashMap<CapabilityIdentity, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(&id), Some(&7));
    }
}
