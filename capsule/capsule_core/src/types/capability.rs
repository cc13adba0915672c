//! Capability data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Configuration properties of a capability, keyed by form field id.
pub type Properties = HashMap<String, String>;

/// The kind of a capability. Many identities may share one type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityType(String);

impl CapabilityType {
    /// Create a capability type from its tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The raw type tag.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CapabilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CapabilityType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for CapabilityType {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

/// The persisted record of one capability.
///
/// Properties flagged as encrypted by the descriptor's form fields hold
/// ciphertext here; every other property is plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityStorageItem {
    /// Descriptor version the properties were written with.
    pub version: u32,

    /// Type of the capability.
    #[serde(rename = "type")]
    pub capability_type: CapabilityType,

    /// Whether the capability is enabled.
    pub enabled: bool,

    /// Free-form administrator notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    /// Configuration properties.
    #[serde(default)]
    pub properties: Properties,
}

impl CapabilityStorageItem {
    /// Create a new storage item.
    pub fn new(
        version: u32,
        capability_type: CapabilityType,
        enabled: bool,
        notes: Option<String>,
        properties: Properties,
    ) -> Self {
        Self {
            version,
            capability_type,
            enabled,
            notes,
            properties,
        }
    }
}

/// A failure raised by one of a capability's own callbacks.
///
/// Callback failures are captured as data on the reference instead of being
/// returned to whoever triggered the transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackFailure {
    /// The lifecycle action that failed ("Create", "Activate", ...).
    pub action: String,

    /// Rendered error message.
    pub message: String,

    /// When the failure was captured.
    pub occurred_at: DateTime<Utc>,
}

impl CallbackFailure {
    /// Capture a failure of `action` now.
    pub fn new(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

impl fmt::Display for CallbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.action, self.message)
    }
}
