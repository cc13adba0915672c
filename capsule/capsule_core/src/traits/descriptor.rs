//! Capability type metadata.

use crate::error::Result;
use crate::id::CapabilityIdentity;
use crate::types::{CapabilityType, FormField, Properties, Violation};
use std::sync::Arc;

/// Checks a set of capability properties.
pub trait Validator: Send + Sync {
    /// Validate `properties`, returning every violation found.
    fn validate(&self, properties: &Properties) -> Vec<Violation>;

    /// Human readable description of what is checked.
    fn explain(&self) -> String {
        String::from("custom validation")
    }
}

/// Describes one capability type: its form schema, validators and
/// migration logic.
pub trait CapabilityDescriptor: Send + Sync {
    /// The type this descriptor describes.
    fn capability_type(&self) -> CapabilityType;

    /// Display name.
    fn name(&self) -> String;

    /// Current version of the property schema.
    fn version(&self) -> u32 {
        1
    }

    /// Form fields, including which ones are encrypted.
    fn form_fields(&self) -> Vec<FormField>;

    /// Validator applied when creating a capability of this type.
    fn validator(&self) -> Option<Arc<dyn Validator>> {
        None
    }

    /// Validator applied when updating or loading the capability `id`.
    fn validator_for(&self, _id: CapabilityIdentity) -> Option<Arc<dyn Validator>> {
        None
    }

    /// Convert properties written by schema version `from_version` to the
    /// current [`version`](Self::version).
    fn convert(&self, properties: Properties, _from_version: u32) -> Result<Properties> {
        Ok(properties)
    }

    /// Short description of the capability type.
    fn about(&self) -> Option<String> {
        None
    }

    /// Whether administrators may create capabilities of this type.
    fn is_exposed(&self) -> bool {
        true
    }
}
