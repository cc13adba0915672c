//! Read-only views over live capabilities.

use crate::id::CapabilityIdentity;
use crate::traits::descriptor::CapabilityDescriptor;
use crate::types::{CallbackFailure, CapabilityType, Properties};
use std::sync::Arc;

/// The per-instance state a context-aware condition evaluates against.
pub trait CapabilityContext: Send + Sync {
    /// Identity of the capability.
    fn id(&self) -> CapabilityIdentity;

    /// Type of the capability.
    fn capability_type(&self) -> CapabilityType;

    /// Descriptor of the capability's type.
    fn descriptor(&self) -> Arc<dyn CapabilityDescriptor>;

    /// Current plaintext properties.
    fn properties(&self) -> Properties;

    /// Administrator notes.
    fn notes(&self) -> Option<String>;

    /// Whether the capability is enabled.
    fn is_enabled(&self) -> bool;

    /// Whether the capability is active.
    fn is_active(&self) -> bool;

    /// The last captured callback failure, if any.
    fn failure(&self) -> Option<CallbackFailure>;

    /// Whether a callback failure is currently recorded.
    fn has_failure(&self) -> bool {
        self.failure().is_some()
    }

    /// Human readable state, e.g. why an enabled capability is not active.
    fn state_description(&self) -> String;
}

/// Snapshot access to every live capability.
pub trait CapabilityQuery: Send + Sync {
    /// All registered capabilities at the time of the call.
    fn capabilities(&self) -> Vec<Arc<dyn CapabilityContext>>;
}
