//! Capability lifecycle events.

use crate::id::CapabilityIdentity;
use crate::traits::CapabilityContext;
use crate::types::{CapabilityType, Properties};
use std::fmt;
use std::sync::Arc;

/// Published by capability references as they move through their lifecycle.
#[derive(Clone)]
pub enum CapabilityEvent {
    /// A reference was created or loaded.
    Created(Arc<dyn CapabilityContext>),

    /// Properties are about to change.
    BeforeUpdate {
        /// The capability being updated.
        context: Arc<dyn CapabilityContext>,
        /// New properties.
        properties: Properties,
        /// Properties before the update.
        previous: Properties,
    },

    /// Properties have changed.
    AfterUpdate {
        /// The updated capability.
        context: Arc<dyn CapabilityContext>,
        /// New properties.
        properties: Properties,
        /// Properties before the update.
        previous: Properties,
    },

    /// The capability became active.
    AfterActivated(Arc<dyn CapabilityContext>),

    /// The capability is about to stop being active.
    BeforePassivated(Arc<dyn CapabilityContext>),

    /// The capability was removed.
    AfterRemove(Arc<dyn CapabilityContext>),

    /// A capability callback failed.
    CallbackFailure {
        /// The failing capability.
        context: Arc<dyn CapabilityContext>,
        /// Failing lifecycle action.
        action: String,
        /// Rendered error.
        message: String,
    },

    /// A previously recorded callback failure was cleared.
    CallbackFailureCleared(Arc<dyn CapabilityContext>),
}

impl CapabilityEvent {
    /// The capability the event is about.
    pub fn context(&self) -> &Arc<dyn CapabilityContext> {
        match self {
            CapabilityEvent::Created(context)
            | CapabilityEvent::BeforeUpdate { context, .. }
            | CapabilityEvent::AfterUpdate { context, .. }
            | CapabilityEvent::AfterActivated(context)
            | CapabilityEvent::BeforePassivated(context)
            | CapabilityEvent::AfterRemove(context)
            | CapabilityEvent::CallbackFailure { context, .. }
            | CapabilityEvent::CallbackFailureCleared(context) => context,
        }
    }

    /// Identity of the capability the event is about.
    pub fn capability_id(&self) -> CapabilityIdentity {
        self.context().id()
    }

    /// Type of the capability the event is about.
    pub fn capability_type(&self) -> CapabilityType {
        self.context().capability_type()
    }

    /// Short event name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            CapabilityEvent::Created(_) => "Created",
            CapabilityEvent::BeforeUpdate { .. } => "BeforeUpdate",
            CapabilityEvent::AfterUpdate { .. } => "AfterUpdate",
            CapabilityEvent::AfterActivated(_) => "AfterActivated",
            CapabilityEvent::BeforePassivated(_) => "BeforePassivated",
            CapabilityEvent::AfterRemove(_) => "AfterRemove",
            CapabilityEvent::CallbackFailure { .. } => "CallbackFailure",
            CapabilityEvent::CallbackFailureCleared(_) => "CallbackFailureCleared",
        }
    }
}

impl fmt::Debug for CapabilityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.capability_id())
    }
}

/// Published by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityRegistryEvent {
    /// Every persisted capability has been processed by `load`.
    AfterLoad,
}
