//! The pluggable behavior managed by the registry.

use anyhow::Result;
use capsule_condition::{Condition, Conditions};
use capsule_core::{CapabilityContext, Properties};
use std::sync::Arc;

/// A configurable behavior that can be activated and passivated.
///
/// Callbacks report failure through their `Result`; the registry records the
/// failure on the capability instead of returning it to its own caller.
pub trait Capability: Send + Sync {
    /// Called once with the capability's live context, before any other callback.
    fn init(&self, _context: Arc<dyn CapabilityContext>) {}

    /// The capability was created with `properties`.
    fn on_create(&self, _properties: &Properties) -> Result<()> {
        Ok(())
    }

    /// The capability was loaded from storage with `properties`.
    fn on_load(&self, properties: &Properties) -> Result<()> {
        self.on_create(properties)
    }

    /// The properties changed from `previous` to `properties`.
    fn on_update(&self, _properties: &Properties, _previous: &Properties) -> Result<()> {
        Ok(())
    }

    /// The capability was removed.
    fn on_remove(&self) -> Result<()> {
        Ok(())
    }

    /// The capability became active.
    fn on_activate(&self) -> Result<()> {
        Ok(())
    }

    /// The capability stopped being active.
    fn on_passivate(&self) -> Result<()> {
        Ok(())
    }

    /// Condition gating activation of the enabled capability.
    ///
    /// Called on every enable; return a fresh condition each time. `None`
    /// means the capability is active whenever it is enabled and the system
    /// is running.
    fn activation_condition(&self) -> Result<Option<Arc<dyn Condition>>> {
        Ok(None)
    }

    /// Condition whose loss removes the capability. `None` means always valid.
    fn validity_condition(&self) -> Result<Option<Arc<dyn Condition>>> {
        Ok(None)
    }

    /// Human readable description of this instance.
    fn description(&self) -> Option<String> {
        None
    }

    /// Human readable runtime status.
    fn status(&self) -> Option<String> {
        None
    }
}

/// Creates capability instances of one type.
pub trait CapabilityFactory: Send + Sync {
    /// Create a new, not yet configured, capability.
    fn create(&self, conditions: &Conditions) -> Box<dyn Capability>;
}

impl<F> CapabilityFactory for F
where
    F: Fn(&Conditions) -> Box<dyn Capability> + Send + Sync,
{
    fn create(&self, conditions: &Conditions) -> Box<dyn Capability> {
        self(conditions)
    }
}
