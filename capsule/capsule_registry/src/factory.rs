//! Lookup of capability factories by type.

use crate::capability::CapabilityFactory;
use capsule_core::CapabilityType;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maps capability types to the factories creating them.
#[derive(Default)]
pub struct CapabilityFactoryRegistry {
    factories: DashMap<CapabilityType, Arc<dyn CapabilityFactory>>,
}

impl CapabilityFactoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for `capability_type`, replacing any previous one.
    pub fn register(&self, capability_type: CapabilityType, factory: Arc<dyn CapabilityFactory>) {
        debug!("Registering capability factory for {}", capability_type);
        if self
            .factories
            .insert(capability_type.clone(), factory)
            .is_some()
        {
            warn!("Replaced capability factory for {}", capability_type);
        }
    }

    /// Remove the factory for `capability_type`.
    pub fn unregister(&self, capability_type: &CapabilityType) -> bool {
        self.factories.remove(capability_type).is_some()
    }

    /// The factory for `capability_type`.
    pub fn get(&self, capability_type: &CapabilityType) -> Option<Arc<dyn CapabilityFactory>> {
        self.factories
            .get(capability_type)
            .map(|entry| entry.value().clone())
    }
}
