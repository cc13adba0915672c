//! Registry wiring shared by every command.

use crate::builtin;
use anyhow::{Context, Result};
use capsule_condition::{Conditions, SystemStatus};
use capsule_core::EventBus;
use capsule_registry::{
    CapabilityDescriptorRegistry, CapabilityFactoryRegistry, CapabilityRegistry, RegistryConfig,
    StorageBackend,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Resolve the configuration for this invocation.
///
/// Without a configuration file the CLI persists to a file in the working
/// directory. `--storage` always selects the file backend.
pub fn load_config(path: Option<&Path>, storage: Option<PathBuf>) -> Result<RegistryConfig> {
    let mut config = match path {
        Some(path) => RegistryConfig::load(path)?,
        None => {
            let mut config = RegistryConfig::default();
            config.storage.backend = StorageBackend::File;
            config.apply_env();
            config
        }
    };

    if let Some(storage) = storage {
        config.storage.backend = StorageBackend::File;
        config.storage.path = storage;
    }
    config.validate()?;
    Ok(config)
}

/// A started registry with the built-in capability types loaded.
pub struct App {
    pub registry: Arc<CapabilityRegistry>,
    system: SystemStatus,
}

impl App {
    pub fn start(config: &RegistryConfig) -> Result<Self> {
        let bus = Arc::new(EventBus::new());
        let system = SystemStatus::new(bus.clone());

        let factories = Arc::new(CapabilityFactoryRegistry::new());
        let descriptors = Arc::new(CapabilityDescriptorRegistry::new());
        builtin::register(&factories, &descriptors);

        let cipher = config.cipher().context("Failed to initialize cipher")?;
        let registry = CapabilityRegistry::new(
            config.open_storage(),
            Arc::new(cipher),
            factories,
            descriptors,
            Conditions::new(bus, system.clone()),
        );

        system.started();
        registry.load().context("Failed to load capabilities")?;
        debug!("Loaded {} capabilities", registry.get_all().len());

        Ok(Self { registry, system })
    }

    pub fn stop(&self) {
        self.system.stopping();
    }
}
