//! # Capsule Registry
//!
//! The capability registry: validated, encrypted and versioned persistence of
//! capability configurations, and the live lifecycle of each capability.
//!
//! Every capability is wrapped in a [`CapabilityReference`] which drives its
//! callbacks as it is created, enabled, activated, updated, passivated and
//! removed. Activation follows the capability's activation condition ANDed
//! with "system is active"; a capability whose validity condition fails
//! while the system runs is removed.
//!
//! ## Crate Structure
//!
//! - **capability**: The `Capability` and `CapabilityFactory` traits
//! - **registry**: `CapabilityRegistry`, the sole mutator of persisted capabilities
//! - **reference**: `CapabilityReference` and its lifecycle state
//! - **factory** / **descriptor**: Type registries and built-in validation
//! - **cipher** / **secrets**: AES-GCM encryption of sensitive properties
//! - **storage**: In-memory and JSON file backends
//! - **config**: TOML configuration

pub mod capability;
pub mod cipher;
pub mod config;
pub mod descriptor;
pub mod factory;
mod handler;
pub mod reference;
pub mod registry;
pub mod secrets;
pub mod storage;

pub use capability::{Capability, CapabilityFactory};
pub use cipher::AesGcmCipher;
pub use config::{ConfigError, RegistryConfig, StorageBackend};
pub use descriptor::{CapabilityDescriptorRegistry, RequiredFieldsValidator};
pub use factory::CapabilityFactoryRegistry;
pub use reference::{CapabilityReference, ReferenceState};
pub use registry::CapabilityRegistry;
pub use storage::{FileCapabilityStorage, InMemoryCapabilityStorage};
