//! # Capsule Core
//!
//! `capsule_core` provides the building blocks shared by every crate of the
//! Capsule capability framework: identifiers, the persisted data model, the
//! error hierarchy, the in-process event bus, and the interfaces through
//! which the framework reaches persistence, type metadata and encryption.
//!
//! A capability is a named, configurable, pluggable behavior. It is
//! persisted as a [`CapabilityStorageItem`], wrapped at runtime in a live
//! reference, and activated or passivated as conditions over system state
//! change. Those changes travel over the [`EventBus`].
//!
//! ## Crate Structure
//!
//! - **error**: Error types for all framework components
//! - **id**: Strongly-typed identifier types
//! - **event**: Synchronous event bus and lifecycle events
//! - **traits**: Collaborator interfaces (storage, descriptors, cipher, context)
//! - **types**: Data structures used throughout the framework

pub mod error;
pub mod event;
pub mod id;
pub mod traits;
pub mod types;

// Re-export key types and traits for convenience
pub use error::{
    CapabilityError, CipherError, ConditionError, Error, Result, StorageError, ValidationError,
};
pub use event::{CapabilityEvent, CapabilityRegistryEvent, Delivery, EventBus};
pub use id::{CapabilityIdentity, ConditionId, SubscriptionId};
pub use traits::{
    CapabilityContext, CapabilityDescriptor, CapabilityQuery, CapabilityStorage, Cipher, Validator,
};
pub use types::{
    CallbackFailure, CapabilityStorageItem, CapabilityType, FieldKind, FormField, Properties,
    Violation,
};
