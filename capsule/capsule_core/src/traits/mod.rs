//! Collaborator interfaces used by the capability framework.
//!
//! The registry and the conditions only ever talk to persistence, type
//! metadata, encryption and live capability state through these traits.

pub mod cipher;
pub mod context;
pub mod descriptor;
pub mod storage;

pub use cipher::Cipher;
pub use context::{CapabilityContext, CapabilityQuery};
pub use descriptor::{CapabilityDescriptor, Validator};
pub use storage::CapabilityStorage;
