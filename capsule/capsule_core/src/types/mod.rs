//! Data structures shared across the capability framework.

pub mod capability;
pub mod form;
pub mod validation;

pub use capability::{CallbackFailure, CapabilityStorageItem, CapabilityType, Properties};
pub use form::{FieldKind, FormField};
pub use validation::Violation;
