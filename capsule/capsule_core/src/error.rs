//! Error types for the capability framework.
//!
//! Errors are organized by subsystem. The root error type, `Error`, wraps
//! each subsystem error so that registry operations can surface any of them
//! through a single `Result`.

use crate::id::CapabilityIdentity;
use crate::types::{CapabilityType, Violation};
use thiserror::Error;

/// Root error type for the capability framework.
#[derive(Debug, Error)]
pub enum Error {
    /// Capability lookup and lifecycle errors
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    /// Rejected configuration
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Persistence errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Encryption errors
    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    /// Condition contract violations
    #[error("Condition error: {0}")]
    Condition(#[from] ConditionError),
}

/// Errors related to capability lookup and lifecycle.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// No capability with the given identity is registered
    #[error("Capability not found: {0}")]
    NotFound(CapabilityIdentity),

    /// No factory or descriptor is registered for the type
    #[error("Unknown capability type: {0}")]
    UnknownType(CapabilityType),

    /// The reference's current state does not permit the operation
    #[error("State '{state}' does not permit '{operation}' operation")]
    IllegalState {
        /// Name of the current state
        state: String,

        /// Rejected operation
        operation: String,
    },

    /// Version migration of stored properties failed
    #[error("Failed to convert {capability_type} properties from version {from} to {to}: {reason}")]
    ConversionFailed {
        /// Type being converted
        capability_type: CapabilityType,

        /// Stored version
        from: u32,

        /// Descriptor version
        to: u32,

        /// Converter message
        reason: String,
    },
}

/// Errors raised when configuration is rejected.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// One or more properties are invalid; every violation is reported
    #[error("Invalid configuration: {}", render_violations(.0))]
    InvalidConfiguration(Vec<Violation>),
}

impl ValidationError {
    /// All violations carried by this error.
    pub fn violations(&self) -> &[Violation] {
        match self {
            ValidationError::InvalidConfiguration(violations) => violations,
        }
    }
}

fn render_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised by capability storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No item is stored under the identity
    #[error("No stored capability with id {0}")]
    NotFound(CapabilityIdentity),

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding failure
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Errors raised by the cipher service.
#[derive(Debug, Error)]
pub enum CipherError {
    /// Key material is unusable
    #[error("Invalid cipher key")]
    InvalidKey,

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed, the value is corrupt or was written with another key
    #[error("Decryption failed: {0}")]
    Decryption(String),
}

/// Errors raised when the condition contract is misused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    /// The condition is already bound
    #[error("Condition is already bound")]
    AlreadyBound,

    /// A capability context was already assigned
    #[error("Capability context is already set")]
    ContextAlreadySet,

    /// A composite was built with too few children
    #[error("At least {required} conditions are required, got {actual}")]
    TooFewConditions {
        /// Minimum number of children
        required: usize,

        /// Number supplied
        actual: usize,
    },
}

/// Result type for framework operations.
pub type Result<T> = std::result::Result<T, Error>;
