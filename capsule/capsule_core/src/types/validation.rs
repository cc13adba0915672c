//! Validation results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single rejected property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Key of the offending field, e.g. `typeId` for an unknown type.
    pub key: String,

    /// Why the value was rejected.
    pub message: String,
}

impl Violation {
    /// Create a violation for `key`.
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}
