//! Form-field schema published by capability descriptors.

use serde::{Deserialize, Serialize};

/// Input kind of a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Free text.
    String,
    /// Text whose value is never echoed back.
    Password,
    /// Numeric value.
    Number,
    /// `true` / `false`.
    Checkbox,
    /// URL.
    Url,
}

/// One configurable property of a capability type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    /// Property key.
    pub id: String,

    /// Human readable label.
    pub label: String,

    /// Input kind.
    pub kind: FieldKind,

    /// Whether a non-blank value is required.
    pub required: bool,

    /// Whether the value is stored as ciphertext.
    pub encrypted: bool,
}

impl FormField {
    /// Create an optional, plaintext field.
    pub fn new(id: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
            required: false,
            encrypted: false,
        }
    }

    /// Mark the field as mandatory.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark the field as sensitive.
    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }
}
