//! Encryption of sensitive form-field values.

use crate::error::CipherError;

/// Reversible encryption of single property values.
///
/// Only used for form fields flagged as encrypted.
pub trait Cipher: Send + Sync {
    /// Encrypt `plaintext` into a printable string.
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;

    /// Recover the plaintext from a value produced by [`encrypt`](Self::encrypt).
    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError>;
}
