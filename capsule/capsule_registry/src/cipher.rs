//! AES-256-GCM implementation of the cipher service.
//!
//! Values are encoded as base64 of `nonce || ciphertext`, with a fresh
//! random 96-bit nonce per value. The key is the SHA-256 digest of a
//! passphrase.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use capsule_core::{Cipher, CipherError};
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

/// Authenticated symmetric cipher for sensitive property values.
#[derive(Clone)]
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// Derive the key from `passphrase`.
    pub fn from_passphrase(passphrase: &str) -> Result<Self, CipherError> {
        if passphrase.is_empty() {
            return Err(CipherError::InvalidKey);
        }
        let key = Sha256::digest(passphrase.as_bytes());
        Self::from_key(&key)
    }

    /// Use a raw 32-byte key.
    pub fn from_key(key: &[u8]) -> Result<Self, CipherError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CipherError::InvalidKey)?;
        Ok(Self { cipher })
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| CipherError::Encryption(format!("{:?}", e)))?;

        let mut encoded = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        encoded.extend_from_slice(&nonce);
        encoded.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(encoded))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let decoded = STANDARD
            .decode(ciphertext)
            .map_err(|e| CipherError::Decryption(format!("invalid encoding: {}", e)))?;
        if decoded.len() < NONCE_LEN {
            return Err(CipherError::Decryption("value too short".to_string()));
        }

        let (nonce, body) = decoded.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| CipherError::Decryption("authentication failed".to_string()))?;
        String::from_utf8(plaintext)
            .map_err(|e| CipherError::Decryption(format!("invalid UTF-8: {}", e)))
    }
}
