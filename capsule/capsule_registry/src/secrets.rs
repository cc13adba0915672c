//! Encryption of the properties flagged as encrypted by a descriptor.

use capsule_core::{CapabilityDescriptor, Cipher, CipherError, Properties};
use std::collections::HashSet;

fn encrypted_keys(descriptor: &dyn CapabilityDescriptor) -> HashSet<String> {
    descriptor
        .form_fields()
        .into_iter()
        .filter(|field| field.encrypted)
        .map(|field| field.id)
        .collect()
}

/// Encrypt the sensitive values of `properties` for storage.
///
/// When `previous` holds the currently stored values, an encrypted value whose
/// plaintext did not change keeps its existing ciphertext.
pub fn encrypt(
    cipher: &dyn Cipher,
    descriptor: &dyn CapabilityDescriptor,
    properties: &Properties,
    previous: Option<&Properties>,
) -> Result<Properties, CipherError> {
    let keys = encrypted_keys(descriptor);
    let mut stored = Properties::with_capacity(properties.len());

    for (key, value) in properties {
        if !keys.contains(key) {
            stored.insert(key.clone(), value.clone());
            continue;
        }

        let reused = match previous.and_then(|p| p.get(key)) {
            Some(old) => match cipher.decrypt(old) {
                Ok(plain) if plain == *value => Some(old.clone()),
                _ => None,
            },
            None => None,
        };
        let encrypted = match reused {
            Some(old) => old,
            None => cipher.encrypt(value)?,
        };
        stored.insert(key.clone(), encrypted);
    }
    Ok(stored)
}

/// Recover plaintext properties from stored ones.
pub fn decrypt(
    cipher: &dyn Cipher,
    descriptor: &dyn CapabilityDescriptor,
    stored: &Properties,
) -> Result<Properties, CipherError> {
    let keys = encrypted_keys(descriptor);
    stored
        .iter()
        .map(|(key, value)| {
            let value = if keys.contains(key) {
                cipher.decrypt(value)?
            } else {
                value.clone()
            };
            Ok((key.clone(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::AesGcmCipher;
    use capsule_core::{CapabilityType, FieldKind, FormField};

    struct Descriptor;

    impl CapabilityDescriptor for Descriptor {
        fn capability_type(&self) -> CapabilityType {
            CapabilityType::new("webhook")
        }

        fn name(&self) -> String {
            "Webhook".to_string()
        }

        fn form_fields(&self) -> Vec<FormField> {
            vec![
                FormField::new("url", "URL", FieldKind::Url),
                FormField::new("secret", "Secret", FieldKind::Password).encrypted(),
            ]
        }
    }

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_only_flagged_fields_are_encrypted() {
        let cipher = AesGcmCipher::from_passphrase("key").unwrap();
        let plain = props(&[("url", "http://example.com"), ("secret", "hunter2")]);

        let stored = encrypt(&cipher, &Descriptor, &plain, None).unwrap();
        assert_eq!(stored["url"], "http://example.com");
        assert_ne!(stored["secret"], "hunter2");

        assert_eq!(decrypt(&cipher, &Descriptor, &stored).unwrap(), plain);
    }

    #[test]
    fn test_unchanged_secret_keeps_ciphertext() {
        let cipher = AesGcmCipher::from_passphrase("key").unwrap();
        let plain = props(&[("secret", "hunter2")]);
        let stored = encrypt(&cipher, &Descriptor, &plain, None).unwrap();

        let again = encrypt(&cipher, &Descriptor, &plain, Some(&stored)).unwrap();
        assert_eq!(again["secret"], stored["secret"]);

        let changed = encrypt(
            &cipher,
            &Descriptor,
            &props(&[("secret", "hunter3")]),
            Some(&stored),
        )
        .unwrap();
        assert_ne!(changed["secret"], stored["secret"]);
    }
}
