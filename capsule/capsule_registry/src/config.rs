//! Configuration for a capability registry.
//!
//! Loaded from TOML. Every field has a default, so an empty or missing file
//! yields a usable in-memory configuration.

use crate::cipher::AesGcmCipher;
use crate::storage::{FileCapabilityStorage, InMemoryCapabilityStorage};
use capsule_core::{CapabilityStorage, CipherError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Environment variable overriding the configured cipher passphrase.
pub const CIPHER_KEY_ENV: &str = "CAPSULE_CIPHER_KEY";

/// Errors that can occur in configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}: {source}")]
    LoadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration from {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Nothing survives the process.
    #[default]
    Memory,
    /// A single JSON document on disk.
    File,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which backend to use
    #[serde(default)]
    pub backend: StorageBackend,

    /// Document path for the file backend
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("capabilities.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
        }
    }
}

/// Cipher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherConfig {
    /// Passphrase the encryption key is derived from
    #[serde(default = "default_passphrase")]
    pub passphrase: String,
}

fn default_passphrase() -> String {
    "capsule-default-passphrase".to_string()
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            passphrase: default_passphrase(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `capsule_registry=debug`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of plain text
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Registry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Cipher configuration
    #[serde(default)]
    pub cipher: CipherConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RegistryConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults. The passphrase is then taken from
    /// [`CIPHER_KEY_ENV`] if set, and the result is validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = fs::read_to_string(path).map_err(|source| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                source,
            })?;
            Self::parse(path, &content)?
        } else {
            warn!("Configuration file not found: {}", path.display());
            Self::default()
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(passphrase) = std::env::var(CIPHER_KEY_ENV) {
            self.cipher.passphrase = passphrase;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.backend == StorageBackend::File && self.storage.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "File storage requires a path".to_string(),
            ));
        }

        if self.cipher.passphrase.is_empty() {
            return Err(ConfigError::Invalid(
                "Cipher passphrase cannot be empty".to_string(),
            ));
        }
        if self.cipher.passphrase == default_passphrase() {
            warn!(
                "Using the default cipher passphrase; set {} to protect secrets",
                CIPHER_KEY_ENV
            );
        }

        Ok(())
    }

    /// Open the configured storage backend.
    pub fn open_storage(&self) -> Arc<dyn CapabilityStorage> {
        match self.storage.backend {
            StorageBackend::Memory => Arc::new(InMemoryCapabilityStorage::new()),
            StorageBackend::File => Arc::new(FileCapabilityStorage::new(&self.storage.path)),
        }
    }

    /// Build the configured cipher.
    pub fn cipher(&self) -> Result<AesGcmCipher, CipherError> {
        AesGcmCipher::from_passphrase(&self.cipher.passphrase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.logging.level, "warn");
        assert!(!config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = RegistryConfig::parse(
            Path::new("inline.toml"),
            r#"
            [storage]
            backend = "file"
            path = "/var/lib/capsule/capabilities.json"

            [logging]
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(
            config.storage.path,
            PathBuf::from("/var/lib/capsule/capabilities.json")
        );
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.cipher.passphrase, default_passphrase());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = RegistryConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[storage\nbackend = ").unwrap();

        let err = RegistryConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseFailed { .. }));
    }

    #[test]
    fn test_validation() {
        let mut config = RegistryConfig::default();
        config.cipher.passphrase = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = RegistryConfig::default();
        config.storage.backend = StorageBackend::File;
        config.storage.path = PathBuf::new();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
