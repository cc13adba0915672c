use capsule_core::{CapabilityIdentity, CapabilityStorage, CapabilityStorageItem, StorageError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<DateTime<Utc>>,

    #[serde(default)]
    capabilities: HashMap<CapabilityIdentity, CapabilityStorageItem>,
}

/// Stores every capability in a single JSON document.
///
/// Writes go to a temporary sibling file that is synced and then renamed over
/// the document, so a crash never leaves a half-written document behind.
pub struct FileCapabilityStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCapabilityStorage {
    /// Use the document at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Document, StorageError> {
        if !self.path.exists() {
            return Ok(Document::default());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Document::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, mut document: Document) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        document.saved_at = Some(Utc::now());
        let data = serde_json::to_vec_pretty(&document)?;

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, data)?;
        fs::File::open(&temp_path)?.sync_all()?;
        fs::rename(&temp_path, &self.path)?;

        debug!(
            "Wrote {} capabilities to {}",
            document.capabilities.len(),
            self.path.display()
        );
        Ok(())
    }

    fn modify<T>(
        &self,
        change: impl FnOnce(&mut Document) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let _guard = self.lock.lock();
        let mut document = self.read()?;
        let result = change(&mut document)?;
        self.write(document)?;
        Ok(result)
    }
}

impl CapabilityStorage for FileCapabilityStorage {
    fn add(&self, item: CapabilityStorageItem) -> Result<CapabilityIdentity, StorageError> {
        self.modify(|document| {
            let mut id = CapabilityIdentity::new();
            while document.capabilities.contains_key(&id) {
                id = CapabilityIdentity::new();
            }
            document.capabilities.insert(id, item);
            Ok(id)
        })
    }

    fn update(
        &self,
        id: CapabilityIdentity,
        item: CapabilityStorageItem,
    ) -> Result<(), StorageError> {
        self.modify(|document| match document.capabilities.get_mut(&id) {
            Some(existing) => {
                *existing = item;
                Ok(())
            }
            None => Err(StorageError::NotFound(id)),
        })
    }

    fn remove(&self, id: CapabilityIdentity) -> Result<bool, StorageError> {
        self.modify(|document| Ok(document.capabilities.remove(&id).is_some()))
    }

    fn get_all(&self) -> Result<HashMap<CapabilityIdentity, CapabilityStorageItem>, StorageError> {
        let _guard = self.lock.lock();
        Ok(self.read()?.capabilities)
    }
}
