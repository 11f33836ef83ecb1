//! Persisted client-side key/value slots.
//!
//! Stand-in for browser local storage: the credential lives in one named
//! slot, and `clear()` wipes everything the backend holds.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::{debug, warn};

use super::token_store::ACCESS_TOKEN_SLOT;

/// Storage file name in the data directory
const STORAGE_FILE: &str = "storage.json";

/// Keychain service the keyring backend files entries under
const SERVICE_NAME: &str = "inspektor";

/// Keychain entry holding the JSON list of slots written under the service
const SLOT_INDEX: &str = "slot-index";

pub trait LocalStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove every slot.
    fn clear(&self) -> Result<()>;
}

macro_rules! forward_storage {
    ($ptr:ident) => {
        impl<T: LocalStorage + ?Sized> LocalStorage for $ptr<T> {
            fn get(&self, key: &str) -> Result<Option<String>> {
                (**self).get(key)
            }

            fn set(&self, key: &str, value: &str) -> Result<()> {
                (**self).set(key, value)
            }

            fn clear(&self) -> Result<()> {
                (**self).clear()
            }
        }
    };
}

forward_storage!(Arc);
forward_storage!(Box);

// ============================================================================
// File
// ============================================================================

/// Slots kept as a JSON object in a single file.
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(STORAGE_FILE),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_slots(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents =
            std::fs::read_to_string(&self.path).context("Failed to read storage file")?;
        serde_json::from_str(&contents).context("Failed to parse storage file")
    }

    fn write_slots(&self, slots: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(slots)?;
        std::fs::write(&self.path, contents).context("Failed to write storage file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl LocalStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_slots()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut slots = self.read_slots()?;
        slots.insert(key.to_string(), value.to_string());
        self.write_slots(&slots)
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = ?self.path, "Storage file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove storage file"),
        }
    }
}

// ============================================================================
// Keyring
// ============================================================================

/// Slots kept in the OS keychain, one entry per slot.
///
/// The keychain can't be enumerated, so the names of written slots are kept
/// in their own entry and `clear()` works across restarts.
pub struct KeyringStorage {
    service: String,
    index_lock: Mutex<()>,
}

/// Decode the persisted slot list. The credential slot is always included.
fn parse_slot_index(raw: Option<&str>) -> BTreeSet<String> {
    let mut slots: BTreeSet<String> = match raw.map(serde_json::from_str) {
        Some(Ok(slots)) => slots,
        Some(Err(e)) => {
            warn!(error = %e, "Keychain slot index unreadable, falling back to the credential slot");
            BTreeSet::new()
        }
        None => BTreeSet::new(),
    };
    slots.insert(ACCESS_TOKEN_SLOT.to_string());
    slots
}

impl KeyringStorage {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
            index_lock: Mutex::new(()),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read slot from keychain"),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete slot from keychain"),
        }
    }

    fn slot_index(&self) -> Result<BTreeSet<String>> {
        Ok(parse_slot_index(self.read(SLOT_INDEX)?.as_deref()))
    }
}

impl Default for KeyringStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStorage for KeyringStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.read(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.index_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut index = self.slot_index()?;
        if index.insert(key.to_string()) {
            self.entry(SLOT_INDEX)?
                .set_password(&serde_json::to_string(&index)?)
                .context("Failed to store keychain slot index")?;
        }
        self.entry(key)?
            .set_password(value)
            .context("Failed to store slot in keychain")
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.index_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let index = self.slot_index()?;
        for key in &index {
            self.delete(key)?;
        }
        self.delete(SLOT_INDEX)?;
        debug!(slots = index.len(), "Keychain slots removed");
        Ok(())
    }
}

// ============================================================================
// Memory
// ============================================================================

/// In-process slots; nothing survives the process.
#[derive(Default)]
pub struct MemoryStorage {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocalStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_storage_roundtrip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());

        assert_eq!(storage.get(ACCESS_TOKEN_SLOT).unwrap(), None);
        storage.set(ACCESS_TOKEN_SLOT, "a.b.c").unwrap();
        storage.set("theme", "dark").unwrap();
        assert_eq!(storage.get(ACCESS_TOKEN_SLOT).unwrap().as_deref(), Some("a.b.c"));

        // A fresh handle sees what the first one persisted
        let reopened = FileStorage::new(dir.path());
        assert_eq!(reopened.get("theme").unwrap().as_deref(), Some("dark"));

        storage.clear().unwrap();
        assert!(!storage.path().exists());
        assert_eq!(reopened.get(ACCESS_TOKEN_SLOT).unwrap(), None);
        assert_eq!(reopened.get("theme").unwrap(), None);
    }

    #[test]
    fn test_file_storage_clear_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(&dir.path().join("nested"));
        storage.clear().unwrap();
        storage.clear().unwrap();
    }

    #[test]
    fn test_file_storage_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        std::fs::write(storage.path(), "{not json").unwrap();
        assert!(storage.get(ACCESS_TOKEN_SLOT).is_err());
    }

    #[test]
    fn test_slot_index_lists_every_written_slot() {
        let written: BTreeSet<String> = ["theme".to_string(), "last-route".to_string()].into();
        let persisted = serde_json::to_string(&written).unwrap();

        // What a later process reads back from the keychain
        let reopened = parse_slot_index(Some(&persisted));
        assert!(reopened.contains("theme"));
        assert!(reopened.contains("last-route"));
        assert!(reopened.contains(ACCESS_TOKEN_SLOT));
    }

    #[test]
    fn test_slot_index_defaults_to_credential_slot() {
        let expected: BTreeSet<String> = [ACCESS_TOKEN_SLOT.to_string()].into();
        assert_eq!(parse_slot_index(None), expected);
        assert_eq!(parse_slot_index(Some("{not json")), expected);
    }

    #[test]
    fn test_memory_storage_clear_wipes_all_slots() {
        let storage = MemoryStorage::new();
        storage.set(ACCESS_TOKEN_SLOT, "x").unwrap();
        storage.set("other", "y").unwrap();
        assert_eq!(storage.len(), 2);
        storage.clear().unwrap();
        assert!(storage.is_empty());
    }
}
