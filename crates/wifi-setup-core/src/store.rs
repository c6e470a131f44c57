//! Credential storage abstraction.
//!
//! This module provides a trait for credential storage that can be
//! implemented differently on each platform:
//! - Linux: File-based storage (JSON document)
//! - ESP32: NVS (Non-Volatile Storage) namespace
//!
//! Exactly one set of credentials is stored. Writes are committed
//! synchronously: when `save` returns `Ok`, the record survives power loss.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use crate::model::Credentials;

/// Errors that can occur during credential storage operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No credentials are stored, or the stored name is empty.
    #[error("no credentials stored")]
    NotFound,

    /// The underlying store could not be opened, read or written.
    #[error("credential store access failed: {0}")]
    AccessFailure(String),
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::AccessFailure(err.to_string())
    }
}

/// Persistent store for a single set of network credentials.
///
/// All methods are synchronous to support embedded platforms.
pub trait CredentialStore: Send + Sync {
    /// Overwrite the stored credentials.
    fn save(&self, credentials: &Credentials) -> Result<(), StoreError>;

    /// Load the stored credentials.
    ///
    /// Returns [`StoreError::NotFound`] when nothing is stored or the stored
    /// network name is empty.
    fn load(&self) -> Result<Credentials, StoreError>;

    /// Delete the stored credentials. Clearing an empty store succeeds.
    fn clear(&self) -> Result<(), StoreError>;

    /// Check whether usable credentials are stored.
    ///
    /// Never fails: any read error collapses to `false`.
    fn has_credentials(&self) -> bool {
        self.load().map(|creds| creds.is_present()).unwrap_or(false)
    }
}

/// In-memory credential store.
///
/// Used by tests and by the host simulator when no file is configured.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Credentials>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with credentials.
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            slot: Mutex::new(Some(credentials)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(credentials.clone());
        Ok(())
    }

    fn load(&self) -> Result<Credentials, StoreError> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(creds) if creds.is_present() => Ok(creds.clone()),
            _ => Err(StoreError::NotFound),
        }
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
        Ok(())
    }
}

/// File-backed credential store.
///
/// The record is a small JSON document `{"ssid": ..., "password": ...}`.
/// Saves write a sibling temporary file, flush it to disk and rename it
/// over the record so a power cut never leaves a half-written file.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Create a store backed by the file at `path`. The file need not exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the record on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CredentialStore for FileCredentialStore {
    fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let payload = serde_json::to_vec_pretty(credentials)
            .map_err(|e| StoreError::AccessFailure(e.to_string()))?;

        let temp = self.temp_path();
        let mut file = fs::File::create(&temp)?;
        file.write_all(&payload)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn load(&self) -> Result<Credentials, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StoreError::NotFound),
            Err(e) => return Err(e.into()),
        };

        let creds: Credentials = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::AccessFailure(format!("corrupt record: {}", e)))?;

        if creds.is_present() {
            Ok(creds)
        } else {
            Err(StoreError::NotFound)
        }
    }

    fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn home() -> Credentials {
        Credentials::new("Home", "secret123").unwrap()
    }

    #[test]
    fn test_memory_round_trip() {
        let store = MemoryCredentialStore::new();
        assert!(!store.has_credentials());
        assert_eq!(store.load(), Err(StoreError::NotFound));

        store.save(&home()).unwrap();
        assert!(store.has_credentials());
        assert_eq!(store.load().unwrap(), home());

        store.clear().unwrap();
        assert!(!store.has_credentials());
        assert_eq!(store.load(), Err(StoreError::NotFound));
    }

    #[test]
    fn test_memory_overwrite() {
        let store = MemoryCredentialStore::with_credentials(home());
        let office = Credentials::new("Office", "").unwrap();
        store.save(&office).unwrap();
        assert_eq!(store.load().unwrap(), office);
    }

    #[test]
    fn test_empty_ssid_counts_as_absent() {
        let store = MemoryCredentialStore::with_credentials(Credentials {
            ssid: String::new(),
            password: "orphan".to_string(),
        });
        assert!(!store.has_credentials());
        assert_eq!(store.load(), Err(StoreError::NotFound));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("wifi.json"));

        assert_eq!(store.load(), Err(StoreError::NotFound));
        store.save(&home()).unwrap();

        // A second handle on the same path sees the committed record.
        let reopened = FileCredentialStore::new(store.path());
        assert_eq!(reopened.load().unwrap(), home());
        assert!(reopened.has_credentials());

        reopened.clear().unwrap();
        assert!(!store.has_credentials());
        assert_eq!(store.load(), Err(StoreError::NotFound));

        // Clearing twice is not an error.
        store.clear().unwrap();
    }

    #[test]
    fn test_file_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wifi.json");
        fs::write(&path, b"{not json").unwrap();

        let store = FileCredentialStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::AccessFailure(_))));
        assert!(!store.has_credentials());
    }

    #[test]
    fn test_file_unreadable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("missing").join("wifi.json"));

        assert!(matches!(store.save(&home()), Err(StoreError::AccessFailure(_))));
        assert!(!store.has_credentials());
    }
}
