//! Persistence of the active account
//!
//! The store is read once at construction and written only when the
//! registration controller commits new credentials.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{SoftphoneError, SoftphoneResult};
use crate::registration::Credentials;

/// Where account credentials live between runs
pub trait CredentialStore: Send + Sync {
    /// Load the stored account, `None` when nothing was saved yet
    fn load(&self) -> SoftphoneResult<Option<Credentials>>;

    /// Replace the stored account
    fn save(&self, credentials: &Credentials) -> SoftphoneResult<()>;
}

/// JSON file on disk
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for JsonFileStore {
    fn load(&self) -> SoftphoneResult<Option<Credentials>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        let credentials = serde_json::from_str(&content)?;
        Ok(Some(credentials))
    }

    fn save(&self, credentials: &Credentials) -> SoftphoneResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(credentials)?;

        // Write next to the target, then rename over it
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!(path = %self.path.display(), "Saved account credentials");
        Ok(())
    }
}

/// Volatile store, used by tests and by softphones without persistence
#[derive(Debug, Default)]
pub struct MemoryStore {
    credentials: Mutex<Option<Credentials>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self { credentials: Mutex::new(Some(credentials)) }
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> SoftphoneResult<Option<Credentials>> {
        let guard = self
            .credentials
            .lock()
            .map_err(|_| SoftphoneError::credential_store("memory store lock poisoned"))?;
        Ok(guard.clone())
    }

    fn save(&self, credentials: &Credentials) -> SoftphoneResult<()> {
        let mut guard = self
            .credentials
            .lock()
            .map_err(|_| SoftphoneError::credential_store("memory store lock poisoned"))?;
        *guard = Some(credentials.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uri::SipUri;

    fn sample() -> Credentials {
        Credentials {
            user: "alice".to_string(),
            domain: "example.com".to_string(),
            password: "secret".to_string(),
            outbound_proxy: Some(SipUri::parse("sip:proxy.example.com;lr").unwrap()),
        }
    }

    #[test]
    fn test_json_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("account.json"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_json_store_persists_account() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("account.json");
        let store = JsonFileStore::new(&path);

        store.save(&sample()).unwrap();
        assert!(path.exists());

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.load().unwrap(), Some(sample()));
    }

    #[test]
    fn test_json_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("account.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert_eq!(err.category(), "persistence");
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.load().unwrap(), None);
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample()));
    }
}
