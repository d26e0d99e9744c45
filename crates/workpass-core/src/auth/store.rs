//! Persistence of the single `SessionRecord` of this installation.
//!
//! All stores keep the record under one fixed key (a file name or a
//! keychain entry); saving overwrites whatever was there.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::{debug, warn};

use super::SessionRecord;

/// Session file name in cache directory
pub const SESSION_FILE: &str = "session.json";

/// Keychain service name
const KEYRING_SERVICE: &str = "workpass";

/// Keychain entry holding the session JSON
const KEYRING_KEY: &str = "session";

pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<SessionRecord>>;
    fn save(&self, record: &SessionRecord) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Write a file by persisting a sibling temp file over it, so readers never
/// see a half-written session.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory {}", parent.display()))?;

    let mut temp_file =
        tempfile::NamedTempFile::new_in(parent).context("Failed to create temp file")?;
    temp_file
        .write_all(contents)
        .context("Failed to write to temp file")?;
    temp_file
        .persist(path)
        .context("Failed to persist temp file")?;
    Ok(())
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

// ============================================================================
// Plain JSON file
// ============================================================================

pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            path: cache_dir.join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileStore {
    fn load(&self) -> Result<Option<SessionRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents =
            std::fs::read_to_string(&self.path).context("Failed to read session file")?;
        match serde_json::from_str(&contents) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable session file");
                Ok(None)
            }
        }
    }

    fn save(&self, record: &SessionRecord) -> Result<()> {
        let contents = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.path, &contents)?;
        debug!(path = %self.path.display(), "Session saved");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        remove_if_exists(&self.path)
    }
}

// ============================================================================
// OS keychain
// ============================================================================

pub struct KeyringStore {
    entry: Entry,
}

impl KeyringStore {
    pub fn new() -> Result<Self> {
        Self::with_service(KEYRING_SERVICE)
    }

    /// Use a different keychain service, e.g. one per backend project
    pub fn with_service(service: &str) -> Result<Self> {
        let entry = Entry::new(service, KEYRING_KEY).context("Failed to create keyring entry")?;
        Ok(Self { entry })
    }
}

impl SessionStore for KeyringStore {
    fn load(&self) -> Result<Option<SessionRecord>> {
        let json = match self.entry.get_password() {
            Ok(json) => json,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(e).context("Failed to read session from keychain"),
        };
        match serde_json::from_str(&json) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable session in keychain");
                Ok(None)
            }
        }
    }

    fn save(&self, record: &SessionRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.entry
            .set_password(&json)
            .context("Failed to store session in keychain")
    }

    fn clear(&self) -> Result<()> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}

// ============================================================================
// In memory
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    record: Mutex<Option<SessionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn load(&self) -> Result<Option<SessionRecord>> {
        Ok(self.record.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, record: &SessionRecord) -> Result<()> {
        *self.record.lock().unwrap_or_else(|e| e.into_inner()) = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.record.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

// ============================================================================
// Vault
// ============================================================================

/// Single point of access to the session store.
///
/// Writers are serialized, and the `*_if_current` writes only apply while
/// the stored record still carries the refresh token the caller started
/// from. A refresh that completes after a sign-out or a newer sign-in is
/// therefore dropped instead of resurrecting an old session.
pub struct SessionVault {
    store: Arc<dyn SessionStore>,
    write_lock: tokio::sync::Mutex<()>,
}

impl SessionVault {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn load(&self) -> Result<Option<SessionRecord>> {
        self.store.load()
    }

    pub async fn save(&self, record: &SessionRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store.save(record)
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store.clear()
    }

    /// Overwrite the stored record if it is still the one identified by
    /// `expected_refresh_token`. Returns whether the write happened.
    pub async fn replace_if_current(
        &self,
        expected_refresh_token: &str,
        record: &SessionRecord,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        if !self.is_current(expected_refresh_token)? {
            return Ok(false);
        }
        self.store.save(record)?;
        Ok(true)
    }

    /// Delete the stored record if it is still the one identified by
    /// `expected_refresh_token`. Returns whether the delete happened.
    pub async fn clear_if_current(&self, expected_refresh_token: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        if !self.is_current(expected_refresh_token)? {
            return Ok(false);
        }
        self.store.clear()?;
        Ok(true)
    }

    fn is_current(&self, expected_refresh_token: &str) -> Result<bool> {
        Ok(self
            .store
            .load()?
            .is_some_and(|r| r.refresh_token == expected_refresh_token))
    }
}
