//! Application configuration management.
//!
//! This module handles loading and saving the configuration, which holds the
//! backend project URL and key, the session storage backend, and the timing
//! knobs of the session core.
//!
//! Configuration is stored at `~/.config/workpass/config.json`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::monitor::DEFAULT_MONITOR_INTERVAL_MINUTES;
use crate::auth::policy::{RequestPolicy, DEFAULT_BACKOFF_MS, DEFAULT_RETRIES, DEFAULT_TIMEOUT_SECS};
use crate::auth::validator::DEFAULT_REFRESH_THRESHOLD_MINUTES;
use crate::auth::{FileStore, KeyringStore, MemoryStore, SealedFileStore, SessionStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "workpass";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Upper bounds applied to the timing knobs. A day covers any sane
/// threshold or interval; larger values are treated as typos.
const MAX_SCHEDULE_MINUTES: u64 = 24 * 60;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 5 * 60;
const MAX_REQUEST_RETRIES: u32 = 10;

pub const ENV_SUPABASE_URL: &str = "WORKPASS_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "WORKPASS_SUPABASE_ANON_KEY";
pub const ENV_SESSION_PASSPHRASE: &str = "WORKPASS_SESSION_PASSPHRASE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Plain JSON file in the cache directory
    #[default]
    File,
    /// JSON file sealed with a passphrase-derived key
    Sealed,
    /// OS keychain
    Keyring,
    /// Nothing persisted across runs
    Memory,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub last_email: Option<String>,
    pub storage: StorageBackend,
    pub refresh_threshold_minutes: i64,
    pub monitor_interval_minutes: u64,
    pub request_timeout_secs: u64,
    pub request_retries: u32,
    /// Only read from the environment; never written to disk
    #[serde(skip)]
    pub session_passphrase: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_anon_key: None,
            last_email: None,
            storage: StorageBackend::default(),
            refresh_threshold_minutes: DEFAULT_REFRESH_THRESHOLD_MINUTES,
            monitor_interval_minutes: DEFAULT_MONITOR_INTERVAL_MINUTES,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            request_retries: DEFAULT_RETRIES,
            session_passphrase: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("supabase_url", &self.supabase_url)
            .field("supabase_anon_key", &self.supabase_anon_key.as_ref().map(|_| "<set>"))
            .field("last_email", &self.last_email)
            .field("storage", &self.storage)
            .field("refresh_threshold_minutes", &self.refresh_threshold_minutes)
            .field("monitor_interval_minutes", &self.monitor_interval_minutes)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("request_retries", &self.request_retries)
            .field("session_passphrase", &self.session_passphrase.as_ref().map(|_| "<set>"))
            .finish()
    }
}

/// Timing knobs of the session core, derived from [`Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub refresh_threshold: chrono::Duration,
    pub monitor_interval: Duration,
    pub policy: RequestPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Config::default().session_settings()
    }
}

impl Config {
    /// Load the config file (defaults if absent) and apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `WORKPASS_*` overrides from `lookup`. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get(ENV_SUPABASE_URL) {
            self.supabase_url = Some(url);
        }
        if let Some(key) = get(ENV_SUPABASE_ANON_KEY) {
            self.supabase_anon_key = Some(key);
        }
        if let Some(passphrase) = get(ENV_SESSION_PASSPHRASE) {
            self.session_passphrase = Some(passphrase);
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Backend URL and key, or an error naming what is missing
    pub fn backend(&self) -> Result<(&str, &str)> {
        let url = self
            .supabase_url
            .as_deref()
            .ok_or_else(|| anyhow!("Backend URL not configured (set {})", ENV_SUPABASE_URL))?;
        let key = self.supabase_anon_key.as_deref().ok_or_else(|| {
            anyhow!("Backend key not configured (set {})", ENV_SUPABASE_ANON_KEY)
        })?;
        Ok((url, key))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            refresh_threshold: chrono::Duration::minutes(
                self.refresh_threshold_minutes.clamp(0, MAX_SCHEDULE_MINUTES as i64),
            ),
            monitor_interval: Duration::from_secs(
                self.monitor_interval_minutes.clamp(1, MAX_SCHEDULE_MINUTES) * 60,
            ),
            policy: RequestPolicy {
                timeout: Duration::from_secs(
                    self.request_timeout_secs.clamp(1, MAX_REQUEST_TIMEOUT_SECS),
                ),
                retries: self.request_retries.min(MAX_REQUEST_RETRIES),
                backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
            },
        }
    }

    /// Open the configured session store under `cache_dir`
    pub fn session_store(&self, cache_dir: PathBuf) -> Result<Arc<dyn SessionStore>> {
        Ok(match self.storage {
            StorageBackend::File => Arc::new(FileStore::new(cache_dir)),
            StorageBackend::Sealed => {
                let passphrase = self.session_passphrase.clone().ok_or_else(|| {
                    anyhow!("Sealed storage needs a passphrase (set {})", ENV_SESSION_PASSPHRASE)
                })?;
                Arc::new(SealedFileStore::new(cache_dir, passphrase)?)
            }
            StorageBackend::Keyring => Arc::new(KeyringStore::new()?),
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        })
    }
}
