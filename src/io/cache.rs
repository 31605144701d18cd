//! Cache of the last successfully parsed dataset.
//!
//! A single entry lives under a fixed key in a key-value store. The entry is
//! overwritten wholesale on every successful fetch and considered stale once
//! `now - timestamp` exceeds the configured TTL. Storage failures and corrupt
//! entries read as a miss; the caller then fetches fresh data.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::Record;
use crate::io::ingest::latest_date;

/// Key of the dataset entry.
pub const CACHE_KEY: &str = "covid-trends/dataset";

/// Default time-to-live of a cache entry.
pub const DEFAULT_TTL_MINUTES: i64 = 60;

/// Errors from the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Returned when the cache directory cannot be created.
    #[error("cannot create cache directory {path}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Returned when a stored value exists but cannot be read.
    #[error("cannot read cache file {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Returned when a value cannot be written or replaced.
    #[error("cannot write cache file {path}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Returned when a stored entry is not valid JSON for `CacheEntry`.
    #[error("corrupt cache entry under key {key}")]
    Corrupt {
        key: String,
        source: serde_json::Error,
    },

    /// Returned when an entry cannot be encoded.
    #[error("cannot encode cache entry")]
    Encode { source: serde_json::Error },
}

/// Minimal string key-value storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::Read { path, source }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(|source| CacheError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        // Write beside the target and rename so readers never see half an entry.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|source| CacheError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| CacheError::Write { path, source })
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Write { path, source }),
        }
    }
}

/// In-process store, used by tests and `--offline` dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// The cached dataset and when it was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub timestamp: DateTime<Utc>,
    pub latest_date: Option<NaiveDate>,
    /// Columns that were kept when `data` was parsed.
    pub fields: Vec<String>,
    pub data: Vec<Record>,
}

impl CacheEntry {
    pub fn new(data: Vec<Record>, fields: Vec<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            latest_date: latest_date(&data),
            fields,
            data,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        is_stale(self, now, ttl)
    }

    /// Whether the entry was parsed with every column in `needed`.
    pub fn covers(&self, needed: &[String]) -> bool {
        needed.iter().all(|n| self.fields.iter().any(|f| f == n))
    }
}

/// `true` when strictly more than `ttl` has passed since `entry.timestamp`.
pub fn is_stale(entry: &CacheEntry, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
    now - entry.timestamp > ttl
}

/// Typed access to the dataset entry of a [`KeyValueStore`].
#[derive(Debug)]
pub struct Cache<S> {
    store: S,
    key: String,
}

impl<S: KeyValueStore> Cache<S> {
    pub fn new(store: S) -> Self {
        Self::with_key(store, CACHE_KEY)
    }

    pub fn with_key(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Read the entry. Storage errors and corrupt entries count as a miss.
    pub fn get(&self) -> Option<CacheEntry> {
        let text = match self.store.get(&self.key) {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!(key = %self.key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "cache unavailable; treating as miss");
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry>(&text) {
            Ok(entry) => {
                debug!(key = %self.key, rows = entry.data.len(), timestamp = %entry.timestamp, "cache hit");
                Some(entry)
            }
            Err(source) => {
                let e = CacheError::Corrupt {
                    key: self.key.clone(),
                    source,
                };
                warn!(error = %e, "ignoring cache entry");
                None
            }
        }
    }

    /// Replace the entry.
    pub fn set(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let text = serde_json::to_string(entry).map_err(|source| CacheError::Encode { source })?;
        self.store.set(&self.key, &text)?;
        debug!(key = %self.key, rows = entry.data.len(), "cache written");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        self.store.remove(&self.key)
    }
}
