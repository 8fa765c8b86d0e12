// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Key-value persistence for guard state.
//!
//! State is stored as two independent JSON blobs: the counter map under
//! [`COUNTERS_KEY`] and the block set under [`BLOCKED_KEY`]. The host picks
//! the backing store; [`MemoryStore`] and [`FileStore`] are provided.

use crate::error::{GuardError, PersistenceError};
use crate::guard::RateGuard;
use crate::store::CounterEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Key holding the counter map.
pub const COUNTERS_KEY: &str = "rate_guard_ip_log";

/// Key holding the block set.
pub const BLOCKED_KEY: &str = "rate_guard_blocked_ips";

/// Exported guard state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardSnapshot {
    /// Counter entries keyed by IP
    pub counters: HashMap<String, CounterEntry>,
    /// Blocked IPs
    pub blocked: Vec<String>,
}

/// Minimal string key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value under `key`, or `None` if it was never written.
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

/// Load both collections. Missing keys read as empty collections.
pub fn load_snapshot(store: &dyn KeyValueStore) -> Result<GuardSnapshot, PersistenceError> {
    let counters = match store.get(COUNTERS_KEY)? {
        Some(raw) => decode(COUNTERS_KEY, &raw)?,
        None => HashMap::new(),
    };
    let blocked = match store.get(BLOCKED_KEY)? {
        Some(raw) => decode(BLOCKED_KEY, &raw)?,
        None => Vec::new(),
    };

    Ok(GuardSnapshot { counters, blocked })
}

/// Write both collections.
pub fn save_snapshot(
    store: &dyn KeyValueStore,
    snapshot: &GuardSnapshot,
) -> Result<(), PersistenceError> {
    store.put(COUNTERS_KEY, &encode(COUNTERS_KEY, &snapshot.counters)?)?;
    store.put(BLOCKED_KEY, &encode(BLOCKED_KEY, &snapshot.blocked)?)?;
    Ok(())
}

/// Save `guard` to `store` if it changed since revision `last_saved`.
///
/// The write runs on the blocking pool so request handling never waits on
/// storage. Returns the revision now on disk.
pub async fn flush_if_changed(
    guard: Arc<RateGuard>,
    store: Arc<dyn KeyValueStore>,
    last_saved: u64,
) -> Result<u64, GuardError> {
    if guard.revision() == last_saved {
        return Ok(last_saved);
    }

    tokio::task::spawn_blocking(move || guard.persist(store.as_ref()))
        .await
        .map_err(|e| PersistenceError::Backend(format!("flush task failed: {}", e)))?
}

fn decode<T: for<'de> Deserialize<'de>>(key: &str, raw: &str) -> Result<T, PersistenceError> {
    serde_json::from_str(raw).map_err(|source| PersistenceError::Serialization {
        key: key.to_string(),
        source,
    })
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<String, PersistenceError> {
    serde_json::to_string(value).map_err(|source| PersistenceError::Serialization {
        key: key.to_string(),
        source,
    })
}

/// In-process store, mainly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory.
///
/// Writes go through a temporary file and a rename, so readers never see a
/// partially written blob. Each write uses its own temporary file, so
/// concurrent writers of one key never share one.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    writes: AtomicU64,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writes: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(PersistenceError::Backend(format!(
                "key {:?} is not a valid file name",
                key
            )));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;

        let seq = self.writes.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{}.{}.tmp", std::process::id(), seq));
        if let Err(e) = fs::write(&tmp, value).and_then(|()| fs::rename(&tmp, &path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!(path = %path.display(), bytes = value.len(), "Wrote state blob");
        Ok(())
    }
}
