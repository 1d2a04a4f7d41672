//! Durable Backing Store Module
//!
//! Synchronous, size-limited key-value stores holding JSON text. A cache
//! persists its whole mapping into a single slot of one of these.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use directories::ProjectDirs;
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Default size limit, matching the usual per-origin browser allowance.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Slot-addressed text store.
///
/// Methods take `&self`: a store is shared by every cache that points at it,
/// so implementations use interior mutability.
pub trait DurableStore: Send + Sync + fmt::Debug {
    /// Reads a slot. `Ok(None)` when the slot was never written.
    fn get_item(&self, key: &str) -> StorageResult<Option<String>>;

    /// Replaces a slot's contents.
    fn set_item(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Deletes a slot. Removing a missing slot is not an error.
    fn remove_item(&self, key: &str) -> StorageResult<()>;
}

// == Memory Store ==
/// In-process store. Clones share the same slots, so two caches built on
/// clones of one store see each other's writes, like two pages on one origin.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    slots: Arc<Mutex<HashMap<String, String>>>,
    quota: Option<usize>,
    available: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an unlimited store.
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            quota: None,
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Creates a store whose total key + value bytes may not exceed `quota`.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Self::new()
        }
    }

    /// Turns the store on or off. While off every call fails with
    /// `StorageError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Raw slot contents, bypassing availability.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.slots
            .lock()
            .ok()
            .and_then(|slots| slots.get(key).cloned())
    }

    fn slots(&self) -> StorageResult<MutexGuard<'_, HashMap<String, String>>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "memory store is disabled".to_string(),
            ));
        }
        self.slots
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl DurableStore for MemoryStore {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.slots()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut slots = self.slots()?;

        if let Some(limit) = self.quota {
            let others: usize = slots
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > limit {
                return Err(StorageError::QuotaExceeded { needed, limit });
            }
        }

        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.slots()?.remove(key);
        Ok(())
    }
}

// == File Store ==
/// Directory-backed store: one `<slot>.json` file per slot.
///
/// The quota covers every slot file in the directory. Writes go to a temp
/// file first and are renamed into place, so a crash mid-write leaves the
/// previous contents intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    quota: usize,
}

impl FileStore {
    /// Creates a store rooted at `dir` with the default quota. The directory
    /// is created lazily on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            quota: DEFAULT_QUOTA_BYTES,
        }
    }

    /// Overrides the size limit.
    pub fn with_quota(mut self, quota: usize) -> Self {
        self.quota = quota;
        self
    }

    /// Per-user cache directory (`~/.cache/storefront-cache` on Linux), if
    /// the platform has one.
    pub fn default_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "storefront-cache").map(|dirs| dirs.cache_dir().to_path_buf())
    }

    /// Directory holding the slot files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`. The name is percent-encoded, so distinct keys
    /// always map to distinct files and never escape the directory.
    pub fn slot_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }

    /// Bytes used by every slot file except `exclude`.
    fn used_bytes(&self, exclude: &Path) -> StorageResult<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        let mut total = 0usize;
        for entry in entries {
            let path = entry?.path();
            if path == exclude || path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            total += fs::metadata(&path)?.len() as usize;
        }
        Ok(total)
    }
}

impl DurableStore for FileStore {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        match fs::read_to_string(self.slot_path(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.slot_path(key);
        let needed = self.used_bytes(&path)? + value.len();
        if needed > self.quota {
            return Err(StorageError::QuotaExceeded {
                needed,
                limit: self.quota,
            });
        }

        fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;

        debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        match fs::remove_file(self.slot_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
