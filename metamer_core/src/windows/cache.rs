//! Window bank cache
//!
//! Building windows at large resolutions is the slowest part of model
//! construction, so banks are memoized in an in-process LRU and, when a
//! directory is configured, persisted as versioned bincode files. Entries are
//! keyed by [`cache_key`], a pure function of the construction parameters.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use lru::LruCache;
use serde::{Deserialize, Serialize};

use super::{WindowBank, WindowParams, WindowType};
use crate::checkpoint::{self, Checkpointable};
use crate::error::MetamerResult;

/// Default number of banks kept in memory.
pub const DEFAULT_MEMORY_CAPACITY: usize = 8;

/// File stem identifying a bank. Two parameter sets map to the same key only
/// if they are equal.
pub fn cache_key(params: &WindowParams) -> String {
    let (h, w) = params.image_resolution;
    let window = match params.window_type {
        WindowType::Cosine {
            transition_region_width,
        } => format!("cosine-t{transition_region_width}"),
        WindowType::Gaussian { std_dev } => format!("gaussian-s{std_dev}"),
    };
    format!(
        "scaling-{}_size-{h}x{w}_e0-{}_em-{}_scales-{}_{window}",
        params.scaling, params.min_eccentricity, params.max_eccentricity, params.num_scales
    )
}

/// Counters describing how requests were served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    /// Disk entries that were unreadable or stale and got rebuilt.
    pub corrupt_entries: u64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.memory_hits + self.disk_hits
    }

    /// Fraction of requests served without building, in `[0, 1]`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

/// Shared handle passed to model constructors.
pub struct WindowCache {
    dir: Option<PathBuf>,
    memory: Mutex<LruCache<String, Arc<WindowBank>>>,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    corrupt_entries: AtomicU64,
}

impl Default for WindowCache {
    fn default() -> Self {
        Self::in_memory(DEFAULT_MEMORY_CAPACITY)
    }
}

impl std::fmt::Debug for WindowCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowCache")
            .field("dir", &self.dir)
            .field("stats", &self.stats())
            .finish()
    }
}

impl WindowCache {
    /// Cache that only memoizes within this process.
    pub fn in_memory(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            dir: None,
            memory: Mutex::new(LruCache::new(capacity)),
            memory_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            corrupt_entries: AtomicU64::new(0),
        }
    }

    /// Cache backed by files under `dir`. The directory is created on the
    /// first write.
    pub fn with_dir(dir: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            dir: Some(dir.into()),
            ..Self::in_memory(capacity)
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Location of the disk entry for `params`, if a directory is configured.
    pub fn entry_path(&self, params: &WindowParams) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.bin", cache_key(params))))
    }

    /// Returns the bank for `params`, building and persisting it on a miss.
    ///
    /// Invalid parameters fail before the cache is consulted. A corrupt or
    /// stale disk entry is logged, rebuilt and overwritten.
    pub fn load_or_build(&self, params: &WindowParams) -> MetamerResult<Arc<WindowBank>> {
        params.validate()?;
        let key = cache_key(params);

        if let Some(bank) = self.lock().get(&key).cloned() {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(bank);
        }

        let path = self.entry_path(params);
        if let Some(path) = path.as_deref().filter(|p| p.exists()) {
            match checkpoint::load_bank_for(path, params) {
                Ok(bank) => {
                    self.disk_hits.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(path = %path.display(), "window bank loaded from cache");
                    return Ok(self.remember(key, bank));
                }
                Err(err) => {
                    self.corrupt_entries.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %err, "discarding window cache entry");
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let bank = WindowBank::build(params)?;
        if let Some(path) = path {
            bank.save_checkpoint(&path)?;
            tracing::debug!(path = %path.display(), "window bank written to cache");
        }
        Ok(self.remember(key, bank))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            corrupt_entries: self.corrupt_entries.load(Ordering::Relaxed),
        }
    }

    /// Drops in-memory entries. Disk entries are left alone.
    pub fn clear_memory(&self) {
        self.lock().clear();
    }

    pub fn memory_len(&self) -> usize {
        self.lock().len()
    }

    fn remember(&self, key: String, bank: WindowBank) -> Arc<WindowBank> {
        let bank = Arc::new(bank);
        self.lock().put(key, Arc::clone(&bank));
        bank
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, Arc<WindowBank>>> {
        self.memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
