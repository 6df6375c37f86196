//! Fingerprint-addressed artifact cache
//!
//! The table is split into shards selected by the first fingerprint byte, so
//! workers storing different artifacts rarely touch the same lock. Storing an
//! equal artifact twice is a no-op; storing different content under an
//! existing fingerprint replaces it and logs a warning.

use crate::error::{BuildError, BuildResult};
use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Schema version of the on-disk index. Bump when the format changes.
const INDEX_VERSION: u32 = 1;

/// Index file name within the cache directory
pub const INDEX_FILE: &str = "cache-index.json";

const SHARD_COUNT: usize = 16;

/// A file produced by a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    /// Digest of the file content
    pub digest: Fingerprint,
    pub size: u64,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>, content: &[u8]) -> Self {
        Self {
            path: path.into(),
            digest: Fingerprint::of(content),
            size: content.len() as u64,
        }
    }

    /// Describe a file that already exists on disk
    pub fn from_file(path: impl Into<PathBuf>) -> BuildResult<Self> {
        let path = path.into();
        let content = fs::read(&path).map_err(|e| BuildError::io(&path, e))?;
        Ok(Self::new(path, &content))
    }

    pub fn same_content(&self, other: &Artifact) -> bool {
        self.digest == other.digest && self.size == other.size
    }

    /// The same content at another location
    pub fn with_path(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }

    /// Whether the file at `path` still holds the recorded content
    pub fn matches_file(&self) -> bool {
        match fs::metadata(&self.path) {
            Ok(meta) if meta.len() == self.size => {}
            _ => return false,
        }
        fs::read(&self.path).is_ok_and(|content| Fingerprint::of(&content) == self.digest)
    }
}

/// A stored artifact and when it was stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub artifact: Artifact,
    pub stored_at: DateTime<Utc>,
}

/// Result of [`ArtifactCache::store`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// No entry existed for the fingerprint
    Inserted,
    /// An entry with equal content existed; nothing changed
    Unchanged,
    /// An entry with different content existed and was replaced
    Replaced,
}

/// Cache counters since the cache was created or opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
}

#[derive(Serialize, Deserialize)]
struct CacheIndex {
    version: u32,
    entries: BTreeMap<Fingerprint, CacheEntry>,
}

type Shard = RwLock<HashMap<Fingerprint, CacheEntry>>;

/// Concurrent map from task fingerprint to artifact
#[derive(Debug)]
pub struct ArtifactCache {
    shards: Vec<Shard>,
    /// Set when the cache is backed by a directory
    dir: Option<PathBuf>,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
}

impl ArtifactCache {
    /// Empty in-memory cache
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
            dir: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stores: AtomicU64::new(0),
        }
    }

    /// Open the cache stored in `dir`, creating the directory if needed
    ///
    /// A missing, corrupt or outdated index starts an empty cache.
    pub fn open(dir: impl Into<PathBuf>) -> BuildResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| BuildError::io(&dir, e))?;

        let mut cache = Self::new();
        let index_path = dir.join(INDEX_FILE);
        if index_path.exists() {
            let data = fs::read_to_string(&index_path).map_err(|e| BuildError::io(&index_path, e))?;
            match serde_json::from_str::<CacheIndex>(&data) {
                Ok(index) if index.version == INDEX_VERSION => {
                    for (fingerprint, entry) in index.entries {
                        cache.shard_mut(&fingerprint).insert(fingerprint, entry);
                    }
                }
                Ok(index) => {
                    tracing::warn!(
                        "Ignoring cache index version {} (expected {})",
                        index.version,
                        INDEX_VERSION
                    );
                }
                Err(e) => {
                    tracing::warn!("Ignoring unreadable cache index {}: {}", index_path.display(), e);
                }
            }
        }

        tracing::debug!("Opened cache at {} with {} entries", dir.display(), cache.len());
        cache.dir = Some(dir);
        Ok(cache)
    }

    fn shard(&self, fingerprint: &Fingerprint) -> &Shard {
        &self.shards[fingerprint.shard_byte() as usize % SHARD_COUNT]
    }

    fn shard_mut(&mut self, fingerprint: &Fingerprint) -> &mut HashMap<Fingerprint, CacheEntry> {
        self.shards[fingerprint.shard_byte() as usize % SHARD_COUNT]
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Artifact stored for `fingerprint`
    ///
    /// For a directory-backed cache an entry whose file has disappeared, or
    /// no longer holds the recorded content, is a miss.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<Artifact> {
        let stored = self
            .shard(fingerprint)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fingerprint)
            .map(|entry| entry.artifact.clone());

        let found = stored.filter(|artifact| {
            if self.dir.is_none() || artifact.matches_file() {
                return true;
            }
            tracing::debug!(
                "{} no longer matches cache entry {}",
                artifact.path.display(),
                fingerprint.short()
            );
            false
        });

        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Record `artifact` as the output of `fingerprint`
    pub fn store(&self, fingerprint: Fingerprint, artifact: Artifact) -> StoreOutcome {
        let mut shard = self.shard(&fingerprint).write().unwrap_or_else(PoisonError::into_inner);

        let outcome = match shard.get(&fingerprint) {
            Some(existing) if existing.artifact.same_content(&artifact) => return StoreOutcome::Unchanged,
            Some(existing) => {
                tracing::warn!(
                    "Different output for identical inputs {} ({} -> {}); replacing cached artifact",
                    fingerprint.short(),
                    existing.artifact.digest.short(),
                    artifact.digest.short()
                );
                StoreOutcome::Replaced
            }
            None => StoreOutcome::Inserted,
        };

        shard.insert(
            fingerprint,
            CacheEntry {
                artifact,
                stored_at: Utc::now(),
            },
        );
        self.stores.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
        }
    }

    /// Backing directory, if any
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Write the index to the backing directory; a no-op for in-memory caches
    pub fn persist(&self) -> BuildResult<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        let mut entries = BTreeMap::new();
        for shard in &self.shards {
            let shard = shard.read().unwrap_or_else(PoisonError::into_inner);
            entries.extend(shard.iter().map(|(fp, entry)| (*fp, entry.clone())));
        }
        let index = CacheIndex {
            version: INDEX_VERSION,
            entries,
        };
        let json = serde_json::to_string_pretty(&index).map_err(BuildError::cache)?;

        // Temp file then rename; readers never see a partial index
        let index_path = dir.join(INDEX_FILE);
        let tmp_path = dir.join(format!("{}.tmp", INDEX_FILE));
        fs::write(&tmp_path, json).map_err(|e| BuildError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &index_path).map_err(|e| BuildError::io(&index_path, e))?;

        tracing::debug!("Persisted {} cache entries to {}", index.entries.len(), index_path.display());
        Ok(())
    }
}

impl Default for ArtifactCache {
    fn default() -> Self {
        Self::new()
    }
}
