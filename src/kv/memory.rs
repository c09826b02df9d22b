//! In-process key-value store with optional file persistence.
//!
//! Entries live in a `DashMap` so readers never block each other. TTLs are
//! checked lazily on read. When opened with a path, [`MemoryStore::flush`]
//! writes an lz4-compressed bincode snapshot and [`MemoryStore::open`] reads
//! it back, dropping entries that expired in between.

use crate::error::{KvError, KvResult};
use crate::kv::{KeyValueStore, glob_match};
use async_trait::async_trait;
use bincode::{Decode, Encode};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    /// Expiry as unix epoch milliseconds.
    expires_at: Option<i64>,
}

impl Entry {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Encode, Decode)]
struct SnapshotEntry {
    key: String,
    value: Vec<u8>,
    expires_at: Option<i64>,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    /// Creates an empty, non-persistent store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a store backed by a snapshot file. A missing file yields an empty store.
    pub fn open(path: impl AsRef<Path>) -> KvResult<Self> {
        let path = path.as_ref().to_path_buf();
        let store = Self {
            entries: DashMap::new(),
            path: Some(path.clone()),
        };
        if !path.exists() {
            return Ok(store);
        }

        let compressed = std::fs::read(&path)?;
        let raw = lz4_flex::decompress_size_prepended(&compressed)
            .map_err(|e| KvError::Corrupted(e.to_string()))?;
        let (snapshot, _): (Vec<SnapshotEntry>, usize) =
            bincode::decode_from_slice(&raw, bincode::config::standard())
                .map_err(|e| KvError::Corrupted(e.to_string()))?;

        let now = now_millis();
        for item in snapshot {
            let entry = Entry {
                value: item.value,
                expires_at: item.expires_at,
            };
            if !entry.is_expired(now) {
                store.entries.insert(item.key, entry);
            }
        }
        debug!(
            "Loaded {} entries from {}",
            store.entries.len(),
            path.display()
        );
        Ok(store)
    }

    /// Writes the snapshot file. No-op for stores created with [`MemoryStore::new`].
    pub fn flush(&self) -> KvResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let now = now_millis();
        let mut snapshot: Vec<SnapshotEntry> = self
            .entries
            .iter()
            .filter(|e| !e.value().is_expired(now))
            .map(|e| SnapshotEntry {
                key: e.key().clone(),
                value: e.value().value.clone(),
                expires_at: e.value().expires_at,
            })
            .collect();
        snapshot.sort_by(|a, b| a.key.cmp(&b.key));

        let raw = bincode::encode_to_vec(snapshot, bincode::config::standard())
            .map_err(|e| KvError::Corrupted(e.to_string()))?;
        let compressed = lz4_flex::compress_prepend_size(&raw);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write-then-rename keeps the previous snapshot intact on failure
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, compressed)?;
        std::fs::rename(&tmp, path)?;
        debug!("Flushed {} entries to {}", self.entries.len(), path.display());
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| {
            now_millis().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
        });
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        let now = now_millis();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        // The read guard must be released before removing
        if expired {
            self.entries.remove_if(key, |_, e| e.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> KvResult<()> {
        self.put(key, value, None);
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> KvResult<()> {
        self.put(key, value, Some(ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn keys(&self, pattern: &str) -> KvResult<Vec<String>> {
        let now = now_millis();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.value().is_expired(now) && glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
