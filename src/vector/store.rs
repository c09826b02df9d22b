//! Namespaced vector store backed by a key-value collaborator.
//!
//! Each record is persisted as JSON under `vector:{namespace}:{id}`. The
//! in-memory index for a namespace is built lazily on first touch, either
//! from a persisted graph snapshot (`index:{namespace}`) when it still
//! matches the records, or by re-inserting the records in sequence order.
//!
//! # Concurrency
//! Every namespace has its own slot: a `parking_lot::RwLock` around the
//! index for readers, and a `tokio::sync::Mutex` that serializes writers.
//! Writers do their key-value I/O while holding only the mutex and then
//! swap the in-memory state under a short write lock, so a concurrent
//! search sees either the state before the mutation or after it.
//!
//! # Failure isolation
//! A namespace holding an unreadable record is marked corrupt. Searches in
//! it return nothing and writes are refused until
//! [`VectorStore::rebuild_namespace`] drops the bad records. Other
//! namespaces are unaffected.

use crate::kv::{KeyValueStore, with_timeout};
use crate::vector::hnsw::{HnswIndex, HnswParams};
use crate::vector::index::{VectorIndex, new_index};
use crate::vector::{
    DEFAULT_NAMESPACE, Metadata, NamespaceStats, NamespaceStatus, SemanticHit, StorageType,
    VectorDimension, VectorError, VectorInput, VectorRecord, VectorResult, VectorStoreStats,
    validate_namespace,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const VECTOR_KEY_PREFIX: &str = "vector:";
const INDEX_KEY_PREFIX: &str = "index:";

fn vector_key(namespace: &str, id: &str) -> String {
    format!("{VECTOR_KEY_PREFIX}{namespace}:{id}")
}

fn index_key(namespace: &str) -> String {
    format!("{INDEX_KEY_PREFIX}{namespace}")
}

/// Construction parameters for [`VectorStore`].
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub dimension: VectorDimension,
    pub enable_hnsw: bool,
    pub hnsw: HnswParams,
    pub default_namespace: String,
    /// Deadline applied to every key-value call.
    pub timeout: Duration,
}

impl VectorStoreConfig {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            enable_hnsw: true,
            hnsw: HnswParams::default(),
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

struct LoadedNamespace {
    index: Box<dyn VectorIndex>,
    metadata: HashMap<String, Metadata>,
}

enum NamespaceState {
    Unloaded,
    Ready(LoadedNamespace),
    Corrupt(String),
}

struct NamespaceSlot {
    state: RwLock<NamespaceState>,
    writer: tokio::sync::Mutex<()>,
}

impl NamespaceSlot {
    fn new() -> Self {
        Self {
            state: RwLock::new(NamespaceState::Unloaded),
            writer: tokio::sync::Mutex::new(()),
        }
    }

    fn is_unloaded(&self) -> bool {
        matches!(*self.state.read(), NamespaceState::Unloaded)
    }
}

/// Namespaced vector storage with approximate or exact top-k retrieval.
pub struct VectorStore {
    kv: Arc<dyn KeyValueStore>,
    config: VectorStoreConfig,
    namespaces: DashMap<String, Arc<NamespaceSlot>>,
    next_seq: AtomicU64,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("config", &self.config)
            .field("loaded_namespaces", &self.namespaces.len())
            .finish_non_exhaustive()
    }
}

impl VectorStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, config: VectorStoreConfig) -> Self {
        Self {
            kv,
            config,
            namespaces: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.config.dimension
    }

    #[must_use]
    pub fn storage_type(&self) -> StorageType {
        if self.config.enable_hnsw {
            StorageType::Hnsw
        } else {
            StorageType::Exact
        }
    }

    #[must_use]
    pub fn default_namespace(&self) -> &str {
        &self.config.default_namespace
    }

    /// Stores or overwrites a vector. Returns false when it was rejected.
    ///
    /// Rejections (dimension mismatch, invalid namespace, corrupt namespace,
    /// capacity, backend failure) are logged; use
    /// [`VectorStore::try_store_vector`] to inspect the reason.
    pub async fn store_vector(
        &self,
        id: &str,
        embedding: &[f32],
        metadata: Metadata,
        namespace: Option<&str>,
    ) -> bool {
        match self
            .try_store_vector(id, embedding, metadata, namespace)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!("Rejected vector '{id}': {e}");
                false
            }
        }
    }

    /// Stores or overwrites a vector, surfacing the rejection reason.
    pub async fn try_store_vector(
        &self,
        id: &str,
        embedding: &[f32],
        metadata: Metadata,
        namespace: Option<&str>,
    ) -> VectorResult<()> {
        let namespace = self.resolve_namespace(namespace)?;
        self.config.dimension.validate_vector(embedding)?;
        metadata.validate()?;
        if id.is_empty() {
            return Err(VectorError::InvalidId(id.to_string()));
        }

        let slot = self.slot(namespace);
        let _writer = slot.writer.lock().await;
        self.load_locked(&slot, namespace).await?;

        match &*slot.state.read() {
            NamespaceState::Ready(loaded) if !loaded.index.can_insert(id) => {
                return Err(VectorError::CapacityExceeded {
                    max_elements: self.config.hnsw.max_elements,
                });
            }
            NamespaceState::Ready(_) => {}
            NamespaceState::Corrupt(reason) => {
                return Err(VectorError::CorruptNamespace {
                    namespace: namespace.to_string(),
                    reason: reason.clone(),
                });
            }
            NamespaceState::Unloaded => {
                return Err(VectorError::CorruptNamespace {
                    namespace: namespace.to_string(),
                    reason: "namespace failed to load".to_string(),
                });
            }
        }

        let record = VectorRecord {
            id: id.to_string(),
            embedding: embedding.to_vec(),
            metadata,
            namespace: namespace.to_string(),
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
        };
        let bytes =
            serde_json::to_vec(&record).map_err(|e| VectorError::Serialization(e.to_string()))?;
        with_timeout(
            self.config.timeout,
            "set",
            self.kv.set(&vector_key(namespace, id), bytes),
        )
        .await?;

        let mut state = slot.state.write();
        if let NamespaceState::Ready(loaded) = &mut *state {
            loaded.index.insert(id, record.seq, &record.embedding)?;
            loaded.metadata.insert(record.id, record.metadata);
        }
        Ok(())
    }

    /// Best-effort bulk store. Returns how many inputs were stored.
    pub async fn store_vectors(&self, batch: Vec<VectorInput>) -> usize {
        let mut stored = 0;
        for input in batch {
            if self
                .store_vector(
                    &input.id,
                    &input.embedding,
                    input.metadata,
                    input.namespace.as_deref(),
                )
                .await
            {
                stored += 1;
            }
        }
        stored
    }

    /// Top-k search by cosine similarity, best first.
    ///
    /// Only a query of the wrong dimension is an error. Unavailable backends
    /// and corrupt namespaces yield an empty list.
    #[instrument(skip(self, query), fields(namespace = ?namespace))]
    pub async fn search_vectors(
        &self,
        query: &[f32],
        top_k: usize,
        namespace: Option<&str>,
    ) -> VectorResult<Vec<SemanticHit>> {
        self.config.dimension.validate_vector(query)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let namespace = match self.resolve_namespace(namespace) {
            Ok(ns) => ns,
            Err(e) => {
                warn!("Vector search skipped: {e}");
                return Ok(Vec::new());
            }
        };
        let slot = match self.ready_slot(namespace).await {
            Ok(slot) => slot,
            Err(e) => {
                warn!("Vector search in '{namespace}' degraded: {e}");
                return Ok(Vec::new());
            }
        };

        let state = slot.state.read();
        let loaded = match &*state {
            NamespaceState::Ready(loaded) => loaded,
            NamespaceState::Corrupt(reason) => {
                debug!("Namespace '{namespace}' is corrupt ({reason}), returning no hits");
                return Ok(Vec::new());
            }
            NamespaceState::Unloaded => return Ok(Vec::new()),
        };

        let hits = match loaded.index.search(query, top_k) {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Index search in '{namespace}' failed: {e}");
                return Ok(Vec::new());
            }
        };

        Ok(hits
            .into_iter()
            .map(|hit| {
                let metadata = loaded.metadata.get(&hit.key).cloned().unwrap_or_default();
                SemanticHit {
                    id: hit.key,
                    score: hit.score,
                    metadata,
                }
            })
            .collect())
    }

    /// Deletes a vector. Idempotent; false when the id was not stored.
    pub async fn delete_vector(&self, id: &str, namespace: Option<&str>) -> bool {
        let Ok(namespace) = self.resolve_namespace(namespace) else {
            return false;
        };
        let slot = self.slot(namespace);
        let _writer = slot.writer.lock().await;
        if let Err(e) = self.load_locked(&slot, namespace).await {
            warn!("Delete of '{id}' in '{namespace}' skipped: {e}");
            return false;
        }

        let exists = match &*slot.state.read() {
            NamespaceState::Ready(loaded) => loaded.metadata.contains_key(id),
            _ => false,
        };
        if !exists {
            return false;
        }

        let deleted = with_timeout(
            self.config.timeout,
            "delete",
            self.kv.delete(&vector_key(namespace, id)),
        )
        .await;
        if let Err(e) = deleted {
            warn!("Delete of '{id}' in '{namespace}' failed: {e}");
            return false;
        }

        let mut state = slot.state.write();
        if let NamespaceState::Ready(loaded) = &mut *state {
            loaded.index.remove(id);
            loaded.metadata.remove(id);
        }
        true
    }

    /// Reads a stored record straight from the backend.
    pub async fn get_vector(
        &self,
        id: &str,
        namespace: Option<&str>,
    ) -> VectorResult<Option<VectorRecord>> {
        let namespace = self.resolve_namespace(namespace)?;
        let bytes = with_timeout(
            self.config.timeout,
            "get",
            self.kv.get(&vector_key(namespace, id)),
        )
        .await?;
        bytes
            .map(|b| {
                serde_json::from_slice(&b).map_err(|e| VectorError::Serialization(e.to_string()))
            })
            .transpose()
    }

    /// Stats for one namespace, or aggregated over every namespace when `None`.
    pub async fn get_stats(&self, namespace: Option<&str>) -> VectorResult<VectorStoreStats> {
        let names = match namespace {
            Some(ns) => {
                validate_namespace(ns)?;
                vec![ns.to_string()]
            }
            None => self.list_namespaces().await?,
        };

        let mut namespaces = Vec::with_capacity(names.len());
        for name in names {
            let slot = self.ready_slot(&name).await?;
            let stats = match &*slot.state.read() {
                NamespaceState::Ready(loaded) => NamespaceStats {
                    namespace: name.clone(),
                    num_docs: loaded.index.len(),
                    status: NamespaceStatus::Ready,
                },
                NamespaceState::Corrupt(_) | NamespaceState::Unloaded => NamespaceStats {
                    namespace: name.clone(),
                    num_docs: 0,
                    status: NamespaceStatus::Corrupt,
                },
            };
            namespaces.push(stats);
        }

        Ok(VectorStoreStats {
            num_docs: namespaces.iter().map(|n| n.num_docs).sum(),
            storage_type: self.storage_type(),
            dimensions: self.config.dimension.get(),
            namespaces,
        })
    }

    /// Namespaces that hold at least one record in the backend.
    pub async fn list_namespaces(&self) -> VectorResult<Vec<String>> {
        let keys = with_timeout(
            self.config.timeout,
            "keys",
            self.kv.keys(&format!("{VECTOR_KEY_PREFIX}*")),
        )
        .await?;

        let names: BTreeSet<String> = keys
            .iter()
            .filter_map(|key| {
                key.strip_prefix(VECTOR_KEY_PREFIX)?
                    .split_once(':')
                    .map(|(ns, _)| ns.to_string())
            })
            .filter(|ns| validate_namespace(ns).is_ok())
            .collect();
        Ok(names.into_iter().collect())
    }

    /// Rebuilds a namespace from its records, deleting any that cannot be read.
    ///
    /// Clears the corrupt mark. Returns the number of live vectors.
    pub async fn rebuild_namespace(&self, namespace: &str) -> VectorResult<usize> {
        validate_namespace(namespace)?;
        let slot = self.slot(namespace);
        let _writer = slot.writer.lock().await;

        let (records, bad) = self.read_records(namespace).await?;
        for (key, reason) in &bad {
            warn!("Dropping unreadable record '{key}': {reason}");
            if let Err(e) = with_timeout(self.config.timeout, "delete", self.kv.delete(key)).await
            {
                warn!("Failed to delete '{key}': {e}");
            }
        }
        if let Err(e) = with_timeout(
            self.config.timeout,
            "delete",
            self.kv.delete(&index_key(namespace)),
        )
        .await
        {
            debug!("Stale snapshot for '{namespace}' not removed: {e}");
        }

        let loaded = self.build_namespace(namespace, records, false).await;
        let count = loaded.index.len();
        *slot.state.write() = NamespaceState::Ready(loaded);
        info!(
            "Rebuilt namespace '{namespace}' with {count} vectors ({} unreadable records dropped)",
            bad.len()
        );
        Ok(count)
    }

    /// Persists the graph snapshot of a namespace. Returns false for exact indexes.
    pub async fn persist_index(&self, namespace: Option<&str>) -> VectorResult<bool> {
        let namespace = self.resolve_namespace(namespace)?;
        let slot = self.ready_slot(namespace).await?;

        let snapshot = match &*slot.state.read() {
            NamespaceState::Ready(loaded) => loaded.index.snapshot()?,
            NamespaceState::Corrupt(reason) => {
                return Err(VectorError::CorruptNamespace {
                    namespace: namespace.to_string(),
                    reason: reason.clone(),
                });
            }
            NamespaceState::Unloaded => None,
        };
        let Some(bytes) = snapshot else {
            return Ok(false);
        };

        let size = bytes.len();
        with_timeout(
            self.config.timeout,
            "set",
            self.kv.set(&index_key(namespace), bytes),
        )
        .await?;
        debug!("Persisted index snapshot for '{namespace}' ({size} bytes)");
        Ok(true)
    }

    /// Persists snapshots for every loaded namespace. Returns how many were written.
    pub async fn persist_all(&self) -> VectorResult<usize> {
        let names: Vec<String> = self.namespaces.iter().map(|e| e.key().clone()).collect();
        let mut written = 0;
        for name in names {
            if self.persist_index(Some(&name)).await? {
                written += 1;
            }
        }
        Ok(written)
    }

    fn resolve_namespace<'a>(&'a self, namespace: Option<&'a str>) -> VectorResult<&'a str> {
        let namespace = namespace.unwrap_or(&self.config.default_namespace);
        validate_namespace(namespace)?;
        Ok(namespace)
    }

    fn slot(&self, namespace: &str) -> Arc<NamespaceSlot> {
        if let Some(slot) = self.namespaces.get(namespace) {
            return Arc::clone(slot.value());
        }
        Arc::clone(
            self.namespaces
                .entry(namespace.to_string())
                .or_insert_with(|| Arc::new(NamespaceSlot::new()))
                .value(),
        )
    }

    /// Returns the slot for `namespace`, loading it first if needed.
    async fn ready_slot(&self, namespace: &str) -> VectorResult<Arc<NamespaceSlot>> {
        let slot = self.slot(namespace);
        if slot.is_unloaded() {
            let _writer = slot.writer.lock().await;
            self.load_locked(&slot, namespace).await?;
        }
        Ok(slot)
    }

    /// Loads an unloaded namespace. The caller must hold the slot's writer lock.
    ///
    /// Backend errors leave the slot unloaded so a later call can retry.
    async fn load_locked(&self, slot: &NamespaceSlot, namespace: &str) -> VectorResult<()> {
        if !slot.is_unloaded() {
            return Ok(());
        }

        let (records, bad) = self.read_records(namespace).await?;
        if let Some((key, reason)) = bad.first() {
            let reason = format!("record '{key}' is unreadable: {reason}");
            warn!("Namespace '{namespace}' marked corrupt: {reason}");
            *slot.state.write() = NamespaceState::Corrupt(reason);
            return Ok(());
        }

        let loaded = self.build_namespace(namespace, records, true).await;
        debug!(
            "Loaded namespace '{namespace}' with {} vectors",
            loaded.index.len()
        );
        *slot.state.write() = NamespaceState::Ready(loaded);
        Ok(())
    }

    /// Reads every record of a namespace, splitting out the unreadable ones.
    async fn read_records(
        &self,
        namespace: &str,
    ) -> VectorResult<(Vec<VectorRecord>, Vec<(String, String)>)> {
        let prefix = format!("{VECTOR_KEY_PREFIX}{namespace}:");
        let keys = with_timeout(
            self.config.timeout,
            "keys",
            self.kv.keys(&format!("{prefix}*")),
        )
        .await?;

        let mut records = Vec::with_capacity(keys.len());
        let mut bad = Vec::new();
        for key in keys {
            let Some(bytes) = with_timeout(self.config.timeout, "get", self.kv.get(&key)).await?
            else {
                continue;
            };
            match serde_json::from_slice::<VectorRecord>(&bytes) {
                Ok(record) if record.embedding.len() != self.config.dimension.get() => {
                    let reason = format!(
                        "embedding has {} dimensions, expected {}",
                        record.embedding.len(),
                        self.config.dimension
                    );
                    bad.push((key, reason));
                }
                Ok(record) if key.strip_prefix(&prefix) != Some(record.id.as_str()) => {
                    bad.push((key, format!("record id '{}' does not match key", record.id)));
                }
                Ok(record) => records.push(record),
                Err(e) => bad.push((key, e.to_string())),
            }
        }
        Ok((records, bad))
    }

    async fn build_namespace(
        &self,
        namespace: &str,
        mut records: Vec<VectorRecord>,
        use_snapshot: bool,
    ) -> LoadedNamespace {
        records.sort_by_key(|r| r.seq);
        if let Some(last) = records.last() {
            self.next_seq.fetch_max(last.seq + 1, Ordering::SeqCst);
        }

        let snapshot = if use_snapshot {
            self.load_snapshot(namespace, &records).await
        } else {
            None
        };
        let index = match snapshot {
            Some(index) => index,
            None => {
                let mut index =
                    new_index(self.config.dimension, self.config.enable_hnsw, self.config.hnsw);
                for record in &records {
                    if let Err(e) = index.insert(&record.id, record.seq, &record.embedding) {
                        warn!("Skipping '{}' in '{namespace}': {e}", record.id);
                    }
                }
                index
            }
        };

        let metadata = records
            .into_iter()
            .filter(|r| index.contains(&r.id))
            .map(|r| (r.id, r.metadata))
            .collect();
        LoadedNamespace { index, metadata }
    }

    /// Restores a persisted graph if it matches the records exactly.
    async fn load_snapshot(
        &self,
        namespace: &str,
        records: &[VectorRecord],
    ) -> Option<Box<dyn VectorIndex>> {
        if !self.config.enable_hnsw {
            return None;
        }
        let bytes = match with_timeout(
            self.config.timeout,
            "get",
            self.kv.get(&index_key(namespace)),
        )
        .await
        {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                debug!("Index snapshot for '{namespace}' unavailable: {e}");
                return None;
            }
        };

        let index = match HnswIndex::from_snapshot(&bytes, self.config.dimension, self.config.hnsw)
        {
            Ok(index) => index,
            Err(e) => {
                warn!("Ignoring unreadable index snapshot for '{namespace}': {e}");
                return None;
            }
        };

        let mut expected: Vec<(String, u64)> =
            records.iter().map(|r| (r.id.clone(), r.seq)).collect();
        let mut actual = index.entries();
        expected.sort();
        actual.sort();
        if expected != actual {
            debug!("Index snapshot for '{namespace}' is out of date, rebuilding");
            return None;
        }
        Some(Box::new(index))
    }
}
