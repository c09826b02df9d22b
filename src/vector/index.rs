//! The per-namespace index seam.
//!
//! The store talks to a `dyn VectorIndex` and never cares whether the graph
//! or the brute-force scan is answering.

use crate::vector::flat::FlatIndex;
use crate::vector::hnsw::{HnswIndex, HnswParams};
use crate::vector::similarity::IndexHit;
use crate::vector::{StorageType, VectorDimension, VectorResult};

pub trait VectorIndex: Send + Sync {
    fn storage_type(&self) -> StorageType;

    /// Number of live vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, key: &str) -> bool;

    /// Whether `key` can be inserted without exceeding capacity.
    fn can_insert(&self, key: &str) -> bool;

    fn insert(&mut self, key: &str, seq: u64, vector: &[f32]) -> VectorResult<()>;

    fn remove(&mut self, key: &str) -> bool;

    fn search(&self, query: &[f32], k: usize) -> VectorResult<Vec<IndexHit>>;

    /// Live `(key, seq)` pairs, used to validate snapshots against records.
    fn entries(&self) -> Vec<(String, u64)>;

    /// Compressed snapshot, when the index has a persisted form.
    fn snapshot(&self) -> VectorResult<Option<Vec<u8>>>;
}

impl VectorIndex for HnswIndex {
    fn storage_type(&self) -> StorageType {
        StorageType::Hnsw
    }

    fn len(&self) -> usize {
        HnswIndex::len(self)
    }

    fn contains(&self, key: &str) -> bool {
        HnswIndex::contains(self, key)
    }

    fn can_insert(&self, key: &str) -> bool {
        HnswIndex::can_insert(self, key)
    }

    fn insert(&mut self, key: &str, seq: u64, vector: &[f32]) -> VectorResult<()> {
        HnswIndex::insert(self, key, seq, vector)
    }

    fn remove(&mut self, key: &str) -> bool {
        HnswIndex::remove(self, key)
    }

    fn search(&self, query: &[f32], k: usize) -> VectorResult<Vec<IndexHit>> {
        HnswIndex::search(self, query, k)
    }

    fn entries(&self) -> Vec<(String, u64)> {
        HnswIndex::entries(self)
    }

    fn snapshot(&self) -> VectorResult<Option<Vec<u8>>> {
        self.to_snapshot().map(Some)
    }
}

impl VectorIndex for FlatIndex {
    fn storage_type(&self) -> StorageType {
        StorageType::Exact
    }

    fn len(&self) -> usize {
        FlatIndex::len(self)
    }

    fn contains(&self, key: &str) -> bool {
        FlatIndex::contains(self, key)
    }

    fn can_insert(&self, _key: &str) -> bool {
        true
    }

    fn insert(&mut self, key: &str, seq: u64, vector: &[f32]) -> VectorResult<()> {
        FlatIndex::insert(self, key, seq, vector)
    }

    fn remove(&mut self, key: &str) -> bool {
        FlatIndex::remove(self, key)
    }

    fn search(&self, query: &[f32], k: usize) -> VectorResult<Vec<IndexHit>> {
        FlatIndex::search(self, query, k)
    }

    fn entries(&self) -> Vec<(String, u64)> {
        FlatIndex::entries(self)
    }

    fn snapshot(&self) -> VectorResult<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Creates an empty index of the configured kind.
#[must_use]
pub fn new_index(
    dimension: VectorDimension,
    enable_hnsw: bool,
    params: HnswParams,
) -> Box<dyn VectorIndex> {
    if enable_hnsw {
        Box::new(HnswIndex::new(dimension, params))
    } else {
        Box::new(FlatIndex::new(dimension))
    }
}
