//! Namespaced vector storage and approximate nearest neighbor search.
//!
//! # Architecture
//! Records are persisted through the [`KeyValueStore`](crate::kv::KeyValueStore)
//! collaborator and mirrored into one in-memory index per namespace. With
//! approximate indexing enabled the index is an arena-backed HNSW graph;
//! otherwise an exact brute-force scan answers queries. Either way results
//! are cosine similarities sorted best first, ties going to the most recent
//! insertion.

mod flat;
mod hnsw;
mod index;
mod similarity;
mod store;
mod types;

// Re-export core types for public API
pub use flat::FlatIndex;
pub use hnsw::{HnswIndex, HnswParams};
pub use index::{VectorIndex, new_index};
pub use similarity::{IndexHit, cosine_similarity, normalized};
pub use store::{VectorStore, VectorStoreConfig};
pub use types::{
    DEFAULT_NAMESPACE, META_CONTENT_PREVIEW, META_FILE_PATH, META_FILE_TYPE, Metadata,
    MetadataValue, NamespaceStats, NamespaceStatus, SemanticHit, StorageType,
    VECTOR_DIMENSION_384, VectorDimension, VectorError, VectorInput, VectorRecord, VectorResult,
    VectorStoreStats, validate_namespace,
};
