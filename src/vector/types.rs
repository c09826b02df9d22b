//! Type-safe wrappers and core types for the vector store.
//!
//! Records, hits, metadata and stats types shared by the ANN index, the
//! namespaced store and the search orchestrator.

use crate::error::KvError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Standard vector dimension for code embeddings (all-MiniLM-L6-v2 model).
pub const VECTOR_DIMENSION_384: usize = 384;

/// Namespace used when the caller does not pick one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Metadata key holding the workspace-relative file path.
pub const META_FILE_PATH: &str = "file_path";

/// Metadata key holding a short preview of the indexed content.
pub const META_CONTENT_PREVIEW: &str = "content_preview";

/// Metadata key holding the file type (usually the extension).
pub const META_FILE_TYPE: &str = "file_type";

/// Type-safe wrapper for vector dimensions.
///
/// Ensures runtime validation of vector dimensions to prevent
/// dimension mismatches during operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Creates a standard 384-dimensional vector dimension.
    #[must_use]
    pub const fn dimension_384() -> Self {
        Self(VECTOR_DIMENSION_384)
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension and only finite components.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        if let Some(index) = vector.iter().position(|v| !v.is_finite()) {
            return Err(VectorError::NonFiniteComponent { index });
        }
        Ok(())
    }
}

impl std::fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    /// Numeric view of the value, if it has one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Per-vector metadata.
///
/// A string to scalar map. The well-known keys are [`META_FILE_PATH`],
/// [`META_CONTENT_PREVIEW`] and [`META_FILE_TYPE`]; any other key is carried
/// through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, MetadataValue>);

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds metadata carrying the three well-known keys.
    #[must_use]
    pub fn for_file(file_path: &str, content_preview: &str, file_type: &str) -> Self {
        Self::new()
            .with(META_FILE_PATH, file_path)
            .with(META_CONTENT_PREVIEW, content_preview)
            .with(META_FILE_TYPE, file_type)
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<MetadataValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(MetadataValue::as_str)
    }

    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(MetadataValue::as_f64)
    }

    #[must_use]
    pub fn file_path(&self) -> Option<&str> {
        self.get_str(META_FILE_PATH)
    }

    #[must_use]
    pub fn content_preview(&self) -> Option<&str> {
        self.get_str(META_CONTENT_PREVIEW)
    }

    #[must_use]
    pub fn file_type(&self) -> Option<&str> {
        self.get_str(META_FILE_TYPE)
    }

    /// Rejects float values that cannot be written as JSON.
    pub fn validate(&self) -> Result<(), VectorError> {
        match self
            .0
            .iter()
            .find(|(_, v)| matches!(v, MetadataValue::Float(f) if !f.is_finite()))
        {
            Some((key, _)) => Err(VectorError::NonFiniteMetadata(key.clone())),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A stored vector together with its metadata.
///
/// This is the JSON document persisted under `vector:{namespace}:{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
    pub namespace: String,
    /// Monotonic insertion sequence, used as the recency tie-break.
    #[serde(default)]
    pub seq: u64,
}

/// Input for the bulk store operation.
#[derive(Debug, Clone)]
pub struct VectorInput {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
    pub namespace: Option<String>,
}

/// A single result of a vector search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticHit {
    pub id: String,
    /// Cosine similarity, higher is better.
    pub score: f32,
    pub metadata: Metadata,
}

impl SemanticHit {
    /// File identity used for deduplication: the file path, or the id when absent.
    #[must_use]
    pub fn file_key(&self) -> &str {
        self.metadata.file_path().unwrap_or(&self.id)
    }
}

/// Which index backs a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Hnsw,
    Exact,
}

impl StorageType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hnsw => "hnsw",
            Self::Exact => "exact",
        }
    }
}

/// Load state of a namespace as reported by stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceStatus {
    Ready,
    Corrupt,
}

/// Stats for a single namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub namespace: String,
    pub num_docs: usize,
    pub status: NamespaceStatus,
}

/// Stats for one namespace or the whole store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreStats {
    pub num_docs: usize,
    pub storage_type: StorageType,
    pub dimensions: usize,
    pub namespaces: Vec<NamespaceStats>,
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error(
        "Invalid namespace '{0}'\nSuggestion: Namespaces must be non-empty and must not contain ':', '*' or '?'"
    )]
    InvalidNamespace(String),

    #[error(
        "Vector component {index} is NaN or infinite\nSuggestion: Check the embedding model output before storing"
    )]
    NonFiniteComponent { index: usize },

    #[error(
        "Metadata field '{0}' is NaN or infinite\nSuggestion: Store only finite numbers in metadata"
    )]
    NonFiniteMetadata(String),

    #[error("Invalid vector id '{0}'\nSuggestion: Vector ids must be non-empty")]
    InvalidId(String),

    #[error(
        "Index capacity of {max_elements} vectors reached\nSuggestion: Raise vector_store.hnsw.max_elements or delete unused vectors"
    )]
    CapacityExceeded { max_elements: usize },

    #[error(
        "Namespace '{namespace}' is corrupted: {reason}\nSuggestion: Rebuild the namespace to drop unreadable records"
    )]
    CorruptNamespace { namespace: String, reason: String },

    #[error("Storage backend error: {0}")]
    Backend(#[from] KvError),

    #[error(
        "Serialization error: {0}\nSuggestion: Check that vector data is valid and not corrupted"
    )]
    Serialization(String),
}

/// Result type alias for vector operations
pub type VectorResult<T> = Result<T, VectorError>;

/// Validates a namespace name.
pub fn validate_namespace(namespace: &str) -> VectorResult<()> {
    if namespace.is_empty() || namespace.contains([':', '*', '?']) {
        return Err(VectorError::InvalidNamespace(namespace.to_string()));
    }
    Ok(())
}
