//! Configuration module for the hybrid search engine.
//!
//! Settings are layered:
//! - Default values
//! - TOML configuration file (`.coderecall/settings.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CR_` and use double underscores
//! to separate nested levels:
//! - `CR_SEARCH__SEMANTIC_WEIGHT=0.7` sets `search.semantic_weight`
//! - `CR_VECTOR_STORE__ENABLE_HNSW=false` sets `vector_store.enable_hnsw`
//! - `CR_EMBEDDING__PROVIDER=hash` sets `embedding.provider`

use crate::cache::CacheConfig;
use crate::embedding::ContextType;
use crate::search::HybridSearchConfig;
use crate::vector::{
    DEFAULT_NAMESPACE, HnswParams, VECTOR_DIMENSION_384, VectorDimension, VectorResult,
    VectorStoreConfig,
};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory holding settings and local state, relative to the workspace root.
pub const CONFIG_DIR: &str = ".coderecall";
const ENV_PREFIX: &str = "CR_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .coderecall is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    #[serde(default)]
    pub vector_store: VectorStoreSettings,

    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub batch: BatchSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VectorStoreSettings {
    /// Embedding dimension shared by the store, the provider and the cache
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Use the HNSW graph; when false every search is exact
    #[serde(default = "default_true")]
    pub enable_hnsw: bool,

    #[serde(default = "default_namespace")]
    pub default_namespace: String,

    #[serde(default)]
    pub hnsw: HnswSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HnswSettings {
    #[serde(default = "default_max_elements")]
    pub max_elements: usize,

    /// Max neighbors per node on upper layers (twice this on layer 0)
    #[serde(default = "default_m")]
    pub m: usize,

    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,

    #[serde(default = "default_ef_search")]
    pub ef_search: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchSettings {
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,

    #[serde(default = "default_text_weight")]
    pub text_weight: f32,

    #[serde(default = "default_strategy")]
    pub default_strategy: String,

    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Deadline for every collaborator call, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Minimum similarity for semantic files folded into text_first results
    #[serde(default)]
    pub relevance_threshold: f32,

    #[serde(default = "default_popular_queries_limit")]
    pub popular_queries_limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 0 keeps entries until cleared
    #[serde(default = "default_embedding_ttl")]
    pub embedding_ttl_secs: u64,

    #[serde(default = "default_results_ttl")]
    pub results_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingSettings {
    /// "fastembed" or "hash"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model to use for embeddings
    #[serde(default = "default_embedding_model")]
    pub model: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageSettings {
    /// Snapshot of the key-value store (relative to workspace root)
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BatchSettings {
    /// Max in-flight items per batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_dimension() -> usize {
    VECTOR_DIMENSION_384
}
fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}
fn default_max_elements() -> usize {
    10_000
}
fn default_m() -> usize {
    16
}
fn default_ef_construction() -> usize {
    200
}
fn default_ef_search() -> usize {
    50
}
fn default_semantic_weight() -> f32 {
    0.6
}
fn default_text_weight() -> f32 {
    0.4
}
fn default_strategy() -> String {
    "combined".to_string()
}
fn default_top_k() -> usize {
    10
}
fn default_timeout_ms() -> u64 {
    5_000
}
fn default_popular_queries_limit() -> usize {
    10
}
fn default_embedding_ttl() -> u64 {
    24 * 60 * 60
}
fn default_results_ttl() -> u64 {
    60 * 60
}
fn default_provider() -> String {
    "fastembed".to_string()
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_snapshot_path() -> PathBuf {
    PathBuf::from(".coderecall/store.bin")
}
fn default_concurrency() -> usize {
    num_cpus::get()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            debug: false,
            vector_store: VectorStoreSettings::default(),
            search: SearchSettings::default(),
            cache: CacheSettings::default(),
            embedding: EmbeddingSettings::default(),
            storage: StorageSettings::default(),
            batch: BatchSettings::default(),
        }
    }
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            enable_hnsw: true,
            default_namespace: default_namespace(),
            hnsw: HnswSettings::default(),
        }
    }
}

impl Default for HnswSettings {
    fn default() -> Self {
        Self {
            max_elements: default_max_elements(),
            m: default_m(),
            ef_construction: default_ef_construction(),
            ef_search: default_ef_search(),
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            semantic_weight: default_semantic_weight(),
            text_weight: default_text_weight(),
            default_strategy: default_strategy(),
            default_top_k: default_top_k(),
            timeout_ms: default_timeout_ms(),
            relevance_threshold: 0.0,
            popular_queries_limit: default_popular_queries_limit(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            embedding_ttl_secs: default_embedding_ttl(),
            results_ttl_secs: default_results_ttl(),
        }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn ttl(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .coderecall directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        Self::figment(config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                // If workspace_root is not set in config, detect it
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref().to_path_buf())
            .extract()
            .map_err(Box::new)
    }

    fn figment(config_path: PathBuf) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels, single underscores
            // stay inside field names
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
    }

    /// Find the workspace config by looking for a .coderecall directory
    /// from the current directory up to the filesystem root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join("settings.toml"))
    }

    /// Get the workspace root directory (where .coderecall is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(ancestor.to_path_buf());
            }
        }

        None
    }

    /// Check if configuration is properly initialized
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        if !config_path.exists() {
            return Err("No configuration file found".to_string());
        }

        match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                if let Err(e) = toml::from_str::<Settings>(&content) {
                    return Err(format!(
                        "Configuration file is corrupted: {e}\nRun 'coderecall init --force' to regenerate."
                    ));
                }
            }
            Err(e) => {
                return Err(format!("Cannot read configuration file: {e}"));
            }
        }

        Ok(())
    }

    /// Root used to resolve relative paths: the configured or detected
    /// workspace root, else the current directory.
    #[must_use]
    pub fn resolved_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Absolute location of the key-value snapshot
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        if self.storage.snapshot_path.is_absolute() {
            self.storage.snapshot_path.clone()
        } else {
            self.resolved_root().join(&self.storage.snapshot_path)
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.search.timeout_ms)
    }

    /// Vector store parameters.
    ///
    /// # Errors
    /// Fails when the configured dimension is zero.
    pub fn vector_store_config(&self) -> VectorResult<VectorStoreConfig> {
        let hnsw = &self.vector_store.hnsw;
        Ok(VectorStoreConfig {
            dimension: VectorDimension::new(self.vector_store.dimension)?,
            enable_hnsw: self.vector_store.enable_hnsw,
            hnsw: HnswParams {
                m: hnsw.m,
                ef_construction: hnsw.ef_construction,
                ef_search: hnsw.ef_search,
                max_elements: hnsw.max_elements,
            },
            default_namespace: self.vector_store.default_namespace.clone(),
            timeout: self.timeout(),
        })
    }

    #[must_use]
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            enabled: self.cache.enabled,
            embedding_ttl: ttl(self.cache.embedding_ttl_secs),
            results_ttl: ttl(self.cache.results_ttl_secs),
            timeout: self.timeout(),
        }
    }

    #[must_use]
    pub fn hybrid_config(&self, namespace: Option<String>) -> HybridSearchConfig {
        HybridSearchConfig {
            semantic_weight: self.search.semantic_weight,
            text_weight: self.search.text_weight,
            timeout: self.timeout(),
            relevance_threshold: self.search.relevance_threshold,
            namespace,
            query_context: ContextType::Generic,
            popular_queries_limit: self.search.popular_queries_limit,
        }
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        Self::init_config_file_in(&std::env::current_dir()?, force)
    }

    /// Same as [`Settings::init_config_file`], rooted at `root`
    pub fn init_config_file_in(
        root: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# coderecall configuration file

# Version of the configuration schema
version = 1

# Workspace root directory (automatically detected)
workspace_root = "{}"

# Global debug mode
debug = false

[vector_store]
# Embedding dimension; must match the embedding model
dimension = 384

# Approximate (HNSW) search; set to false for exact brute-force search
enable_hnsw = true

default_namespace = "default"

[vector_store.hnsw]
max_elements = 10000
# Max neighbors per node (layer 0 keeps twice as many)
m = 16
ef_construction = 200
ef_search = 50

[search]
# Relative weights of the semantic and text legs (need not sum to 1)
semantic_weight = 0.6
text_weight = 0.4

# combined, parallel, semantic_first or text_first
default_strategy = "combined"
default_top_k = 10

# Deadline for each embedding, text search and storage call
timeout_ms = 5000

# Minimum similarity for semantic files added to text_first results
relevance_threshold = 0.0

popular_queries_limit = 10

[cache]
enabled = true
# Time to live in seconds, 0 keeps entries until cleared
embedding_ttl_secs = 86400
results_ttl_secs = 3600

[embedding]
# "fastembed" downloads a local model, "hash" is an offline fallback
provider = "fastembed"
# AllMiniLML6V2, BGESmallENV15 (384) or BGEBaseENV15, NomicEmbedTextV15 (768)
model = "AllMiniLML6V2"

[storage]
snapshot_path = ".coderecall/store.bin"

[batch]
# Max in-flight items per batch (defaults to CPU count)
# concurrency = {}
"#,
            root.display(),
            num_cpus::get()
        );

        std::fs::write(&config_path, template)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.vector_store.dimension, 384);
        assert!(settings.vector_store.enable_hnsw);
        assert_eq!(settings.vector_store.hnsw.m, 16);
        assert_eq!(settings.search.default_strategy, "combined");
        assert_eq!(settings.embedding.model, "AllMiniLML6V2");
        assert!(settings.batch.concurrency > 0);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[vector_store]
dimension = 768
enable_hnsw = false

[vector_store.hnsw]
ef_search = 80

[search]
semantic_weight = 3.0
text_weight = 1.0

[embedding]
provider = "hash"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.vector_store.dimension, 768);
        assert!(!settings.vector_store.enable_hnsw);
        assert_eq!(settings.vector_store.hnsw.ef_search, 80);
        // Untouched nested values keep their defaults
        assert_eq!(settings.vector_store.hnsw.m, 16);
        assert_eq!(settings.embedding.provider, "hash");
        assert_eq!(settings.embedding.model, "AllMiniLML6V2");

        let hybrid = settings.hybrid_config(None);
        assert_eq!(hybrid.semantic_weight, 3.0);
        let store = settings.vector_store_config().unwrap();
        assert_eq!(store.dimension.get(), 768);
        assert_eq!(store.hnsw.ef_search, 80);
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested/settings.toml");

        let mut settings = Settings::default();
        settings.search.default_top_k = 25;
        settings.cache.enabled = false;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.search.default_top_k, 25);
        assert!(!loaded.cache.enabled);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[search]\ndefault_top_k = 7\ntimeout_ms = 100\n").unwrap();

        unsafe {
            std::env::set_var("CR_SEARCH__DEFAULT_TOP_K", "42");
        }
        let settings = Settings::load_from(&config_path).unwrap();
        unsafe {
            std::env::remove_var("CR_SEARCH__DEFAULT_TOP_K");
        }

        // Environment variable should override config file
        assert_eq!(settings.search.default_top_k, 42);
        // Config file value should be used when no env var
        assert_eq!(settings.search.timeout_ms, 100);
        assert_eq!(settings.timeout(), Duration::from_millis(100));
    }

    #[test]
    fn test_cache_ttl_zero_disables_expiry() {
        let mut settings = Settings::default();
        settings.cache.results_ttl_secs = 0;
        let cache = settings.cache_config();
        assert_eq!(cache.results_ttl, None);
        assert_eq!(cache.embedding_ttl, Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let mut settings = Settings::default();
        settings.vector_store.dimension = 0;
        assert!(settings.vector_store_config().is_err());
    }

    #[test]
    fn test_init_config_file_template_parses() {
        let temp_dir = TempDir::new().unwrap();
        let path = Settings::init_config_file_in(temp_dir.path(), false).unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.vector_store.hnsw.ef_construction, 200);
        assert_eq!(settings.workspace_root.as_deref(), Some(temp_dir.path()));

        assert!(Settings::init_config_file_in(temp_dir.path(), false).is_err());
        assert!(Settings::init_config_file_in(temp_dir.path(), true).is_ok());
    }

    #[test]
    fn test_snapshot_path_resolves_against_root() {
        let settings = Settings {
            workspace_root: Some(PathBuf::from("/work/project")),
            ..Settings::default()
        };
        assert_eq!(
            settings.snapshot_path(),
            PathBuf::from("/work/project/.coderecall/store.bin")
        );
    }
}
