//! Local transformer embeddings through fastembed.
//!
//! The model is loaded once and shared behind a mutex. Inference is
//! CPU-bound, so every call runs on tokio's blocking pool.

use crate::embedding::{ContextType, EmbeddingProvider};
use crate::error::{EmbeddingError, EmbeddingResult};
use crate::vector::VectorDimension;
use ::fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Directory where downloaded models are cached.
#[must_use]
pub fn models_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".coderecall"))
        .join("coderecall")
        .join("models")
}

/// Maps a configured model name to the fastembed model and its dimension.
pub fn parse_embedding_model(name: &str) -> EmbeddingResult<(EmbeddingModel, usize)> {
    match name {
        "AllMiniLML6V2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        "BGESmallENV15" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "BGEBaseENV15" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        "NomicEmbedTextV15" => Ok((EmbeddingModel::NomicEmbedTextV15, 768)),
        other => Err(EmbeddingError::UnknownModel(other.to_string())),
    }
}

pub struct FastEmbedProvider {
    model: Arc<Mutex<TextEmbedding>>,
    dimension: VectorDimension,
    model_name: String,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl FastEmbedProvider {
    /// Loads `model_name`, downloading it into [`models_dir`] on first use.
    ///
    /// # Errors
    /// Returns an error if the name is unknown or the model fails to initialize.
    pub fn new(model_name: &str) -> EmbeddingResult<Self> {
        Self::with_cache_dir(model_name, models_dir())
    }

    pub fn with_cache_dir(model_name: &str, cache_dir: PathBuf) -> EmbeddingResult<Self> {
        let (model, dim) = parse_embedding_model(model_name)?;
        info!("Loading embedding model {model_name} from {}", cache_dir.display());

        let embedding = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(false),
        )
        .map_err(|e| EmbeddingError::ModelInit {
            model: model_name.to_string(),
            reason: e.to_string(),
        })?;

        let dimension = VectorDimension::new(dim).map_err(|e| EmbeddingError::ModelInit {
            model: model_name.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            model: Arc::new(Mutex::new(embedding)),
            dimension,
            model_name: model_name.to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str, context: ContextType) -> EmbeddingResult<Vec<f32>> {
        let prepared = context.prepare(text);
        let model = Arc::clone(&self.model);

        let mut embeddings = tokio::task::spawn_blocking(move || {
            model
                .lock()
                .map_err(|_| {
                    EmbeddingError::Generation(
                        "Failed to acquire embedding model lock - model may be poisoned"
                            .to_string(),
                    )
                })?
                .embed(vec![prepared], None)
                .map_err(|e| EmbeddingError::Generation(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::Generation(format!("Embedding task failed: {e}")))??;

        let embedding = embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::Generation("Model returned no embedding".to_string()))?;
        if embedding.len() != self.dimension.get() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension.get(),
                actual: embedding.len(),
            });
        }
        Ok(embedding)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
