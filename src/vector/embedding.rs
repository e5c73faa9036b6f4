//! Embedding providers for catalog descriptions and queries.
//!
//! The search core only depends on the [`EmbeddingGenerator`] trait. Two
//! providers ship with the crate:
//!
//! - [`FastEmbedGenerator`]: ONNX sentence embeddings via fastembed
//!   (AllMiniLML6V2 by default, 384 dimensions).
//! - [`HashingEmbedder`]: deterministic feature-hashed bag of words. No
//!   model download, used by tests and offline deployments.

use std::path::PathBuf;
use std::sync::Arc;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;

use crate::config::SemanticSearchConfig;
use crate::vector::{VectorDimension, VectorError};

/// Model name that selects the offline [`HashingEmbedder`].
pub const HASHING_MODEL: &str = "hashing";

/// Trait for generating vector embeddings from text.
///
/// Implementations must return exactly one vector per input text, in
/// input order, all of length [`dimension`](Self::dimension). Output for a
/// given text must be deterministic for a given model version.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple texts.
    ///
    /// # Arguments
    /// * `texts` - Slice of text strings to generate embeddings for
    ///
    /// # Returns
    /// A vector of embeddings, one for each input text, or an error
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Get the dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;

    /// Human readable model identifier, reported in engine stats.
    fn model_name(&self) -> String;
}

/// FastEmbed implementation backed by an ONNX sentence-transformer.
pub struct FastEmbedGenerator {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimension: VectorDimension,
}

impl std::fmt::Debug for FastEmbedGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedGenerator")
            .field("model", &"<TextEmbedding>")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedGenerator {
    /// Create a generator with the default AllMiniLML6V2 model.
    ///
    /// # Errors
    /// Returns an error if the model fails to initialize or download.
    pub fn new() -> Result<Self, VectorError> {
        Self::with_model(EmbeddingModel::AllMiniLML6V2, "AllMiniLML6V2", false)
    }

    /// Create a generator for a specific fastembed model.
    ///
    /// The dimension is discovered by embedding a probe string, so any
    /// model fastembed supports works without a lookup table.
    pub fn with_model(
        model: EmbeddingModel,
        model_name: &str,
        show_download_progress: bool,
    ) -> Result<Self, VectorError> {
        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(models_dir())
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| VectorError::EmbeddingFailed(
            format!("Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download")
        ))?;

        let probe = text_model
            .embed(vec!["probe"], None)
            .map_err(|e| VectorError::EmbeddingFailed(e.to_string()))?;
        let dimension = probe
            .into_iter()
            .next()
            .map(|v| v.len())
            .ok_or_else(|| {
                VectorError::EmbeddingFailed("Model returned no probe embedding".to_string())
            })
            .and_then(VectorDimension::new)?;

        Ok(Self {
            model: Mutex::new(text_model),
            model_name: model_name.to_string(),
            dimension,
        })
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        let embeddings = self
            .model
            .lock()
            .embed(text_strings, None)
            .map_err(|e| {
                VectorError::EmbeddingFailed(format!("Failed to generate embeddings: {e}"))
            })?;

        if embeddings.len() != texts.len() {
            return Err(VectorError::EmbeddingFailed(format!(
                "Model returned {} embeddings for {} texts",
                embeddings.len(),
                texts.len()
            )));
        }
        for embedding in &embeddings {
            self.dimension.validate_vector(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> String {
        self.model_name.clone()
    }
}

/// Offline embedder: tokens are hashed (FNV-1a) into a fixed number of
/// signed buckets and the resulting count vector is L2-normalized.
///
/// Two texts score high when they share words. It has no notion of
/// synonyms, so it is a stand-in for the real model, not a replacement.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimension: VectorDimension,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(VectorDimension::dimension_384())
    }
}

impl HashingEmbedder {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let dim = self.dimension.get();
        let mut embedding = vec![0.0f32; dim];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(&token.to_lowercase());
            let bucket = (hash % dim as u64) as usize;
            let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
            embedding[bucket] += sign;
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in &mut embedding {
                *val /= magnitude;
            }
        }
        embedding
    }
}

impl EmbeddingGenerator for HashingEmbedder {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> String {
        HASHING_MODEL.to_string()
    }
}

fn fnv1a(token: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    token
        .bytes()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME))
}

/// Map a configured model name onto a fastembed model.
///
/// Accepts the enum variant names used in settings files.
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, VectorError> {
    match name {
        "AllMiniLML6V2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "AllMiniLML6V2Q" => Ok(EmbeddingModel::AllMiniLML6V2Q),
        "AllMiniLML12V2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "BGESmallENV15" => Ok(EmbeddingModel::BGESmallENV15),
        "BGEBaseENV15" => Ok(EmbeddingModel::BGEBaseENV15),
        "MultilingualE5Small" => Ok(EmbeddingModel::MultilingualE5Small),
        other => Err(VectorError::UnknownModel(other.to_string())),
    }
}

/// Build the embedding provider selected by configuration.
pub fn create_embedder(
    config: &SemanticSearchConfig,
) -> Result<Arc<dyn EmbeddingGenerator>, VectorError> {
    if config.model.eq_ignore_ascii_case(HASHING_MODEL) {
        let dimension = VectorDimension::new(config.dimension)?;
        return Ok(Arc::new(HashingEmbedder::new(dimension)));
    }

    let model = parse_embedding_model(&config.model)?;
    let generator =
        FastEmbedGenerator::with_model(model, &config.model, config.show_download_progress)?;
    Ok(Arc::new(generator))
}

/// Directory where downloaded ONNX models are cached.
pub fn models_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("cupola")
        .join("models")
}
