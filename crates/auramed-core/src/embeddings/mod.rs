pub mod download;
pub mod minilm;

use anyhow::{anyhow, Result};
use std::sync::Arc;

use crate::config::EmbeddingConfig;

pub use minilm::{MiniLmConfig, MiniLmEmbeddings};

/// Sentence encoder shared by every search.
///
/// Implementations must be deterministic for a fixed `model_id`: identical
/// text yields identical vectors. Query and corpus vectors are only comparable
/// when they come from the same `model_id`.
pub trait EmbeddingModel: Send + Sync {
    /// Identifies the encoder and its version.
    fn model_id(&self) -> &str;

    /// Embedding vector dimension
    fn dimension(&self) -> usize;

    /// Batch encode, one vector per input text in input order.
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single search query
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.encode(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Encoder returned no vector for query"))
    }

    /// Whether the encoder can serve requests.
    fn is_ready(&self) -> bool {
        true
    }
}

/// Cosine of the angle between two vectors. Zero-length or zero-norm inputs score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f32::EPSILON {
        0.0
    } else {
        (dot / denom).clamp(-1.0, 1.0)
    }
}

/// Load the default encoder from `config.model_dir`. Expensive; call once at startup.
pub fn load_default(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingModel>> {
    let minilm_config = MiniLmConfig::auto_detect(config).ok_or_else(|| {
        anyhow!(
            "No embedding model available. Place all-MiniLM-L6-v2 in: {}",
            config.model_dir.display()
        )
    })?;
    Ok(Arc::new(MiniLmEmbeddings::new(minilm_config)?))
}
