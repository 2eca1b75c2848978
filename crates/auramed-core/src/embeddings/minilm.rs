use anyhow::{anyhow, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionOutputs};
use ort::value::Value;
use parking_lot::{Mutex, RwLock};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use super::download::MINILM_DIR;
use super::EmbeddingModel;
use crate::config::EmbeddingConfig;

const MODEL_FILES: &[&str] = &["model_O4.onnx", "model.onnx"];
const MAX_BATCH_SIZE: usize = 16;

#[derive(Debug, Clone)]
pub struct MiniLmConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub dimension: usize,
    pub max_length: usize,
    pub normalize: bool,
    pub cache_size: usize,
}

impl MiniLmConfig {
    /// Look for the model under `<model_dir>/all-MiniLM-L6-v2` and then in `model_dir` itself.
    pub fn auto_detect(config: &EmbeddingConfig) -> Option<Self> {
        let candidates = [config.model_dir.join(MINILM_DIR), config.model_dir.clone()];

        for base in &candidates {
            let tokenizer_path = base.join("tokenizer.json");
            if !tokenizer_path.exists() {
                continue;
            }
            let model_path = MODEL_FILES
                .iter()
                .flat_map(|name| [base.join(name), base.join("onnx").join(name)])
                .find(|path| path.exists());

            if let Some(model_path) = model_path {
                return Some(Self {
                    model_path,
                    tokenizer_path,
                    dimension: config.dimension,
                    max_length: config.max_length,
                    normalize: config.normalize,
                    cache_size: config.cache_size,
                });
            }
        }
        None
    }
}

/// all-MiniLM-L6-v2 sentence encoder run through ONNX Runtime.
pub struct MiniLmEmbeddings {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<tokenizers::Tokenizer>,
    config: MiniLmConfig,
    model_id: String,
    wants_token_types: bool,
    cache: Arc<RwLock<lru::LruCache<u64, Vec<f32>>>>,
}

impl MiniLmEmbeddings {
    pub fn new(config: MiniLmConfig) -> Result<Self> {
        ort::init().with_name("auramed_embeddings").commit();

        if !config.model_path.exists() {
            return Err(anyhow!(
                "Model file not found at: {}",
                config.model_path.display()
            ));
        }

        let started = Instant::now();
        let tokenizer = tokenizers::Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {:?}", e))?;

        let model_bytes = std::fs::read(&config.model_path)
            .map_err(|e| anyhow!("Failed to read model: {:?}", e))?;

        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        let session = Session::builder()
            .map_err(|e| anyhow!("Session builder: {:?}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Optimization level: {:?}", e))?
            .with_intra_threads(num_threads)
            .map_err(|e| anyhow!("Intra threads: {:?}", e))?
            .commit_from_memory(&model_bytes)
            .map_err(|e| anyhow!("Failed to load model: {:?}", e))?;

        let wants_token_types = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");

        let file_name = config
            .model_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let model_id = format!("{}/{}", MINILM_DIR, file_name);

        let cache_size =
            NonZeroUsize::new(config.cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);

        tracing::info!(
            model = %model_id,
            dimension = config.dimension,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Embedding model loaded"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            config,
            model_id,
            wants_token_types,
            cache: Arc::new(RwLock::new(lru::LruCache::new(cache_size))),
        })
    }

    fn cache_key(text: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        hasher.finish()
    }

    fn infer_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow!("Tokenization failed: {:?}", e))?;

        let padded_len = encodings
            .iter()
            .map(|enc| enc.get_ids().len().min(self.config.max_length))
            .max()
            .unwrap_or(1)
            .max(1);
        let batch_size = encodings.len();

        let mut ids_flat = Vec::with_capacity(batch_size * padded_len);
        let mut mask_flat = Vec::with_capacity(batch_size * padded_len);
        let mut type_flat = Vec::with_capacity(batch_size * padded_len);

        for enc in &encodings {
            let len = enc.get_ids().len().min(padded_len);
            for i in 0..len {
                ids_flat.push(enc.get_ids()[i] as i64);
                mask_flat.push(enc.get_attention_mask()[i] as i64);
                type_flat.push(enc.get_type_ids()[i] as i64);
            }
            for _ in len..padded_len {
                ids_flat.push(0i64);
                mask_flat.push(0i64);
                type_flat.push(0i64);
            }
        }

        let shape = vec![batch_size, padded_len];
        let input_ids = Value::from_array((shape.clone(), ids_flat))
            .map_err(|e| anyhow!("input_ids tensor: {:?}", e))?;
        let attention_mask = Value::from_array((shape.clone(), mask_flat.clone()))
            .map_err(|e| anyhow!("attention_mask tensor: {:?}", e))?;

        let mut session = self.session.lock();
        let outputs = if self.wants_token_types {
            let token_type_ids = Value::from_array((shape, type_flat))
                .map_err(|e| anyhow!("token_type_ids tensor: {:?}", e))?;
            session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids,
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
            ])
        }
        .map_err(|e| anyhow!("Batch inference failed: {:?}", e))?;

        self.pool_outputs(&outputs, &mask_flat, batch_size, padded_len)
    }

    fn pool_outputs(
        &self,
        outputs: &SessionOutputs,
        mask_flat: &[i64],
        batch_size: usize,
        padded_len: usize,
    ) -> Result<Vec<Vec<f32>>> {
        // Already pooled by some exports.
        if outputs.iter().any(|(name, _)| name == "sentence_embedding") {
            let (shape, data) = outputs["sentence_embedding"]
                .try_extract_tensor::<f32>()
                .map_err(|e| anyhow!("Failed to extract sentence_embedding: {:?}", e))?;
            let hidden_dim = shape[1] as usize;
            return (0..batch_size)
                .map(|i| self.normalize_vec(data[i * hidden_dim..(i + 1) * hidden_dim].to_vec()))
                .collect();
        }

        let output_name = outputs
            .iter()
            .find(|(name, _)| *name == "last_hidden_state" || *name == "token_embeddings")
            .or_else(|| outputs.iter().next())
            .map(|(name, _)| name.to_string())
            .ok_or_else(|| anyhow!("Model produced no outputs"))?;

        let (shape, data) = outputs[output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| anyhow!("Failed to extract output '{}': {:?}", output_name, e))?;

        if shape.len() != 3 {
            return Err(anyhow!(
                "Expected [batch, seq, dim] output from '{}', got {} dims",
                output_name,
                shape.len()
            ));
        }
        let seq_len = shape[1] as usize;
        let hidden_dim = shape[2] as usize;
        if hidden_dim != self.config.dimension {
            return Err(anyhow!(
                "Model produced {}-dim vectors, configured dimension is {}",
                hidden_dim,
                self.config.dimension
            ));
        }

        let mut pooled_all = Vec::with_capacity(batch_size);
        for sample_idx in 0..batch_size {
            let mask = &mask_flat[sample_idx * padded_len..(sample_idx + 1) * padded_len];
            let sample_len = seq_len * hidden_dim;
            let sample = &data[sample_idx * sample_len..(sample_idx + 1) * sample_len];
            let pooled = mean_pool(sample, mask, seq_len, hidden_dim);
            pooled_all.push(self.normalize_vec(pooled)?);
        }
        Ok(pooled_all)
    }

    fn normalize_vec(&self, mut vec: Vec<f32>) -> Result<Vec<f32>> {
        if self.config.normalize {
            let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 1e-12 {
                for v in &mut vec {
                    *v /= norm;
                }
            }
        }
        Ok(vec)
    }
}

/// Attention-masked mean over the token axis of one `[seq, dim]` sample.
fn mean_pool(sample: &[f32], mask: &[i64], seq_len: usize, hidden_dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden_dim];
    let mut mask_sum = 0.0f32;

    for pos in 0..seq_len {
        let mask_val = mask.get(pos).copied().unwrap_or(0) as f32;
        if mask_val > 0.0 {
            mask_sum += mask_val;
            let offset = pos * hidden_dim;
            for dim in 0..hidden_dim {
                pooled[dim] += sample[offset + dim] * mask_val;
            }
        }
    }

    if mask_sum > 0.0 {
        for value in &mut pooled {
            *value /= mask_sum;
        }
    }
    pooled
}

impl EmbeddingModel for MiniLmEmbeddings {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<u64> = texts.iter().map(|t| Self::cache_key(t)).collect();
        let mut vectors: Vec<Option<Vec<f32>>> = {
            let mut cache = self.cache.write();
            keys.iter().map(|key| cache.get(key).cloned()).collect()
        };

        let missing: Vec<usize> = (0..texts.len()).filter(|&i| vectors[i].is_none()).collect();
        for batch in missing.chunks(MAX_BATCH_SIZE) {
            let batch_texts: Vec<&str> = batch.iter().map(|&i| texts[i]).collect();
            let embedded = self.infer_batch(&batch_texts)?;
            if embedded.len() != batch.len() {
                return Err(anyhow!(
                    "Encoder returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                ));
            }

            let mut cache = self.cache.write();
            for (&i, vector) in batch.iter().zip(embedded) {
                cache.put(keys[i], vector.clone());
                vectors[i] = Some(vector);
            }
        }

        tracing::debug!(
            model = %self.model_id,
            texts = texts.len(),
            inferred = missing.len(),
            "Encoded texts"
        );

        vectors
            .into_iter()
            .map(|v| v.ok_or_else(|| anyhow!("Missing embedding after inference")))
            .collect()
    }
}
