//! Semantic ranking of patient documents against a free-text query.

pub mod index;

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

pub use index::{corpus_fingerprint, CorpusIndex};

use crate::config::SearchConfig;
use crate::embeddings::EmbeddingModel;
use crate::error::SearchError;
use crate::types::{Document, ScoredResult};

/// Ranks a corpus by cosine similarity to a query.
///
/// Stateless from the caller's point of view: results depend only on the
/// query, the corpus and the encoder. Corpus vectors are kept in an LRU cache
/// keyed by [`corpus_fingerprint`], so an unchanged corpus is embedded once.
pub struct RetrievalIndex {
    model: Option<Arc<dyn EmbeddingModel>>,
    config: SearchConfig,
    cache: Mutex<LruCache<u64, Arc<CorpusIndex>>>,
}

impl RetrievalIndex {
    pub fn new(model: Arc<dyn EmbeddingModel>, config: SearchConfig) -> Self {
        Self::build(Some(model), config)
    }

    /// An index with no encoder. Every non-empty search fails with
    /// [`SearchError::ModelUnavailable`].
    pub fn unloaded(config: SearchConfig) -> Self {
        Self::build(None, config)
    }

    fn build(model: Option<Arc<dyn EmbeddingModel>>, config: SearchConfig) -> Self {
        let capacity =
            NonZeroUsize::new(config.index_cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            model,
            config,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.model.as_ref().is_some_and(|m| m.is_ready())
    }

    fn model(&self) -> Result<&Arc<dyn EmbeddingModel>, SearchError> {
        match &self.model {
            Some(model) if model.is_ready() => Ok(model),
            _ => Err(SearchError::ModelUnavailable),
        }
    }

    /// Documents relevant to `query`, most similar first.
    pub fn search(&self, query: &str, corpus: &[Document]) -> Result<Vec<Document>, SearchError> {
        Ok(self
            .search_scored(query, corpus)?
            .into_iter()
            .map(|result| result.document)
            .collect())
    }

    /// Like [`search`](Self::search) but keeps the similarity scores.
    ///
    /// An empty query returns nothing without touching the encoder. Any other
    /// query, whitespace included, is embedded.
    pub fn search_scored(
        &self,
        query: &str,
        corpus: &[Document],
    ) -> Result<Vec<ScoredResult>, SearchError> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.model()?;
        if corpus.is_empty() {
            return Ok(Vec::new());
        }

        let index = self.cached_index(model, corpus)?;
        self.score(model, &index, query)
    }

    /// Embed `corpus` once for repeated searches with [`search_index`](Self::search_index).
    pub fn build_index(&self, corpus: &[Document]) -> Result<CorpusIndex, SearchError> {
        let model = self.model()?;
        Self::embed_corpus(model, corpus)
    }

    /// Score a query against a prebuilt index.
    pub fn search_index(
        &self,
        index: &CorpusIndex,
        query: &str,
    ) -> Result<Vec<ScoredResult>, SearchError> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.model()?;
        self.score(model, index, query)
    }

    fn score(
        &self,
        model: &Arc<dyn EmbeddingModel>,
        index: &CorpusIndex,
        query: &str,
    ) -> Result<Vec<ScoredResult>, SearchError> {
        if index.model_id() != model.model_id() {
            return Err(SearchError::EncoderMismatch {
                index: index.model_id().to_string(),
                query: model.model_id().to_string(),
            });
        }
        if index.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let query_vector = model.embed_query(query).map_err(SearchError::Embedding)?;
        let results = index.rank(
            &query_vector,
            self.config.similarity_threshold,
            self.config.max_results,
        )?;

        tracing::debug!(
            model = model.model_id(),
            corpus_len = index.len(),
            matches = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Semantic search"
        );
        Ok(results)
    }

    fn cached_index(
        &self,
        model: &Arc<dyn EmbeddingModel>,
        corpus: &[Document],
    ) -> Result<Arc<CorpusIndex>, SearchError> {
        let fingerprint = corpus_fingerprint(model.model_id(), corpus);
        {
            let mut cache = self.cache.lock();
            if let Some(index) = cache.get(&fingerprint) {
                // A fingerprint collision must not serve another corpus.
                if index.model_id() == model.model_id() && index.documents() == corpus {
                    return Ok(Arc::clone(index));
                }
                tracing::debug!(fingerprint, "Corpus fingerprint collision, rebuilding index");
            }
        }

        // Embedding runs outside the lock; a concurrent miss on the same
        // corpus computes identical vectors.
        let index = Arc::new(Self::embed_corpus(model, corpus)?);
        self.cache.lock().put(fingerprint, Arc::clone(&index));
        Ok(index)
    }

    fn embed_corpus(
        model: &Arc<dyn EmbeddingModel>,
        corpus: &[Document],
    ) -> Result<CorpusIndex, SearchError> {
        let started = Instant::now();
        let texts: Vec<&str> = corpus.iter().map(|doc| doc.text.as_str()).collect();
        let vectors = model.encode(&texts).map_err(SearchError::Embedding)?;

        if vectors.len() != corpus.len() {
            return Err(SearchError::Embedding(anyhow::anyhow!(
                "Encoder returned {} vectors for {} documents",
                vectors.len(),
                corpus.len()
            )));
        }
        let dimension = model.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(SearchError::Embedding(anyhow::anyhow!(
                "Encoder produced a {}-dim vector, expected {}",
                bad.len(),
                dimension
            )));
        }

        tracing::debug!(
            model = model.model_id(),
            corpus_len = corpus.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Built corpus index"
        );

        Ok(CorpusIndex::new(
            model.model_id().to_string(),
            dimension,
            corpus.to_vec(),
            vectors,
        ))
    }
}
