use rayon::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::embeddings::cosine_similarity;
use crate::error::SearchError;
use crate::types::{Document, ScoredResult};

/// Corpus vectors computed once by a single encoder.
#[derive(Debug, Clone)]
pub struct CorpusIndex {
    model_id: String,
    dimension: usize,
    fingerprint: u64,
    documents: Vec<Document>,
    vectors: Vec<Vec<f32>>,
}

impl CorpusIndex {
    pub(crate) fn new(
        model_id: String,
        dimension: usize,
        documents: Vec<Document>,
        vectors: Vec<Vec<f32>>,
    ) -> Self {
        let fingerprint = corpus_fingerprint(&model_id, &documents);
        Self {
            model_id,
            dimension,
            fingerprint,
            documents,
            vectors,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Score every document against `query_vector`, keep those strictly above
    /// `threshold` and order them by descending score. Equal scores keep corpus order.
    pub fn rank(
        &self,
        query_vector: &[f32],
        threshold: f32,
        max_results: Option<usize>,
    ) -> Result<Vec<ScoredResult>, SearchError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if query_vector.len() != self.dimension {
            return Err(SearchError::DimensionMismatch {
                index: self.dimension,
                query: query_vector.len(),
            });
        }

        let scores: Vec<f32> = self
            .vectors
            .par_iter()
            .map(|vector| cosine_similarity(query_vector, vector))
            .collect();

        let mut results: Vec<ScoredResult> = self
            .documents
            .iter()
            .zip(scores)
            .enumerate()
            .filter(|(_, (_, score))| *score > threshold)
            .map(|(position, (document, score))| ScoredResult {
                document: document.clone(),
                score,
                position,
            })
            .collect();

        // sort_by is stable
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if let Some(limit) = max_results {
            results.truncate(limit);
        }
        Ok(results)
    }
}

/// Hash over the encoder id and every document's id, name and text.
pub fn corpus_fingerprint(model_id: &str, documents: &[Document]) -> u64 {
    let mut hasher = DefaultHasher::new();
    model_id.hash(&mut hasher);
    documents.len().hash(&mut hasher);
    for doc in documents {
        doc.id.hash(&mut hasher);
        doc.name.hash(&mut hasher);
        doc.text.hash(&mut hasher);
    }
    hasher.finish()
}
