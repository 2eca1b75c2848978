//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use auramed_core::embeddings::EmbeddingModel;
use auramed_core::types::Document;

/// Concept groups; each maps to one vector component.
const CONCEPTS: &[&[&str]] = &[
    &["cabeça", "enxaqueca", "cefaleia"],
    &["hipertensão", "pressão", "colesterol"],
    &["gestante", "gravidez", "enjoo"],
    &["atividade física", "exercício"],
];

/// Deterministic bag-of-concepts encoder. Texts with no known concept get a
/// zero vector and therefore score 0 against everything.
pub struct KeywordEncoder {
    model_id: String,
    texts_encoded: AtomicUsize,
}

impl KeywordEncoder {
    pub fn new() -> Self {
        Self::with_id("keyword-v1")
    }

    pub fn with_id(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            texts_encoded: AtomicUsize::new(0),
        }
    }

    /// Total number of texts passed to `encode` so far.
    pub fn texts_encoded(&self) -> usize {
        self.texts_encoded.load(Ordering::SeqCst)
    }
}

impl EmbeddingModel for KeywordEncoder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        CONCEPTS.len()
    }

    fn encode(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.texts_encoded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                CONCEPTS
                    .iter()
                    .map(|words| {
                        words.iter().map(|w| lower.matches(w).count()).sum::<usize>() as f32
                    })
                    .collect()
            })
            .collect())
    }
}

/// Encoder that always fails, for error propagation.
pub struct BrokenEncoder;

impl EmbeddingModel for BrokenEncoder {
    fn model_id(&self) -> &str {
        "broken"
    }

    fn dimension(&self) -> usize {
        4
    }

    fn encode(&self, _texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("onnx session poisoned")
    }
}

pub fn demo_corpus() -> Vec<Document> {
    vec![
        Document::from_fields(
            1,
            "Ana Silva",
            "Enxaqueca crônica, alergia a penicilina. Relata estresse no trabalho.",
        ),
        Document::from_fields(
            2,
            "Carlos Souza",
            "Hipertensão leve, monitoramento de colesterol. Pratica atividade física regular.",
        ),
        Document::from_fields(
            3,
            "Mariana Lima",
            "Gestante 12 semanas, exames de rotina normais. Leve enjoo matinal.",
        ),
    ]
}

pub fn ids(documents: &[Document]) -> Vec<u64> {
    documents.iter().map(|d| d.id).collect()
}
