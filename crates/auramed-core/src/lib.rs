//! AuraMed core: semantic patient retrieval and clinical note generation.

pub mod config;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod retrieval;
pub mod session;
pub mod types;

// Re-export primary types for convenience
pub use config::AuraConfig;
pub use embeddings::EmbeddingModel;
pub use error::{
    AuthError, GenerationError, SearchError, SessionError, CREDENTIAL_MISSING_MESSAGE,
    SERVICE_UNAVAILABLE_MESSAGE,
};
pub use generation::{ClinicalInstruction, GenerationClient, GenerationResponse};
pub use retrieval::RetrievalIndex;
pub use session::ClinicSession;
pub use types::{Document, PatientRecord, ScoredResult};

pub use anyhow::{Error, Result};
