//! Typed failures surfaced by the retrieval and generation entry points.

use thiserror::Error;

/// Shown when no credential is configured for the generation provider.
pub const CREDENTIAL_MISSING_MESSAGE: &str =
    "⚠️ Erro: API Key não configurada. Verifique os secrets.";
/// Shown for every other generation failure.
pub const SERVICE_UNAVAILABLE_MESSAGE: &str =
    "⚠️ Aura indisponível no momento. Verifique a conexão.";

#[derive(Debug, Error)]
pub enum SearchError {
    /// The encoder was never loaded. Distinct from an empty result.
    #[error("embedding model is not loaded")]
    ModelUnavailable,

    #[error("index was built with encoder '{index}' but the query encoder is '{query}'")]
    EncoderMismatch { index: String, query: String },

    #[error("query vector has {query} dimensions, index vectors have {index}")]
    DimensionMismatch { index: usize, query: usize },

    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no API key configured for the generation provider")]
    CredentialMissing,

    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response from {endpoint}: {message}")]
    MalformedResponse { endpoint: String, message: String },

    #[error("provider returned no completion")]
    EmptyCompletion,
}

impl GenerationError {
    /// Fixed, non-technical text for the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::CredentialMissing => CREDENTIAL_MISSING_MESSAGE,
            _ => SERVICE_UNAVAILABLE_MESSAGE,
        }
    }

    /// True when the failure comes from local configuration rather than the provider.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::CredentialMissing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("user not found")]
    UnknownUser,
    #[error("wrong password")]
    WrongPassword,
    #[error("account has no {requested} profile")]
    RoleMismatch { requested: String },
    #[error("username already taken")]
    UsernameTaken,
    #[error("all registration fields are required")]
    MissingField,
    #[error("invalid medical license key")]
    InvalidLicenseKey,
    #[error("no account is signed in")]
    NotSignedIn,
    #[error("operation not allowed for this profile")]
    Forbidden,
    #[error("patient {0} not found")]
    UnknownPatient(u64),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Search(#[from] SearchError),
}
