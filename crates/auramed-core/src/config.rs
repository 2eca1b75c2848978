use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Similarity a document must strictly exceed to be returned by a search.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.2;
/// Sampling temperature for clinical text; kept low for a steady tone.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_MAX_TOKENS: usize = 500;
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
pub const DEFAULT_DOCTOR_LICENSE_KEY: &str = "crm123";

const API_KEY_ENV_VARS: &[&str] = &["GROQ_API_KEY", "AURAMED_API_KEY"];
const MODEL_DIR_ENV_VAR: &str = "AURAMED_MODEL_DIR";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuraConfig {
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub generation: GenerationConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model_dir: PathBuf,
    pub dimension: usize,
    pub max_length: usize,
    pub normalize: bool,
    pub cache_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub similarity_threshold: f32,
    /// Optional cap applied after ranking.
    pub max_results: Option<usize>,
    /// Number of corpus indexes kept warm between searches.
    pub index_cache_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub doctor_license_key: String,
}

impl AuraConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.embedding.dimension == 0 {
            return Err("embedding.dimension must be > 0".into());
        }
        if self.embedding.max_length == 0 {
            return Err("embedding.max_length must be > 0".into());
        }
        if !(-1.0..=1.0).contains(&self.search.similarity_threshold) {
            return Err("search.similarity_threshold must be in [-1.0, 1.0]".into());
        }
        if self.search.max_results == Some(0) {
            return Err("search.max_results must be > 0 when set".into());
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err("generation.temperature must be in [0.0, 2.0]".into());
        }
        if self.generation.max_tokens == 0 {
            return Err("generation.max_tokens must be > 0".into());
        }
        if self.generation.timeout_secs == 0 || self.generation.connect_timeout_secs == 0 {
            return Err("generation timeouts must be > 0".into());
        }
        if self.generation.endpoint.trim().is_empty() {
            return Err("generation.endpoint must not be empty".into());
        }
        if self.generation.model.trim().is_empty() {
            return Err("generation.model must not be empty".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Fill the credential and model directory from the environment.
    /// Blank variables are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if self.generation.api_key.is_none() {
            self.generation.api_key = API_KEY_ENV_VARS
                .iter()
                .filter_map(|name| std::env::var(name).ok())
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty());
        }
        if let Ok(dir) = std::env::var(MODEL_DIR_ENV_VAR) {
            if !dir.trim().is_empty() {
                self.embedding.model_dir = PathBuf::from(dir.trim());
            }
        }
        self
    }
}

impl GenerationConfig {
    /// The configured credential, if it is present and non-blank.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let model_dir = if Path::new("models").exists() {
            PathBuf::from("models")
        } else if let Ok(env_path) = std::env::var("MODEL_PATH") {
            PathBuf::from(env_path)
        } else {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("auramed")
                .join("models")
        };

        Self {
            model_dir,
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            max_length: 256,
            normalize: true,
            cache_size: 1000,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_results: None,
            index_cache_size: 8,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: 60,
            connect_timeout_secs: 15,
            api_key: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            doctor_license_key: DEFAULT_DOCTOR_LICENSE_KEY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_clinic_tuning() {
        let config = AuraConfig::default();
        assert_eq!(config.search.similarity_threshold, 0.2);
        assert_eq!(config.generation.temperature, 0.3);
        assert_eq!(config.generation.max_tokens, 500);
        assert_eq!(config.generation.model, "llama-3.3-70b-versatile");
        assert_eq!(config.embedding.dimension, 384);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_broken_values() {
        let mut config = AuraConfig::default();
        config.search.similarity_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = AuraConfig::default();
        config.generation.temperature = -0.1;
        assert!(config.validate().is_err());

        let mut config = AuraConfig::default();
        config.generation.max_tokens = 0;
        assert!(config.validate().is_err());

        let mut config = AuraConfig::default();
        config.search.max_results = Some(0);
        assert!(config.validate().is_err());

        let mut config = AuraConfig::default();
        config.generation.endpoint = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_credential_is_absent() {
        let mut generation = GenerationConfig::default();
        assert!(generation.credential().is_none());
        generation.api_key = Some("   ".into());
        assert!(generation.credential().is_none());
        generation.api_key = Some(" gsk_test ".into());
        assert_eq!(generation.credential(), Some("gsk_test"));
    }

    #[test]
    fn test_api_key_is_never_serialized() {
        let mut config = AuraConfig::default();
        config.generation.api_key = Some("secret".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
