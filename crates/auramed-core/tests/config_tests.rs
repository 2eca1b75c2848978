use std::io::Write;

use auramed_core::config::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use auramed_core::AuraConfig;
use tempfile::NamedTempFile;

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

#[test]
fn test_partial_file_keeps_defaults() {
    let file = write_config(
        r#"{
            "search": { "similarity_threshold": 0.35, "max_results": 5 },
            "generation": { "api_key": "gsk-test" }
        }"#,
    );

    let config = AuraConfig::from_file(file.path()).unwrap();
    assert_eq!(config.search.similarity_threshold, 0.35);
    assert_eq!(config.search.max_results, Some(5));
    assert_eq!(config.generation.credential(), Some("gsk-test"));
    assert_eq!(config.generation.model, DEFAULT_MODEL);
    assert_eq!(config.generation.max_tokens, DEFAULT_MAX_TOKENS);
    assert_eq!(config.embedding.dimension, 384);
    assert_eq!(config.session.doctor_license_key, "crm123");
}

#[test]
fn test_out_of_range_values_are_rejected() {
    let file = write_config(r#"{ "generation": { "temperature": 3.5 } }"#);
    let err = AuraConfig::from_file(file.path()).unwrap_err();
    assert!(err.contains("temperature"));

    let file = write_config(r#"{ "search": { "similarity_threshold": 1.5 } }"#);
    assert!(AuraConfig::from_file(file.path()).is_err());
}

#[test]
fn test_invalid_json_is_reported() {
    let file = write_config("{ not json");
    let err = AuraConfig::from_file(file.path()).unwrap_err();
    assert!(err.starts_with("Failed to parse config"));
}

#[test]
fn test_missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = AuraConfig::from_file(&dir.path().join("absent.json")).unwrap_err();
    assert!(err.starts_with("Failed to read config file"));
}
