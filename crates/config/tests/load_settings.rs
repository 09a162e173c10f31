//! Layered loading from a config directory

use std::fs;

use lead_engine_config::{load_settings_from, ConfigError, RuntimeEnvironment};

#[test]
fn test_missing_directory_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let settings = load_settings_from(&dir.path().join("absent"), None).unwrap();
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.engine.cache.expiration_minutes, 60);
}

#[test]
fn test_environment_file_overrides_default() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("default.yaml"),
        "server:\n  port: 8100\nengine:\n  cache:\n    expiration_minutes: 30\n  script:\n    max_total_words: 400\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("staging.yaml"),
        "environment: staging\nserver:\n  port: 8200\n",
    )
    .unwrap();

    let settings = load_settings_from(dir.path(), Some("staging")).unwrap();
    assert_eq!(settings.environment, RuntimeEnvironment::Staging);
    assert_eq!(settings.server.port, 8200);
    assert_eq!(settings.engine.cache.expiration_minutes, 30);
    assert_eq!(settings.engine.script.max_total_words, 400);
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("default.yaml"),
        "engine:\n  analyzer:\n    implausible_confidence_threshold: 250\n",
    )
    .unwrap();

    let err = load_settings_from(dir.path(), None).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
}
