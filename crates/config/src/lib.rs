//! Configuration management for the lead personalization engine
//!
//! Supports loading configuration from:
//! - YAML files (`config/default.yaml`, `config/{env}.yaml`)
//! - Environment variables (`LEAD_ENGINE__SECTION__FIELD`)
//!
//! Engine tuning lives under the `engine` section: cache TTL, analyzer and
//! generator retry policy, plausibility table, A/B defaults, analytics queue.

pub mod engine;
pub mod settings;

pub use engine::{
    AbTestingConfig, AggregatorConfig, AnalyticsConfig, AnalyzerConfig, CacheConfig,
    EngineConfig, EvidenceConfig, ScriptConfig,
};
pub use settings::{
    load_settings, load_settings_from, LeadStoreSettings, LlmSettings, ObservabilityConfig,
    RuntimeEnvironment, ServerConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
