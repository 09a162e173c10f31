//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{ConfigError, EngineConfig};

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Relaxed validation
    #[default]
    Development,
    Staging,
    /// All validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    /// Analysis, generation, experiment and analytics tuning
    #[serde(default)]
    pub engine: EngineConfig,

    /// Generation backend
    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub lead_store: LeadStoreSettings,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from a YAML document, without env overrides
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_llm()?;
        self.engine.validate()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::invalid("server.port", "Port cannot be 0"));
        }
        if self.server.timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "server.timeout_seconds",
                "Timeout cannot be 0",
            ));
        }
        if self.server.script_deadline_ms >= self.server.timeout_seconds.saturating_mul(1000) {
            return Err(ConfigError::invalid(
                "server.script_deadline_ms",
                format!(
                    "{}ms must be below the {}s request timeout",
                    self.server.script_deadline_ms, self.server.timeout_seconds
                ),
            ));
        }
        if self.environment.is_production()
            && self.server.cors_enabled
            && self.server.cors_origins.is_empty()
        {
            return Err(ConfigError::invalid(
                "server.cors_origins",
                "Production requires explicit CORS origins when CORS is enabled",
            ));
        }
        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;
        if !matches!(
            llm.provider.to_lowercase().as_str(),
            "ollama" | "openai" | "azure"
        ) {
            return Err(ConfigError::invalid(
                "llm.provider",
                format!("Unknown provider '{}'", llm.provider),
            ));
        }
        if llm.model.trim().is_empty() {
            return Err(ConfigError::invalid("llm.model", "Model cannot be empty"));
        }
        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(ConfigError::invalid(
                "llm.temperature",
                format!("Must be between 0.0 and 2.0, got {}", llm.temperature),
            ));
        }
        if self.environment.is_strict()
            && llm.provider.eq_ignore_ascii_case("openai")
            && llm.api_key.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigError::invalid(
                "llm.api_key",
                "OpenAI provider requires an API key outside development",
            ));
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Deadline applied to script requests that do not set their own
    #[serde(default = "default_script_deadline_ms")]
    pub script_deadline_ms: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_timeout() -> u64 {
    60
}
fn default_script_deadline_ms() -> u64 {
    45_000
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_seconds: default_timeout(),
            script_deadline_ms: default_script_deadline_ms(),
            cors_enabled: default_true(),
            // Empty by default; must be set explicitly for production
            cors_origins: Vec::new(),
        }
    }
}

/// Generation backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// `ollama`, `openai` or `azure`
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Defaults per provider when absent
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,

    /// Azure only
    #[serde(default)]
    pub azure_api_version: Option<String>,

    /// OpenAI only
    #[serde(default)]
    pub organization: Option<String>,
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_model() -> String {
    "qwen2.5:7b-instruct".to_string()
}
fn default_temperature() -> f32 {
    0.4
}
fn default_llm_timeout() -> u64 {
    30
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            endpoint: None,
            api_key: None,
            temperature: default_temperature(),
            timeout_seconds: default_llm_timeout(),
            azure_api_version: None,
            organization: None,
        }
    }
}

/// Lead store used by the server binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadStoreSettings {
    /// YAML fixture with leads, conversations and campaigns
    #[serde(default = "default_fixture_path")]
    pub fixture_path: String,
}

fn default_fixture_path() -> String {
    "config/leads.yaml".to_string()
}

impl Default for LeadStoreSettings {
    fn default() -> Self {
        Self {
            fixture_path: default_fixture_path(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// JSON log lines instead of human-readable output
    #[serde(default)]
    pub log_json: bool,

    /// Serve Prometheus metrics on `/metrics`
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (`LEAD_ENGINE__ENGINE__CACHE__EXPIRATION_MINUTES=30`)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Same as [`load_settings`] with an explicit config directory
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    if !dir.exists() {
        tracing::warn!(dir = %dir.display(), "Config directory missing, using defaults and environment");
    }

    let mut builder = Config::builder()
        .add_source(File::from(dir.join("default")).required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::from(dir.join(env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("LEAD_ENGINE")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
