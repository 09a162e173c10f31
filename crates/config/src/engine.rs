//! Engine tuning
//!
//! Every field has a serde default so a partial `engine:` section (or none
//! at all) deserializes into a usable configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::ConfigError;

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub script: ScriptConfig,
    #[serde(default)]
    pub ab_testing: AbTestingConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.expiration_minutes == 0 {
            return Err(ConfigError::invalid(
                "engine.cache.expiration_minutes",
                "must be at least 1",
            ));
        }
        if self.aggregator.max_conversations == 0 {
            return Err(ConfigError::invalid(
                "engine.aggregator.max_conversations",
                "must be at least 1",
            ));
        }
        self.analyzer.validate()?;
        self.script.validate()?;
        self.ab_testing.validate()?;
        if self.analytics.channel_capacity == 0 {
            return Err(ConfigError::invalid(
                "engine.analytics.channel_capacity",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Analysis cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entries older than this are treated as absent
    #[serde(default = "default_expiration_minutes")]
    pub expiration_minutes: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.expiration_minutes * 60)
    }
}

fn default_expiration_minutes() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expiration_minutes: default_expiration_minutes(),
        }
    }
}

/// Lead context aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Most recent conversations pulled into a context
    #[serde(default = "default_max_conversations")]
    pub max_conversations: usize,
}

fn default_max_conversations() -> usize {
    10
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_conversations: default_max_conversations(),
        }
    }
}

/// Context analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Hard timeout for one backend call
    #[serde(default = "default_analyzer_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Doubles on every retry
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_analysis_max_tokens")]
    pub max_tokens: usize,

    /// Personality -> strategies considered implausible for it
    #[serde(default = "default_implausible_pairs")]
    pub implausible_strategies: BTreeMap<String, Vec<String>>,

    /// Recommendation confidence on an implausible pairing is held below this
    #[serde(default = "default_implausible_confidence_threshold")]
    pub implausible_confidence_threshold: f32,

    #[serde(default)]
    pub evidence: EvidenceConfig,
}

impl AnalyzerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "engine.analyzer.timeout_ms",
                "must be positive",
            ));
        }
        if !(1.0..=100.0).contains(&self.implausible_confidence_threshold) {
            return Err(ConfigError::invalid(
                "engine.analyzer.implausible_confidence_threshold",
                format!(
                    "must be between 1 and 100, got {}",
                    self.implausible_confidence_threshold
                ),
            ));
        }
        self.evidence.validate()
    }
}

fn default_analyzer_timeout_ms() -> u64 {
    20_000
}
fn default_max_retries() -> u32 {
    2
}
fn default_initial_backoff_ms() -> u64 {
    200
}
fn default_analysis_max_tokens() -> usize {
    1024
}
fn default_implausible_confidence_threshold() -> f32 {
    45.0
}

fn default_implausible_pairs() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([
        ("analytical".to_string(), vec!["urgency".to_string()]),
        (
            "driver".to_string(),
            vec!["relationship".to_string(), "educational".to_string()],
        ),
        ("expressive".to_string(), vec!["educational".to_string()]),
        (
            "amiable".to_string(),
            vec!["urgency".to_string(), "direct".to_string()],
        ),
    ])
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_analyzer_timeout_ms(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_tokens: default_analysis_max_tokens(),
            implausible_strategies: default_implausible_pairs(),
            implausible_confidence_threshold: default_implausible_confidence_threshold(),
            evidence: EvidenceConfig::default(),
        }
    }
}

/// Sparse-evidence ceiling on profile confidence
///
/// The ceiling starts at `cold_ceiling` for a lead with nothing on record and
/// rises with each piece of evidence, up to `max_ceiling`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceConfig {
    #[serde(default = "default_cold_ceiling")]
    pub cold_ceiling: f32,
    #[serde(default = "default_max_ceiling")]
    pub max_ceiling: f32,
    #[serde(default = "default_per_conversation")]
    pub per_conversation: f32,
    #[serde(default = "default_rich_bonus")]
    pub rich_conversation_bonus: f32,
    #[serde(default = "default_max_counted")]
    pub max_counted_conversations: usize,
    /// Qualification score, interest level, decision-maker level
    #[serde(default = "default_signal_weight")]
    pub qualification_weight: f32,
    /// Each observed preference
    #[serde(default = "default_signal_weight")]
    pub preference_weight: f32,
}

impl EvidenceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let in_range = |v: f32| (0.0..=100.0).contains(&v);
        if !in_range(self.cold_ceiling) || !in_range(self.max_ceiling) {
            return Err(ConfigError::invalid(
                "engine.analyzer.evidence",
                "ceilings must be between 0 and 100",
            ));
        }
        if self.cold_ceiling > self.max_ceiling {
            return Err(ConfigError::invalid(
                "engine.analyzer.evidence.cold_ceiling",
                format!(
                    "{} exceeds max_ceiling {}",
                    self.cold_ceiling, self.max_ceiling
                ),
            ));
        }
        Ok(())
    }
}

fn default_cold_ceiling() -> f32 {
    35.0
}
fn default_max_ceiling() -> f32 {
    95.0
}
fn default_per_conversation() -> f32 {
    8.0
}
fn default_rich_bonus() -> f32 {
    4.0
}
fn default_max_counted() -> usize {
    5
}
fn default_signal_weight() -> f32 {
    3.0
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            cold_ceiling: default_cold_ceiling(),
            max_ceiling: default_max_ceiling(),
            per_conversation: default_per_conversation(),
            rich_conversation_bonus: default_rich_bonus(),
            max_counted_conversations: default_max_counted(),
            qualification_weight: default_signal_weight(),
            preference_weight: default_signal_weight(),
        }
    }
}

/// Script generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptConfig {
    #[serde(default = "default_script_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_script_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_max_total_words")]
    pub max_total_words: u32,
    #[serde(default = "default_true")]
    pub include_objection_handling: bool,
    #[serde(default = "default_true")]
    pub include_social_proof: bool,
    /// Closing scripts below this analysis confidence carry a warning
    #[serde(default = "default_min_closing_confidence")]
    pub min_closing_confidence: f32,
    /// Allowed relative gap between headline and section-sum durations
    #[serde(default = "default_duration_tolerance")]
    pub duration_tolerance: f32,
}

impl ScriptConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "engine.script.timeout_ms",
                "must be positive",
            ));
        }
        if self.max_total_words == 0 {
            return Err(ConfigError::invalid(
                "engine.script.max_total_words",
                "must be at least 1",
            ));
        }
        if !(0.0..=100.0).contains(&self.min_closing_confidence) {
            return Err(ConfigError::invalid(
                "engine.script.min_closing_confidence",
                format!(
                    "must be between 0 and 100, got {}",
                    self.min_closing_confidence
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.duration_tolerance) {
            return Err(ConfigError::invalid(
                "engine.script.duration_tolerance",
                format!(
                    "must be between 0.0 and 1.0, got {}",
                    self.duration_tolerance
                ),
            ));
        }
        Ok(())
    }
}

fn default_script_timeout_ms() -> u64 {
    30_000
}
fn default_script_max_tokens() -> usize {
    2048
}
fn default_max_total_words() -> u32 {
    650
}
fn default_true() -> bool {
    true
}
fn default_min_closing_confidence() -> f32 {
    60.0
}
fn default_duration_tolerance() -> f32 {
    0.15
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_script_timeout_ms(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_tokens: default_script_max_tokens(),
            max_total_words: default_max_total_words(),
            include_objection_handling: true,
            include_social_proof: true,
            min_closing_confidence: default_min_closing_confidence(),
            duration_tolerance: default_duration_tolerance(),
        }
    }
}

/// A/B testing defaults applied when a test definition omits them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbTestingConfig {
    #[serde(default = "default_confidence_level")]
    pub default_confidence_level: f64,
    #[serde(default = "default_min_sample_size")]
    pub default_min_sample_size: u32,
    #[serde(default = "default_measurement_window_hours")]
    pub default_measurement_window_hours: u32,
    /// Power used for required sample size estimates
    #[serde(default = "default_statistical_power")]
    pub statistical_power: f64,
}

impl AbTestingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.5..1.0).contains(&self.default_confidence_level) {
            return Err(ConfigError::invalid(
                "engine.ab_testing.default_confidence_level",
                format!("must be in [0.5, 1.0), got {}", self.default_confidence_level),
            ));
        }
        if !(0.5..1.0).contains(&self.statistical_power) {
            return Err(ConfigError::invalid(
                "engine.ab_testing.statistical_power",
                format!("must be in [0.5, 1.0), got {}", self.statistical_power),
            ));
        }
        if self.default_min_sample_size == 0 {
            return Err(ConfigError::invalid(
                "engine.ab_testing.default_min_sample_size",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

fn default_confidence_level() -> f64 {
    0.95
}
fn default_min_sample_size() -> u32 {
    100
}
fn default_measurement_window_hours() -> u32 {
    72
}
fn default_statistical_power() -> f64 {
    0.8
}

impl Default for AbTestingConfig {
    fn default() -> Self {
        Self {
            default_confidence_level: default_confidence_level(),
            default_min_sample_size: default_min_sample_size(),
            default_measurement_window_hours: default_measurement_window_hours(),
            statistical_power: default_statistical_power(),
        }
    }
}

/// Analytics pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Events queued beyond this are dropped
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_period_days")]
    pub default_period_days: i64,
}

fn default_channel_capacity() -> usize {
    4096
}
fn default_period_days() -> i64 {
    30
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            default_period_days: default_period_days(),
        }
    }
}
