//! Configuration loading, validation, and management for Sieve.
//!
//! Loads configuration from `~/.sieve/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.sieve/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SieveConfig {
    /// Iteration controller settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Parameter sanitizer settings
    #[serde(default)]
    pub sanitizer: SanitizerConfig,

    /// Payload extractor settings
    #[serde(default)]
    pub extractor: ExtractorConfig,
}

/// Settings for the scan → dispatch → resume loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Name reported to tool-call listeners
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Model passed through to the provider
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Rounds allowed before the forced fallback completion
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_agent_name() -> String {
    "assistant".into()
}
fn default_model() -> String {
    "default".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_iterations() -> u32 {
    3
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            max_iterations: default_max_iterations(),
        }
    }
}

/// Key-driven type coercions applied to directive parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// Keys ending in one of these (or equal to `id`) coerce digit strings to integers
    #[serde(default = "default_id_suffixes")]
    pub id_suffixes: Vec<String>,

    /// Keys that must end up as sequences
    #[serde(default = "default_list_keys")]
    pub list_keys: Vec<String>,
}

fn default_id_suffixes() -> Vec<String> {
    vec!["_id".into()]
}
fn default_list_keys() -> Vec<String> {
    vec!["tags".into()]
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            id_suffixes: default_id_suffixes(),
            list_keys: default_list_keys(),
        }
    }
}

impl SanitizerConfig {
    pub fn is_id_key(&self, key: &str) -> bool {
        key == "id" || self.id_suffixes.iter().any(|s| key.ends_with(s.as_str()))
    }

    pub fn is_list_key(&self, key: &str) -> bool {
        self.list_keys.iter().any(|k| k == key)
    }
}

/// Settings for turning finished text into a structured record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Field whose presence ranks a candidate above all candidates without it
    #[serde(default = "default_required_field")]
    pub required_field: String,

    /// Code-fence labels that mark the target format
    #[serde(default = "default_format_tags")]
    pub format_tags: Vec<String>,

    /// Length of the text prefix carried by an extraction failure
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,

    /// Maximum nesting of `Finish[...]` wrappers followed
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Fields recovered one by one when nothing parses
    #[serde(default)]
    pub reconstruction: ReconstructionConfig,
}

fn default_required_field() -> String {
    "content".into()
}
fn default_format_tags() -> Vec<String> {
    vec!["json".into(), "json5".into(), "jsonc".into()]
}
fn default_excerpt_chars() -> usize {
    500
}
fn default_max_depth() -> usize {
    4
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            required_field: default_required_field(),
            format_tags: default_format_tags(),
            excerpt_chars: default_excerpt_chars(),
            max_depth: default_max_depth(),
            reconstruction: ReconstructionConfig::default(),
        }
    }
}

/// Known keys for field-level reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    #[serde(default = "default_string_fields")]
    pub string_fields: Vec<String>,

    #[serde(default = "default_integer_fields")]
    pub integer_fields: Vec<String>,

    /// Integer fields that default to the body's character count when absent
    #[serde(default = "default_count_fields")]
    pub count_fields: Vec<String>,

    /// Boolean fields, `false` when absent
    #[serde(default = "default_bool_fields")]
    pub bool_fields: Vec<String>,

    /// The main body text field
    #[serde(default = "default_required_field")]
    pub body_field: String,
}

fn default_string_fields() -> Vec<String> {
    vec!["title".into()]
}
fn default_integer_fields() -> Vec<String> {
    vec!["level".into()]
}
fn default_count_fields() -> Vec<String> {
    vec!["word_count".into()]
}
fn default_bool_fields() -> Vec<String> {
    vec!["needs_expansion".into()]
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            string_fields: default_string_fields(),
            integer_fields: default_integer_fields(),
            count_fields: default_count_fields(),
            bool_fields: default_bool_fields(),
            body_field: default_required_field(),
        }
    }
}

impl SieveConfig {
    /// Load configuration from the default path (~/.sieve/config.toml).
    ///
    /// Environment overrides:
    /// - `SIEVE_MODEL`
    /// - `SIEVE_MAX_ITERATIONS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(model) = std::env::var("SIEVE_MODEL") {
            self.agent.model = model;
        }

        if let Ok(raw) = std::env::var("SIEVE_MAX_ITERATIONS") {
            self.agent.max_iterations = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "SIEVE_MAX_ITERATIONS must be a non-negative integer, got '{raw}'"
                ))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".sieve")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.temperature < 0.0 || self.agent.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.extractor.excerpt_chars == 0 {
            return Err(ConfigError::ValidationError(
                "extractor.excerpt_chars must be > 0".into(),
            ));
        }

        if self.extractor.required_field.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "extractor.required_field must not be empty".into(),
            ));
        }

        if self.extractor.max_depth == 0 {
            return Err(ConfigError::ValidationError(
                "extractor.max_depth must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
