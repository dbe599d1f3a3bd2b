//! TOML Configuration File Support
//!
//! Centralized configuration loading for the harvest controller, with an
//! optional TOML file at `~/.config/harvest/harvest.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`HARVEST_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [backend]
//! base_url = "http://localhost:8000"
//! batch_path = "/api/properties"
//! stream_path = "/api/scrape/stream"
//! request_timeout_ms = 30000
//! connect_timeout_ms = 10000
//!
//! [pagination]
//! page_size = 200
//! remote_batch_size = 900
//! trigger_page_within_batch = 4
//!
//! [filters]
//! relevance_threshold = 7.0
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::DEFAULT_RELEVANCE_THRESHOLD;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Backend endpoints and timeouts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL of the listings backend
    pub base_url: String,
    /// Path of the batch endpoint
    pub batch_path: String,
    /// Path of the event-stream endpoint
    pub stream_path: String,
    /// Deadline for one batch fetch in milliseconds (0 = none)
    pub request_timeout_ms: u64,
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            batch_path: "/api/properties".to_string(),
            stream_path: "/api/scrape/stream".to_string(),
            request_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl BackendSettings {
    /// Batch deadline, if any
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

/// Local page and remote batch sizes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationSettings {
    /// Items per local page
    pub page_size: usize,
    /// Items requested per remote batch
    pub remote_batch_size: usize,
    /// Page within a batch (1-based) that prefetches the next batch
    pub trigger_page_within_batch: usize,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            page_size: 200,
            remote_batch_size: 900,
            trigger_page_within_batch: 4,
        }
    }
}

impl PaginationSettings {
    /// Check sizes and that the trigger page exists within a batch
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::ValidationError(
                "pagination.page_size must be greater than 0".to_string(),
            ));
        }
        if self.remote_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "pagination.remote_batch_size must be greater than 0".to_string(),
            ));
        }
        let pages_per_batch = self.remote_batch_size.div_ceil(self.page_size);
        if !(1..=pages_per_batch).contains(&self.trigger_page_within_batch) {
            return Err(ConfigError::ValidationError(format!(
                "pagination.trigger_page_within_batch must be within 1..={pages_per_batch}, got {}",
                self.trigger_page_within_batch
            )));
        }
        Ok(())
    }
}

/// Initial filter values
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Minimum score for the primary group
    pub relevance_threshold: f64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD,
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Backend section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendToml {
    /// Base URL of the listings backend
    pub base_url: Option<String>,
    /// Path of the batch endpoint
    pub batch_path: Option<String>,
    /// Path of the event-stream endpoint
    pub stream_path: Option<String>,
    /// Batch deadline in milliseconds
    pub request_timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
}

/// Pagination section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationToml {
    /// Items per local page
    pub page_size: Option<usize>,
    /// Items per remote batch
    pub remote_batch_size: Option<usize>,
    /// Prefetch trigger page within a batch
    pub trigger_page_within_batch: Option<usize>,
}

/// Filters section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FiltersToml {
    /// Relevance threshold
    pub relevance_threshold: Option<f64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestToml {
    /// Backend configuration section
    pub backend: BackendToml,
    /// Pagination configuration section
    pub pagination: PaginationToml,
    /// Filters configuration section
    pub filters: FiltersToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved configuration. Use [`load_config`] to build one with proper
/// priority handling.
#[derive(Clone, Debug, Default)]
pub struct HarvestConfig {
    /// Backend endpoints and timeouts
    pub backend: BackendSettings,
    /// Page and batch sizes
    pub pagination: PaginationSettings,
    /// Initial filter values
    pub filters: FilterSettings,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    source: Option<ConfigSource>,
}

impl HarvestConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the backend section
    #[must_use]
    pub fn with_backend(mut self, backend: BackendSettings) -> Self {
        self.backend = backend;
        self
    }

    /// Replace the pagination section
    #[must_use]
    pub fn with_pagination(mut self, pagination: PaginationSettings) -> Self {
        self.pagination = pagination;
        self
    }

    /// Replace the filters section
    #[must_use]
    pub fn with_filters(mut self, filters: FilterSettings) -> Self {
        self.filters = filters;
        self
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source.unwrap_or(ConfigSource::Default)
    }

    /// Validate every section
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pagination.validate()?;
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "backend.base_url must not be empty".to_string(),
            ));
        }
        if !self.filters.relevance_threshold.is_finite() {
            return Err(ConfigError::ValidationError(
                "filters.relevance_threshold must be a finite number".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/harvest/harvest.toml` or
/// `~/.config/harvest/harvest.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("harvest").join("harvest.toml"))
}

/// Load configuration from the default path, then the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the resulting values are invalid. A missing file is not an error.
pub fn load_config() -> Result<HarvestConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the resulting values are invalid.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<HarvestConfig, ConfigError> {
    let mut config = HarvestConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: HarvestToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = Some(ConfigSource::File);

            tracing::info!(path = %config_path.display(), "Loaded configuration from file");
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, |name| std::env::var(name).ok());
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut HarvestConfig, toml: &HarvestToml) {
    if let Some(ref url) = toml.backend.base_url {
        config.backend.base_url = url.clone();
    }
    if let Some(ref path) = toml.backend.batch_path {
        config.backend.batch_path = path.clone();
    }
    if let Some(ref path) = toml.backend.stream_path {
        config.backend.stream_path = path.clone();
    }
    if let Some(ms) = toml.backend.request_timeout_ms {
        config.backend.request_timeout_ms = ms;
    }
    if let Some(ms) = toml.backend.connect_timeout_ms {
        config.backend.connect_timeout_ms = ms;
    }

    if let Some(size) = toml.pagination.page_size {
        config.pagination.page_size = size;
    }
    if let Some(size) = toml.pagination.remote_batch_size {
        config.pagination.remote_batch_size = size;
    }
    if let Some(page) = toml.pagination.trigger_page_within_batch {
        config.pagination.trigger_page_within_batch = page;
    }

    if let Some(threshold) = toml.filters.relevance_threshold {
        config.filters.relevance_threshold = threshold;
    }
}

/// Apply `HARVEST_*` overrides; `lookup` reads one variable
fn apply_env_config(config: &mut HarvestConfig, lookup: impl Fn(&str) -> Option<String>) {
    let mut touched = false;

    if let Some(url) = lookup("HARVEST_BASE_URL") {
        config.backend.base_url = url;
        touched = true;
    }
    if let Some(path) = lookup("HARVEST_BATCH_PATH") {
        config.backend.batch_path = path;
        touched = true;
    }
    if let Some(path) = lookup("HARVEST_STREAM_PATH") {
        config.backend.stream_path = path;
        touched = true;
    }
    if let Some(ms) = parsed(&lookup, "HARVEST_REQUEST_TIMEOUT_MS") {
        config.backend.request_timeout_ms = ms;
        touched = true;
    }
    if let Some(ms) = parsed(&lookup, "HARVEST_CONNECT_TIMEOUT_MS") {
        config.backend.connect_timeout_ms = ms;
        touched = true;
    }
    if let Some(size) = parsed(&lookup, "HARVEST_PAGE_SIZE") {
        config.pagination.page_size = size;
        touched = true;
    }
    if let Some(size) = parsed(&lookup, "HARVEST_REMOTE_BATCH_SIZE") {
        config.pagination.remote_batch_size = size;
        touched = true;
    }
    if let Some(page) = parsed(&lookup, "HARVEST_TRIGGER_PAGE") {
        config.pagination.trigger_page_within_batch = page;
        touched = true;
    }
    if let Some(threshold) = parsed(&lookup, "HARVEST_RELEVANCE_THRESHOLD") {
        config.filters.relevance_threshold = threshold;
        touched = true;
    }

    if touched {
        config.source = Some(ConfigSource::Env);
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Base URL override
    pub base_url: Option<String>,
    /// Page size override
    pub page_size: Option<usize>,
    /// Relevance threshold override
    pub relevance_threshold: Option<f64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set page size override
    #[must_use]
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Set relevance threshold override
    #[must_use]
    pub fn with_relevance_threshold(mut self, threshold: f64) -> Self {
        self.relevance_threshold = Some(threshold);
        self
    }

    /// Apply overrides to a configuration and re-validate it
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if an override produces an
    /// invalid configuration.
    pub fn apply(&self, config: &mut HarvestConfig) -> Result<(), ConfigError> {
        if self.base_url.is_some() || self.page_size.is_some() || self.relevance_threshold.is_some()
        {
            config.source = Some(ConfigSource::Cli);
        }

        if let Some(ref url) = self.base_url {
            config.backend.base_url = url.clone();
        }
        if let Some(size) = self.page_size {
            config.pagination.page_size = size;
        }
        if let Some(threshold) = self.relevance_threshold {
            config.filters.relevance_threshold = threshold;
        }

        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = HarvestConfig::default();

        assert_eq!(config.backend.base_url, "http://localhost:8000");
        assert_eq!(config.backend.request_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.pagination.page_size, 200);
        assert_eq!(config.pagination.remote_batch_size, 900);
        assert_eq!(config.pagination.trigger_page_within_batch, 4);
        assert_eq!(config.filters.relevance_threshold, 7.0);
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_section_builders() {
        let config = HarvestConfig::default()
            .with_backend(BackendSettings {
                base_url: "http://10.0.0.5:8000".to_string(),
                ..BackendSettings::default()
            })
            .with_pagination(PaginationSettings {
                page_size: 50,
                remote_batch_size: 100,
                trigger_page_within_batch: 1,
            })
            .with_filters(FilterSettings {
                relevance_threshold: 5.0,
            });

        assert_eq!(config.backend.base_url, "http://10.0.0.5:8000");
        assert_eq!(config.pagination.page_size, 50);
        assert_eq!(config.filters.relevance_threshold, 5.0);
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(p) = default_config_path() {
            assert!(p.ends_with("harvest/harvest.toml"));
        }
    }

    #[test]
    fn test_parse_valid_toml() {
        let file = write_toml(
            r#"
[backend]
base_url = "https://listings.example.com"
request_timeout_ms = 0

[pagination]
page_size = 50
remote_batch_size = 500
trigger_page_within_batch = 8

[filters]
relevance_threshold = 6.5
"#,
        );

        let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();

        assert_eq!(config.backend.base_url, "https://listings.example.com");
        assert_eq!(config.backend.request_timeout(), None);
        assert_eq!(config.backend.batch_path, "/api/properties");
        assert_eq!(config.pagination.page_size, 50);
        assert_eq!(config.pagination.remote_batch_size, 500);
        assert_eq!(config.pagination.trigger_page_within_batch, 8);
        assert_eq!(config.filters.relevance_threshold, 6.5);
        assert_eq!(config.config_file_path, Some(file.path().to_path_buf()));
    }

    #[test]
    fn test_parse_invalid_toml() {
        let file = write_toml("[pagination\npage_size = ");
        let result = load_config_from_path(Some(file.path().to_path_buf()));
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_invalid_trigger_rejected() {
        let file = write_toml("[pagination]\ntrigger_page_within_batch = 6\n");
        let result = load_config_from_path(Some(file.path().to_path_buf()));
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from_path(Some(dir.path().join("absent.toml"))).unwrap();
        assert!(config.config_file_path.is_none());
        assert_eq!(config.pagination, PaginationSettings::default());
    }

    #[test]
    fn test_pagination_validation() {
        let zero_page = PaginationSettings {
            page_size: 0,
            ..PaginationSettings::default()
        };
        assert!(zero_page.validate().is_err());

        let zero_trigger = PaginationSettings {
            trigger_page_within_batch: 0,
            ..PaginationSettings::default()
        };
        assert!(zero_trigger.validate().is_err());

        let last_page = PaginationSettings {
            trigger_page_within_batch: 5,
            ..PaginationSettings::default()
        };
        assert!(last_page.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = HarvestConfig::default();
        apply_env_config(
            &mut config,
            env(&[
                ("HARVEST_BASE_URL", "http://10.0.0.2:9000"),
                ("HARVEST_PAGE_SIZE", "100"),
                ("HARVEST_RELEVANCE_THRESHOLD", "8"),
            ]),
        );

        assert_eq!(config.backend.base_url, "http://10.0.0.2:9000");
        assert_eq!(config.pagination.page_size, 100);
        assert_eq!(config.filters.relevance_threshold, 8.0);
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_env_ignores_unparseable_values() {
        let mut config = HarvestConfig::default();
        apply_env_config(&mut config, env(&[("HARVEST_PAGE_SIZE", "lots")]));
        assert_eq!(config.pagination.page_size, 200);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = HarvestConfig::default();
        ConfigOverrides::new()
            .with_base_url("http://127.0.0.1:1234")
            .with_relevance_threshold(5.0)
            .apply(&mut config)
            .unwrap();

        assert_eq!(config.backend.base_url, "http://127.0.0.1:1234");
        assert_eq!(config.filters.relevance_threshold, 5.0);
        assert_eq!(config.source(), ConfigSource::Cli);

        let bad = ConfigOverrides::new().with_page_size(0).apply(&mut config);
        assert!(bad.is_err());
    }
}
