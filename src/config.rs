//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::elastic::ElasticConfig;
use crate::query::{Interval, QueryDefaults, DEFAULT_PRECISION_THRESHOLD, DEFAULT_TERMS_SIZE};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,

    #[serde(default)]
    pub indexes: IndexesConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Search cluster connection
#[derive(Debug, Clone, Deserialize)]
pub struct ElasticsearchConfig {
    #[serde(default = "default_es_url")]
    pub url: String,

    pub username: Option<String>,

    pub password: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_es_url() -> String {
    "http://127.0.0.1:9200".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: default_es_url(),
            username: None,
            password: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ElasticsearchConfig {
    pub fn to_client_config(&self) -> ElasticConfig {
        ElasticConfig {
            base_url: self.url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            request_timeout_ms: self.request_timeout_secs * 1000,
        }
    }
}

/// Names of the enriched indexes
#[derive(Debug, Clone, Deserialize)]
pub struct IndexesConfig {
    #[serde(default = "default_git_index")]
    pub git: String,

    #[serde(default = "default_issues_index")]
    pub github_issues: String,
}

fn default_git_index() -> String {
    "git_enriched".to_string()
}

fn default_issues_index() -> String {
    "github_issues_enriched".to_string()
}

impl Default for IndexesConfig {
    fn default() -> Self {
        Self {
            git: default_git_index(),
            github_issues: default_issues_index(),
        }
    }
}

/// Defaults applied to every query
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_interval")]
    pub interval: Interval,

    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    pub offset: Option<String>,

    #[serde(default = "default_terms_size")]
    pub terms_size: u32,

    #[serde(default = "default_precision_threshold")]
    pub precision_threshold: u32,

    /// Entries kept in top authors / organizations lists
    #[serde(default = "default_top_size")]
    pub top_size: usize,
}

fn default_interval() -> Interval {
    Interval::Month
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

fn default_terms_size() -> u32 {
    DEFAULT_TERMS_SIZE
}

fn default_precision_threshold() -> u32 {
    DEFAULT_PRECISION_THRESHOLD
}

fn default_top_size() -> usize {
    10
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            time_zone: default_time_zone(),
            offset: None,
            terms_size: default_terms_size(),
            precision_threshold: default_precision_threshold(),
            top_size: default_top_size(),
        }
    }
}

impl QueryConfig {
    /// Query defaults without date bounds
    pub fn to_defaults(&self) -> QueryDefaults {
        QueryDefaults {
            interval: self.interval,
            offset: self.offset.clone(),
            time_zone: self.time_zone.clone(),
            terms_size: self.terms_size,
            precision_threshold: self.precision_threshold,
            since: None,
            until: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment.
    ///
    /// Runs before logging is set up, so nothing is logged here; the caller
    /// reports the outcome (see [`LoadedConfig::log`]).
    pub fn load_default() -> LoadedConfig {
        let config_paths: Vec<PathBuf> = [
            dirs::config_dir().map(|p| p.join("manuscripts").join("config.toml")),
            Some(PathBuf::from("/etc/manuscripts/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self::load_first(&config_paths)
    }

    /// Load the first existing file of `paths` that parses, remembering the
    /// ones that failed
    pub fn load_first(paths: &[PathBuf]) -> LoadedConfig {
        let mut failures = Vec::new();

        for path in paths.iter().filter(|p| p.exists()) {
            match Self::load_with_env(path) {
                Ok(config) => {
                    return LoadedConfig {
                        config,
                        path: Some(path.clone()),
                        failures,
                    }
                }
                Err(e) => failures.push(e),
            }
        }

        LoadedConfig {
            config: Self::from_env(),
            path: None,
            failures,
        }
    }

    /// Apply environment variable overrides to an existing config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Elasticsearch overrides
        if let Some(url) = var("MANUSCRIPTS_ES_URL") {
            self.elasticsearch.url = url;
        }
        if let Some(user) = var("MANUSCRIPTS_ES_USER") {
            self.elasticsearch.username = Some(user);
        }
        if let Some(password) = var("MANUSCRIPTS_ES_PASSWORD") {
            self.elasticsearch.password = Some(password);
        }

        // Index overrides
        if let Some(git) = var("MANUSCRIPTS_GIT_INDEX") {
            self.indexes.git = git;
        }
        if let Some(issues) = var("MANUSCRIPTS_ISSUES_INDEX") {
            self.indexes.github_issues = issues;
        }

        // Logging overrides
        if let Some(level) = var("MANUSCRIPTS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("MANUSCRIPTS_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Result of searching the default config locations
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Config,
    /// File the config came from, `None` for defaults plus environment
    pub path: Option<PathBuf>,
    /// Files that exist but could not be loaded
    pub failures: Vec<ConfigError>,
}

impl LoadedConfig {
    /// Report where the config came from and every file that was skipped
    pub fn log(&self) {
        for failure in &self.failures {
            tracing::warn!("Skipping config file: {}", failure);
        }
        match &self.path {
            Some(path) => tracing::info!("Loaded config from {:?}", path),
            None => tracing::info!("Using default config with environment overrides"),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Manuscripts Configuration
#
# Environment variables override these settings:
# - MANUSCRIPTS_ES_URL
# - MANUSCRIPTS_ES_USER
# - MANUSCRIPTS_ES_PASSWORD
# - MANUSCRIPTS_GIT_INDEX
# - MANUSCRIPTS_ISSUES_INDEX
# - MANUSCRIPTS_LOG_LEVEL
# - MANUSCRIPTS_LOG_FORMAT

[elasticsearch]
# Cluster URL
url = "http://127.0.0.1:9200"

# Optional basic auth credentials
# username = "admin"
# password = "admin"

# Request timeout in seconds
request_timeout_secs = 30

[indexes]
# Enriched git index
git = "git_enriched"

# Enriched GitHub issues index
github_issues = "github_issues_enriched"

[query]
# Histogram interval: minute, hour, day, week, month, quarter, year
interval = "month"

# Time zone of histogram buckets
time_zone = "UTC"

# Optional bucket offset
# offset = "+2d"

# Buckets returned by terms aggregations
terms_size = 10000

# Precision threshold of cardinality aggregations
precision_threshold = 3000

# Entries in top authors / organizations lists
top_size = 10

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/manuscripts/manuscripts.log"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();

        assert_eq!(config.elasticsearch.url, "http://127.0.0.1:9200");
        assert_eq!(config.indexes.git, "git_enriched");
        assert_eq!(config.query.interval, Interval::Month);
        assert_eq!(config.query.terms_size, 10000);
        assert_eq!(config.query.to_defaults(), QueryDefaults::default());
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[elasticsearch]\nurl = \"https://es.example.com\"\nusername = \"reader\"\n\n[query]\ninterval = \"week\"\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.elasticsearch.url, "https://es.example.com");
        assert_eq!(config.elasticsearch.username.as_deref(), Some("reader"));
        assert_eq!(config.query.interval, Interval::Week);
        assert_eq!(config.query.precision_threshold, 3000);
        assert_eq!(config.indexes.github_issues, "github_issues_enriched");

        let client = config.elasticsearch.to_client_config();
        assert_eq!(client.request_timeout_ms, 30_000);
    }

    #[test]
    fn test_load_errors() {
        let missing = Config::load(Path::new("/nonexistent/manuscripts.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[query]\ninterval = \"fortnight\"").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_first_reports_bad_file() {
        let mut bad = NamedTempFile::new().unwrap();
        writeln!(bad, "[query]\ninterval = \"fortnight\"").unwrap();
        let mut good = NamedTempFile::new().unwrap();
        writeln!(good, "[indexes]\ngit = \"git_2018\"").unwrap();

        let loaded = Config::load_first(&[
            PathBuf::from("/nonexistent/manuscripts.toml"),
            bad.path().to_path_buf(),
            good.path().to_path_buf(),
        ]);

        assert_eq!(loaded.path.as_deref(), Some(good.path()));
        assert_eq!(loaded.config.indexes.git, "git_2018");
        assert_eq!(loaded.failures.len(), 1);
        assert!(matches!(
            &loaded.failures[0],
            ConfigError::Parse { path, .. } if path == bad.path()
        ));
    }

    #[test]
    fn test_load_first_falls_back_to_defaults() {
        let mut bad = NamedTempFile::new().unwrap();
        writeln!(bad, "not toml at all [").unwrap();

        let loaded = Config::load_first(&[bad.path().to_path_buf()]);

        assert!(loaded.path.is_none());
        assert_eq!(loaded.failures.len(), 1);
        assert_eq!(loaded.config.query.interval, Interval::Month);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MANUSCRIPTS_ES_URL", "http://search:9200"),
            ("MANUSCRIPTS_ES_PASSWORD", "secret"),
            ("MANUSCRIPTS_ISSUES_INDEX", "issues_2018"),
            ("MANUSCRIPTS_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.elasticsearch.url, "http://search:9200");
        assert_eq!(config.elasticsearch.password.as_deref(), Some("secret"));
        assert!(config.elasticsearch.username.is_none());
        assert_eq!(config.indexes.github_issues, "issues_2018");
        assert_eq!(config.indexes.git, "git_enriched");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }
}
