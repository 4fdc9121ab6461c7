//! Application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::args::CliArgs;
use crate::domain::entities::FetchPriority;
use crate::infrastructure::image::disk_cache::{
    DEFAULT_MAX_CACHE_SIZE, DEFAULT_MAX_FILE_AGE, ReclaimPolicy, default_cache_dir,
};
use crate::infrastructure::image::memory_cache::DEFAULT_MEMORY_BUDGET;
use crate::infrastructure::image::ImageLoaderConfig;

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration, loaded from TOML and overridden by CLI.
#[derive(Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Priority used when none is given explicitly.
    #[serde(default)]
    pub default_priority: FetchPriority,

    /// Cache tier configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Download configuration.
    #[serde(default)]
    pub network: NetworkConfig,
}

/// Cache tier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Memory tier budget in bytes.
    #[serde(default = "default_memory_budget")]
    pub memory_budget: u64,

    /// Disk tier budget in bytes.
    #[serde(default = "default_disk_budget")]
    pub disk_budget: u64,

    /// Maximum age of a disk cache file in seconds.
    #[serde(default = "default_max_file_age_secs")]
    pub max_file_age_secs: u64,

    /// Persist downloads to disk immediately.
    #[serde(default = "default_true")]
    pub write_through: bool,

    /// Capacity of the eviction queue.
    #[serde(default = "default_eviction_queue")]
    pub eviction_queue: usize,

    /// Disk cache directory. Defaults to the platform cache directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_budget: default_memory_budget(),
            disk_budget: default_disk_budget(),
            max_file_age_secs: default_max_file_age_secs(),
            write_through: true,
            eviction_queue: default_eviction_queue(),
            cache_dir: None,
        }
    }
}

/// Download configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Maximum concurrent throttled downloads.
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,

    /// Maximum concurrent background downloads.
    #[serde(default = "default_max_background_downloads")]
    pub max_background_downloads: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent_downloads(),
            max_background_downloads: default_max_background_downloads(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl NetworkConfig {
    /// Returns the request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

const fn default_memory_budget() -> u64 {
    DEFAULT_MEMORY_BUDGET
}

const fn default_disk_budget() -> u64 {
    DEFAULT_MAX_CACHE_SIZE
}

const fn default_max_file_age_secs() -> u64 {
    DEFAULT_MAX_FILE_AGE.as_secs()
}

const fn default_true() -> bool {
    true
}

const fn default_eviction_queue() -> usize {
    256
}

const fn default_max_concurrent_downloads() -> usize {
    4
}

const fn default_max_background_downloads() -> usize {
    2
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("{}/{}", crate::NAME, crate::VERSION)
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(priority) = args.priority {
            self.default_priority = priority;
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.cache.cache_dir = Some(cache_dir.clone());
        }
        if let Some(memory_budget) = args.memory_budget {
            self.cache.memory_budget = memory_budget;
        }
        if let Some(disk_budget) = args.disk_budget {
            self.cache.disk_budget = disk_budget;
        }
        if let Some(max_file_age_secs) = args.max_file_age_secs {
            self.cache.max_file_age_secs = max_file_age_secs;
        }
        if let Some(write_through) = args.write_through {
            self.cache.write_through = write_through;
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(crate::APP_QUALIFIER, crate::APP_ORGANIZATION, crate::NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(crate::APP_QUALIFIER, crate::APP_ORGANIZATION, crate::NAME)
            .map(|dirs| dirs.data_dir().join(format!("{}.log", crate::NAME)))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }

    /// Returns effective disk cache directory.
    #[must_use]
    pub fn effective_cache_dir(&self) -> PathBuf {
        self.cache.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }

    /// Builds the disk reclamation policy.
    #[must_use]
    pub const fn reclaim_policy(&self) -> ReclaimPolicy {
        ReclaimPolicy {
            max_size: self.cache.disk_budget,
            max_age: Duration::from_secs(self.cache.max_file_age_secs),
        }
    }

    /// Builds the loader configuration.
    #[must_use]
    pub const fn loader_config(&self) -> ImageLoaderConfig {
        ImageLoaderConfig {
            memory_budget: self.cache.memory_budget,
            max_concurrent_downloads: self.network.max_concurrent_downloads,
            max_background_downloads: self.network.max_background_downloads,
            write_through: self.cache.write_through,
            eviction_queue: self.cache.eviction_queue,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::Info,
            default_priority: FetchPriority::default(),
            cache: CacheConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_partial_config() {
        let toml_content = r#"
            log_level = "debug"
            default_priority = "background"

            [cache]
            memory_budget = 1024
            write_through = false
            cache_dir = "/tmp/feedimg-test"

            [network]
            timeout_secs = 5
        "#;

        let config: AppConfig = toml::from_str(toml_content).expect("Failed to parse config");

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.default_priority, FetchPriority::Background);
        assert_eq!(config.cache.memory_budget, 1024);
        assert!(!config.cache.write_through);
        assert_eq!(config.cache.disk_budget, DEFAULT_MAX_CACHE_SIZE);
        assert_eq!(config.effective_cache_dir(), PathBuf::from("/tmp/feedimg-test"));
        assert_eq!(config.network.timeout(), Duration::from_secs(5));
        assert_eq!(config.network.max_concurrent_downloads, 4);
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.default_priority, FetchPriority::Normal);
        assert!(config.cache.write_through); // default_true
        assert_eq!(config.cache.max_file_age_secs, 7 * 24 * 60 * 60);
        assert!(config.network.user_agent.starts_with("feedimg/"));

        let policy = config.reclaim_policy();
        assert_eq!(policy.max_size, DEFAULT_MAX_CACHE_SIZE);
        assert_eq!(policy.max_age, DEFAULT_MAX_FILE_AGE);
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let content = toml::to_string_pretty(&AppConfig::default()).unwrap();
        let parsed: AppConfig = toml::from_str(&content).unwrap();

        assert_eq!(parsed.cache.memory_budget, DEFAULT_MEMORY_BUDGET);
        assert_eq!(parsed.network.max_background_downloads, 2);
    }

    #[test]
    fn test_cli_overrides_file_values() {
        let mut config = AppConfig::default();
        let args = CliArgs::parse_from([
            "feedimg",
            "--memory-budget",
            "2048",
            "--priority",
            "elevated",
            "--write-through",
            "false",
            "--max-file-age-secs",
            "60",
            "https://img.test/a.png",
        ]);

        config.merge_with_args(&args);

        assert_eq!(config.cache.memory_budget, 2048);
        assert_eq!(config.default_priority, FetchPriority::Elevated);
        assert!(!config.cache.write_through);
        assert_eq!(config.reclaim_policy().max_age, Duration::from_secs(60));
        assert_eq!(config.loader_config().memory_budget, 2048);
        assert_eq!(args.urls, vec!["https://img.test/a.png".to_string()]);
    }
}
