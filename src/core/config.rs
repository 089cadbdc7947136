//! Configuration management

use clap::Parser;
use config::{Config as ConfigBuilder, ConfigError as BuilderError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid database configuration: {0}")]
    InvalidDatabase(String),

    #[error("Invalid processing configuration: {0}")]
    InvalidProcessing(String),

    #[error("Invalid logging configuration: {0}")]
    InvalidLogging(String),

    #[error("Invalid storage configuration: {0}")]
    InvalidStorage(String),

    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

impl From<BuilderError> for ConfigError {
    fn from(err: BuilderError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub processing: ProcessingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub connection_pool_size: usize,
    /// Busy timeout in milliseconds
    pub busy_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    /// TTL for cached indexer search results, in seconds
    pub indexer_results_ttl: u64,
    /// TTL for cached metadata lookups and searches, in seconds
    pub metadata_ttl: u64,
    /// TTL for blacklisted (indexer, guid) pairs, in seconds
    pub blacklist_ttl: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
    pub log_file: Option<PathBuf>,
}

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "longbox", about = "Self-hosted comic library manager")]
struct CliArgs {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the SQLite database
    #[arg(long)]
    database: Option<PathBuf>,

    /// Data directory (library metadata, cache)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Config {
    /// Load configuration with precedence: CLI args > Environment variables > Config file > Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        Self::load_with_args(cli_args)
    }

    fn load_with_args(cli_args: CliArgs) -> Result<Self, ConfigError> {
        let mut builder = Self::defaults()?;

        // Config file (medium priority)
        if let Some(config_path) = &cli_args.config {
            if !config_path.exists() {
                return Err(ConfigError::FileNotFound(config_path.display().to_string()));
            }
            builder = builder.add_source(File::from(config_path.as_path()));
        }

        // Environment variables, prefixed with LONGBOX_ and using __ for nesting
        // Example: LONGBOX_DATABASE__PATH=/var/lib/longbox/longbox.db
        builder = builder.add_source(
            Environment::with_prefix("LONGBOX")
                .separator("__")
                .try_parsing(true),
        );

        // CLI arguments (highest priority)
        if let Some(db_path) = &cli_args.database {
            builder = builder.set_override("database.path", db_path.display().to_string())?;
        }
        if let Some(data_dir) = &cli_args.data_dir {
            builder = builder.set_override("storage.data_dir", data_dir.display().to_string())?;
        }
        if let Some(log_level) = &cli_args.log_level {
            builder = builder.set_override("logging.level", log_level.clone())?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let config: Config = Self::defaults()?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Default values only, no external sources
    pub fn default_config() -> Result<Self, ConfigError> {
        let config: Config = Self::defaults()?.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Ok(ConfigBuilder::builder()
            .set_default("database.path", "./data/longbox.db")?
            .set_default("database.connection_pool_size", 10)?
            .set_default("database.busy_timeout", 5000)?
            .set_default("storage.data_dir", "./data")?
            .set_default("storage.cache_dir", "./data/cache")?
            .set_default("processing.indexer_results_ttl", 3600)?
            .set_default("processing.metadata_ttl", 604800)? // 7 days
            .set_default("processing.blacklist_ttl", 3600)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "text")?
            .set_default("logging.output", "stdout")?)
    }

    /// Validate the configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.connection_pool_size == 0 {
            return Err(ConfigError::InvalidDatabase(
                "connection_pool_size must be greater than 0".to_string(),
            ));
        }

        if self.processing.indexer_results_ttl == 0 {
            return Err(ConfigError::InvalidProcessing(
                "indexer_results_ttl must be greater than 0".to_string(),
            ));
        }
        if self.processing.blacklist_ttl == 0 {
            return Err(ConfigError::InvalidProcessing(
                "blacklist_ttl must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::InvalidLogging(format!(
                    "unknown log level: {}",
                    other
                )));
            }
        }
        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => {
                return Err(ConfigError::InvalidLogging(format!(
                    "unknown log format: {}",
                    other
                )));
            }
        }
        match self.logging.output.as_str() {
            "stdout" => {}
            "file" => {
                if self.logging.log_file.is_none() {
                    return Err(ConfigError::InvalidLogging(
                        "log_file must be set when output is 'file'".to_string(),
                    ));
                }
            }
            other => {
                return Err(ConfigError::InvalidLogging(format!(
                    "unknown log output: {}",
                    other
                )));
            }
        }

        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidStorage(
                "data_dir must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_load_and_validate() {
        let config = Config::default_config().unwrap();
        assert_eq!(config.database.connection_pool_size, 10);
        assert_eq!(config.processing.indexer_results_ttl, 3600);
        assert_eq!(config.processing.metadata_ttl, 604800);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.storage.cache_dir, PathBuf::from("./data/cache"));
    }

    #[test]
    fn test_validate_rejects_zero_pool() {
        let mut config = Config::default_config().unwrap();
        config.database.connection_pool_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDatabase(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_level() {
        let mut config = Config::default_config().unwrap();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogging(_))
        ));
    }

    #[test]
    fn test_validate_file_output_requires_path() {
        let mut config = Config::default_config().unwrap();
        config.logging.output = "file".to_string();
        config.logging.log_file = None;
        assert!(config.validate().is_err());

        config.logging.log_file = Some(PathBuf::from("./logs/longbox.log"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file(Path::new("/nonexistent/longbox.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("longbox.toml");
        std::fs::write(
            &path,
            "[processing]\nindexer_results_ttl = 120\n\n[logging]\nformat = \"json\"\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.processing.indexer_results_ttl, 120);
        assert_eq!(config.logging.format, "json");
        // Untouched sections keep their defaults
        assert_eq!(config.database.connection_pool_size, 10);
    }
}
