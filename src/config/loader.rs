//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources, later ones winning:
//!
//! 1. built-in defaults
//! 2. `<dir>/periodic.{toml,yaml,json}`
//! 3. `<dir>/periodic.<environment>.{toml,yaml,json}`
//! 4. environment variables such as `PERIODIC__POOL__WORKER_THREADS=8`

use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::PeriodicConfig;
use crate::error::{PeriodicError, Result};

const CONFIG_FILE_STEM: &str = "periodic";
const ENV_PREFIX: &str = "PERIODIC";
const ENV_SEPARATOR: &str = "__";
const CONFIG_EXTENSIONS: [&str; 4] = ["toml", "yaml", "yml", "json"];

pub struct ConfigManager {
    config: PeriodicConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> Result<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> Result<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> Result<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            worker_threads = config.pool.worker_threads,
            default_batch_size = config.dispatch.default_batch_size,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Manager over an already built configuration.
    pub fn from_config(config: PeriodicConfig) -> Result<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: Self::default_config_directory(),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &PeriodicConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    fn load_and_merge_config(config_directory: &Path, environment: &str) -> Result<PeriodicConfig> {
        let mut builder = Config::builder();
        for stem in [
            CONFIG_FILE_STEM.to_string(),
            format!("{CONFIG_FILE_STEM}.{environment}"),
        ] {
            for path in Self::config_files(config_directory, &stem) {
                debug!("Merging configuration file: {}", path.display());
                builder = builder.add_source(File::from(path));
            }
        }

        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| PeriodicError::ConfigurationError(e.to_string()))
    }

    /// Existing `<stem>.<ext>` files for every supported format.
    fn config_files(config_directory: &Path, stem: &str) -> Vec<PathBuf> {
        CONFIG_EXTENSIONS
            .iter()
            .map(|ext| config_directory.join(format!("{stem}.{ext}")))
            .filter(|path| path.is_file())
            .collect()
    }

    /// Get current environment from environment variables
    pub fn detect_environment() -> String {
        crate::logging::get_environment()
    }

    fn default_config_directory() -> PathBuf {
        env::var("PERIODIC_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }
}
