//! Configuration service system for dependency injection and test isolation.
//!
//! This module provides a clean abstraction for configuration management
//! that enables dependency injection and complete test isolation without
//! requiring unsafe code or global state resets.

use crate::config::{Config, EnvironmentProvider, SystemEnvironmentProvider};
use crate::{Result, error::SubLingoError};
use config::{Config as ConfigCrate, File};
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Configuration service trait for dependency injection.
///
/// Abstracts configuration loading and reloading, allowing different
/// implementations for production and testing environments.
pub trait ConfigService: Send + Sync {
    /// Get the current configuration.
    ///
    /// Returns the current [`Config`] instance loaded from files,
    /// environment variables, and defaults.
    fn get_config(&self) -> Result<Config>;

    /// Force a reload of configuration from all sources, discarding any
    /// cached values.
    fn reload(&self) -> Result<()>;

    /// Get the default configuration file path
    /// (typically `$CONFIG_DIR/sublingo/config.toml`).
    fn get_config_file_path(&self) -> Result<PathBuf>;

    /// Save configuration to a specific file path.
    fn save_config_to_file(&self, path: &Path) -> Result<()>;
}

/// Production configuration service implementation.
///
/// Loads configuration from the user configuration file with environment
/// overrides applied on top; the result is cached after first load.
pub struct ProductionConfigService {
    env: Box<dyn EnvironmentProvider>,
    config_path: Option<PathBuf>,
    cached_config: Arc<RwLock<Option<Config>>>,
}

impl ProductionConfigService {
    /// Create a new production configuration service reading the default
    /// config file location and the process environment.
    pub fn new() -> Result<Self> {
        Ok(Self {
            env: Box::new(SystemEnvironmentProvider::new()),
            config_path: None,
            cached_config: Arc::new(RwLock::new(None)),
        })
    }

    /// Create a service reading an explicit configuration file path.
    pub fn with_config_path(path: PathBuf) -> Self {
        Self {
            env: Box::new(SystemEnvironmentProvider::new()),
            config_path: Some(path),
            cached_config: Arc::new(RwLock::new(None)),
        }
    }

    fn default_config_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| SubLingoError::config("Unable to determine config directory"))?;
        Ok(base.join("sublingo").join("config.toml"))
    }

    fn load(&self) -> Result<Config> {
        let path = match &self.config_path {
            Some(p) => p.clone(),
            None => Self::default_config_path()?,
        };

        let mut config = if path.exists() {
            debug!("loading configuration from {}", path.display());
            let raw = ConfigCrate::builder()
                .add_source(File::from(path.clone()))
                .build()?;
            let mut config: Config = raw.try_deserialize()?;
            config.loaded_from = Some(path);
            config
        } else {
            debug!("no configuration file at {}, using defaults", path.display());
            Config::default()
        };

        config.apply_environment(self.env.as_ref());
        Ok(config)
    }
}

impl ConfigService for ProductionConfigService {
    fn get_config(&self) -> Result<Config> {
        {
            let cached = self.cached_config.read().unwrap();
            if let Some(config) = cached.as_ref() {
                return Ok(config.clone());
            }
        }
        let config = self.load()?;
        *self.cached_config.write().unwrap() = Some(config.clone());
        Ok(config)
    }

    fn reload(&self) -> Result<()> {
        let config = self.load()?;
        *self.cached_config.write().unwrap() = Some(config);
        Ok(())
    }

    fn get_config_file_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(p) => Ok(p.clone()),
            None => Self::default_config_path(),
        }
    }

    fn save_config_to_file(&self, path: &Path) -> Result<()> {
        let config = self.get_config()?;
        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| SubLingoError::config(format!("TOML serialization failed: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}
