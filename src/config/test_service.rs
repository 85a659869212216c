//! Test configuration service for isolated testing.
//!
//! Provides a [`TestConfigService`] holding a fixed in-memory configuration
//! and a [`TestConfigBuilder`] for assembling one fluently, so tests never
//! touch the filesystem or the process environment.

use crate::Result;
use crate::config::{Config, ConfigService, RetentionPolicy};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Configuration service returning a fixed, caller-supplied configuration.
pub struct TestConfigService {
    config: RwLock<Config>,
}

impl TestConfigService {
    /// Create a service wrapping the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    /// Create a service with all-default configuration.
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// Replace the wrapped configuration.
    pub fn set_config(&self, config: Config) {
        *self.config.write().unwrap() = config;
    }
}

impl ConfigService for TestConfigService {
    fn get_config(&self) -> Result<Config> {
        Ok(self.config.read().unwrap().clone())
    }

    fn reload(&self) -> Result<()> {
        Ok(())
    }

    fn get_config_file_path(&self) -> Result<PathBuf> {
        Ok(PathBuf::from("/dev/null"))
    }

    fn save_config_to_file(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// Fluent builder for test configurations.
#[derive(Default)]
pub struct TestConfigBuilder {
    config: Config,
}

impl TestConfigBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the worker count.
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.config.workers.max_workers = workers;
        self
    }

    /// Set the tabular field separator.
    pub fn with_field_separator(mut self, sep: &str) -> Self {
        self.config.general.field_separator = sep.to_string();
        self
    }

    /// Set the intermediary retention policy.
    pub fn with_retention(mut self, policy: RetentionPolicy) -> Self {
        self.config.general.retention = policy;
        self
    }

    /// Set the STT provider and model.
    pub fn with_stt(mut self, provider: &str, model: &str) -> Self {
        self.config.stt.provider = provider.to_string();
        self.config.stt.model = model.to_string();
        self
    }

    /// Set the STT base URL (handy with wiremock).
    pub fn with_stt_base_url(mut self, url: &str) -> Self {
        self.config.stt.base_url = url.to_string();
        self
    }

    /// Set the separation provider.
    pub fn with_separation(mut self, provider: &str) -> Self {
        self.config.separation.provider = provider.to_string();
        self
    }

    /// Set the separation base URL.
    pub fn with_separation_base_url(mut self, url: &str) -> Self {
        self.config.separation.base_url = url.to_string();
        self
    }

    /// Set the transliteration base URL.
    pub fn with_translit_base_url(mut self, url: &str) -> Self {
        self.config.translit.base_url = url.to_string();
        self
    }

    /// Finish and return the configuration.
    pub fn build(self) -> Config {
        self.config
    }

    /// Finish and wrap the configuration in a [`TestConfigService`].
    pub fn build_service(self) -> TestConfigService {
        TestConfigService::new(self.config)
    }
}
