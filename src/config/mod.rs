// src/config/mod.rs
//! Configuration management module for sublingo.
//!
//! This module provides the configuration service system with dependency
//! injection support and the typed settings consumed by the processing
//! engine: worker counts, provider credentials and endpoints, resolved
//! external binaries, and intermediary-file retention.
//!
//! # Key Components
//!
//! - [`Config`] - Main configuration structure containing all settings
//! - [`ConfigService`] - Service interface for configuration management
//! - [`ProductionConfigService`] - Production implementation with file I/O
//! - [`TestConfigService`] - Test implementation with controlled behavior
//!
//! # Architecture
//!
//! All configuration access goes through the [`ConfigService`] trait so
//! tests can inject fully controlled configurations without touching the
//! filesystem or process environment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod environment;
pub mod service;
pub mod test_service;

pub use environment::{EnvironmentProvider, SystemEnvironmentProvider, TestEnvironmentProvider};
pub use service::{ConfigService, ProductionConfigService};
pub use test_service::{TestConfigBuilder, TestConfigService};

/// Environment variable carrying the STT provider API key.
pub const ENV_STT_API_KEY: &str = "SUBLINGO_STT_API_KEY";
/// Environment variable carrying the separation provider API key.
pub const ENV_SEP_API_KEY: &str = "SUBLINGO_SEP_API_KEY";
/// Environment variable carrying the transliteration provider API key.
pub const ENV_TRANSLIT_API_KEY: &str = "SUBLINGO_TRANSLIT_API_KEY";
/// Environment variable switching every provider to its mock implementation.
pub const ENV_TEST_PROVIDERS: &str = "SUBLINGO_TEST_PROVIDERS";
/// Environment variable enabling the deterministic performance summary.
pub const ENV_PROFILE: &str = "SUBLINGO_PROFILE";

/// Interpret a flag-style environment value.
///
/// Any of `1`, `true`, `yes` (case-insensitive) activates the flag.
pub fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes")
}

/// Full application configuration for sublingo.
///
/// This struct aggregates all settings for worker concurrency, remote
/// providers, external binaries, and general runtime options.
///
/// # Serialization
///
/// This struct can be serialized to/from TOML format for configuration files.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// General runtime options (field separator, retention policy).
    pub general: GeneralConfig,
    /// Worker pool parameters.
    pub workers: WorkersConfig,
    /// Speech-to-text provider settings.
    pub stt: SttConfig,
    /// Source separation provider settings.
    pub separation: SeparationConfig,
    /// Transliteration provider settings.
    pub translit: TranslitConfig,
    /// Resolved external binary paths.
    pub binaries: BinariesConfig,
    /// Optional file path from which the configuration was loaded.
    pub loaded_from: Option<PathBuf>,
}

/// General runtime options.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GeneralConfig {
    /// Field separator for the tabular output file. Tab produces `.tsv`,
    /// anything else `.csv`.
    pub field_separator: String,
    /// Intermediary-file retention policy.
    pub retention: RetentionPolicy,
    /// Global timing offset in milliseconds applied to cue extraction.
    pub timing_offset_ms: i64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            field_separator: "\t".to_string(),
            retention: RetentionPolicy::Keep,
            timing_offset_ms: 0,
        }
    }
}

/// What happens to intermediary files once a task completes.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RetentionPolicy {
    /// Keep everything on disk.
    Keep,
    /// Delete intermediaries after a successful merge.
    DeleteAfterMerge,
    /// Delete only the resumption (tabular) file.
    DeleteResumptionOnly,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy::Keep
    }
}

/// Worker pool parameters.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct WorkersConfig {
    /// Maximum concurrent per-cue workers. Zero means CPU count − 1.
    pub max_workers: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self { max_workers: 0 }
    }
}

impl WorkersConfig {
    /// Resolve the effective worker count.
    pub fn effective_workers(&self) -> usize {
        if self.max_workers > 0 {
            self.max_workers
        } else {
            num_cpus::get().saturating_sub(1).max(1)
        }
    }
}

/// Speech-to-text provider settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SttConfig {
    /// Provider name (e.g. "whisper"; alias "wh").
    pub provider: String,
    /// Model selection passed to the provider.
    pub model: String,
    /// API key for authentication.
    pub api_key: Option<String>,
    /// API base URL.
    pub base_url: String,
    /// Per-attempt HTTP timeout in seconds.
    pub timeout_seconds: u64,
    /// Number of retries on request failure.
    pub max_retries: u32,
    /// Base retry interval in milliseconds.
    pub retry_delay_ms: u64,
    /// Optional priming prompt submitted with each transcription.
    pub initial_prompt: Option<String>,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            provider: "whisper".to_string(),
            model: "large-v3".to_string(),
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_seconds: 120,
            max_retries: 3,
            retry_delay_ms: 1000,
            initial_prompt: None,
        }
    }
}

/// Source separation provider settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SeparationConfig {
    /// Provider name (e.g. "demucs", "demucs_ft", "spleeter"; alias "de").
    pub provider: String,
    /// API key for authentication.
    pub api_key: Option<String>,
    /// API base URL.
    pub base_url: String,
    /// Per-attempt HTTP timeout in seconds. Separation jobs are slow.
    pub timeout_seconds: u64,
    /// Number of retries on request failure.
    pub max_retries: u32,
    /// Base retry interval in milliseconds.
    pub retry_delay_ms: u64,
    /// Gain in dB applied to the isolated voice track when mixing.
    pub voice_gain_db: f64,
    /// Gain in dB applied to the original bed when mixing (usually negative).
    pub original_gain_db: f64,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            provider: "demucs".to_string(),
            api_key: None,
            base_url: "https://api.sublingo.dev/separate".to_string(),
            timeout_seconds: 600,
            max_retries: 2,
            retry_delay_ms: 2000,
            voice_gain_db: 6.0,
            original_gain_db: -6.0,
        }
    }
}

/// Transliteration provider settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TranslitConfig {
    /// Provider name (e.g. "ichiran" for Japanese, "generic").
    pub provider: String,
    /// API key for authentication.
    pub api_key: Option<String>,
    /// API base URL.
    pub base_url: String,
    /// Per-attempt HTTP timeout in seconds.
    pub timeout_seconds: u64,
    /// Number of retries on request failure.
    pub max_retries: u32,
    /// Base retry interval in milliseconds.
    pub retry_delay_ms: u64,
    /// Kanji corpus frequency rank above which selective transliteration
    /// romanizes a character (Japanese back-end only).
    pub kanji_frequency_threshold: u32,
    /// Maximum characters submitted per chunk for providers without
    /// native progress reporting.
    pub chunk_chars: usize,
}

impl Default for TranslitConfig {
    fn default() -> Self {
        Self {
            provider: "ichiran".to_string(),
            api_key: None,
            base_url: "http://localhost:13535".to_string(),
            timeout_seconds: 60,
            max_retries: 3,
            retry_delay_ms: 1000,
            kanji_frequency_threshold: 1000,
            chunk_chars: 4000,
        }
    }
}

/// Resolved external binary paths, constructed once at startup.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BinariesConfig {
    /// FFmpeg-compatible transmuxer/encoder binary.
    pub transmuxer: String,
    /// MediaInfo-compatible probe binary.
    pub probe: String,
}

impl Default for BinariesConfig {
    fn default() -> Self {
        Self {
            transmuxer: "ffmpeg".to_string(),
            probe: "mediainfo".to_string(),
        }
    }
}

impl Config {
    /// Apply environment overrides through the given provider.
    ///
    /// API keys from the environment win over file-configured values.
    pub fn apply_environment(&mut self, env: &dyn EnvironmentProvider) {
        if let Some(key) = env.get_var(ENV_STT_API_KEY) {
            self.stt.api_key = Some(key);
        }
        if let Some(key) = env.get_var(ENV_SEP_API_KEY) {
            self.separation.api_key = Some(key);
        }
        if let Some(key) = env.get_var(ENV_TRANSLIT_API_KEY) {
            self.translit.api_key = Some(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_sections() {
        let config = Config::default();
        assert_eq!(config.general.field_separator, "\t");
        assert_eq!(config.general.retention, RetentionPolicy::Keep);
        assert_eq!(config.stt.provider, "whisper");
        assert_eq!(config.separation.provider, "demucs");
        assert_eq!(config.binaries.transmuxer, "ffmpeg");
        assert_eq!(config.binaries.probe, "mediainfo");
    }

    #[test]
    fn test_effective_workers_default_is_cpu_minus_one() {
        let workers = WorkersConfig { max_workers: 0 };
        let expected = num_cpus::get().saturating_sub(1).max(1);
        assert_eq!(workers.effective_workers(), expected);

        let fixed = WorkersConfig { max_workers: 3 };
        assert_eq!(fixed.effective_workers(), 3);
    }

    #[test]
    fn test_is_truthy_accepted_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy("true"));
        assert!(is_truthy("YES"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("no"));
        assert!(!is_truthy(""));
    }

    #[test]
    fn test_environment_overrides_win() {
        let mut config = Config::default();
        config.stt.api_key = Some("from-file".to_string());

        let mut vars = HashMap::new();
        vars.insert(ENV_STT_API_KEY.to_string(), "from-env".to_string());
        vars.insert(ENV_SEP_API_KEY.to_string(), "sep-env".to_string());
        let env = TestEnvironmentProvider::with_variables(vars);

        config.apply_environment(&env);
        assert_eq!(config.stt.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.separation.api_key.as_deref(), Some("sep-env"));
        assert!(config.translit.api_key.is_none());
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[stt]"));
        assert!(toml_str.contains("[separation]"));
        let back: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.stt.model, config.stt.model);
    }
}
