//! Provider factory.
//!
//! Resolves provider aliases ("wh" → "whisper", "de" → "demucs"), owns the
//! mock/real decision through the test-providers environment flag, and
//! constructs the capability trait objects from configuration. Missing
//! credentials surface as configuration errors, which abort the whole run.

use crate::Result;
use crate::config::{Config, ENV_TEST_PROVIDERS, EnvironmentProvider};
use crate::core::language::Language;
use crate::error::SubLingoError;
use crate::services::separation::{HttpSeparationClient, MockSeparator, SourceSeparator};
use crate::services::stt::{MockSpeechToText, SpeechToText, WhisperClient};
use crate::services::translit::{
    GenericTranslitClient, IchiranClient, MockTransliterator, Transliterator,
};
use std::sync::Arc;

/// Resolve a speech-to-text provider alias to its canonical name.
pub fn resolve_stt_alias(name: &str) -> &str {
    match name {
        "wh" => "whisper",
        other => other,
    }
}

/// Resolve a separation provider alias to its canonical name.
pub fn resolve_separation_alias(name: &str) -> &str {
    match name {
        "de" => "demucs",
        other => other,
    }
}

/// Creates provider instances; owns the mock/real decision.
pub struct ProviderFactory {
    config: Config,
    test_mode: bool,
}

impl ProviderFactory {
    /// Create a factory, reading the test-providers flag from the given
    /// environment.
    pub fn new(config: Config, env: &dyn EnvironmentProvider) -> Self {
        let test_mode = env.flag(ENV_TEST_PROVIDERS);
        Self { config, test_mode }
    }

    /// Create a factory with the mock/real decision made explicitly.
    pub fn with_test_mode(config: Config, test_mode: bool) -> Self {
        Self { config, test_mode }
    }

    /// Whether mock providers are active.
    pub fn is_test_mode(&self) -> bool {
        self.test_mode
    }

    /// Create the configured source separator.
    pub fn create_separator(&self) -> Result<Arc<dyn SourceSeparator>> {
        if self.test_mode {
            return Ok(Arc::new(MockSeparator));
        }
        let name = resolve_separation_alias(&self.config.separation.provider);
        match name {
            "demucs" | "demucs_ft" | "spleeter" => Ok(Arc::new(HttpSeparationClient::from_config(
                name,
                &self.config.separation,
            )?)),
            other => Err(SubLingoError::config(format!(
                "unsupported separation provider: {}",
                other
            ))),
        }
    }

    /// Create the configured speech-to-text provider.
    pub fn create_stt(&self) -> Result<Arc<dyn SpeechToText>> {
        if self.test_mode {
            return Ok(Arc::new(MockSpeechToText::new(
                self.config.stt.model.clone(),
            )));
        }
        let name = resolve_stt_alias(&self.config.stt.provider);
        match name {
            "whisper" => Ok(Arc::new(WhisperClient::from_config(&self.config.stt)?)),
            other => Err(SubLingoError::config(format!(
                "unsupported speech-to-text provider: {}",
                other
            ))),
        }
    }

    /// Create the transliterator appropriate for the target language.
    ///
    /// Japanese routes to the selective-capable back-end; everything else
    /// gets the generic romanize/tokenize client.
    pub fn create_transliterator(&self, target: &Language) -> Result<Arc<dyn Transliterator>> {
        if self.test_mode {
            return Ok(Arc::new(MockTransliterator));
        }
        if target.code() == "jpn" {
            Ok(Arc::new(IchiranClient::from_config(&self.config.translit)?))
        } else {
            Ok(Arc::new(GenericTranslitClient::from_config(
                &self.config.translit,
            )?))
        }
    }
}
