//! Source separation providers.
//!
//! A separator takes a lossy-safe audio file and returns the isolated
//! vocals as bytes in the provider's native container. HTTP back-ends
//! ("demucs", "demucs_ft", "spleeter") share one client parameterized by
//! model name; the gateway reports resource exhaustion as ordinary provider
//! errors (retry-later is the user remediation).

use crate::Result;
use crate::config::SeparationConfig;
use crate::error::SubLingoError;
use crate::services::retry::{RetryConfig, retry_with_backoff};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio_util::codec::{BytesCodec, FramedRead};
use tokio_util::sync::CancellationToken;

/// Source separation capability.
#[async_trait]
pub trait SourceSeparator: Send + Sync + std::fmt::Debug {
    /// Separate vocals from the given audio file, returning the provider's
    /// native container bytes.
    async fn separate(&self, audio: &Path, cancel: &CancellationToken) -> Result<Vec<u8>>;

    /// Canonical provider name.
    fn name(&self) -> &str;
}

/// HTTP separation client shared by the demucs-family and spleeter
/// back-ends.
#[derive(Debug)]
pub struct HttpSeparationClient {
    client: Client,
    provider: String,
    model: String,
    api_key: String,
    base_url: String,
    config: SeparationConfig,
}

impl HttpSeparationClient {
    /// Build a client for the given canonical provider name.
    pub fn from_config(provider: &str, config: &SeparationConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| SubLingoError::config("separation API key is not configured"))?;
        crate::services::validate_base_url(provider, &config.base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                SubLingoError::provider(provider, format!("failed to create HTTP client: {}", e))
            })?;
        Ok(Self {
            client,
            provider: provider.to_string(),
            model: provider.to_string(),
            api_key,
            base_url: config.base_url.clone(),
            config: config.clone(),
        })
    }

    async fn try_separate(&self, audio: &Path) -> Result<Vec<u8>> {
        let file = File::open(audio).await.map_err(|e| {
            SubLingoError::provider(&self.provider, format!("failed to open audio: {}", e))
        })?;
        let stream = FramedRead::new(file, BytesCodec::new());
        let body = reqwest::Body::wrap_stream(stream);

        let filename = audio
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.flac".to_string());
        let form = Form::new().text("model", self.model.clone()).part(
            "file",
            Part::stream(body)
                .file_name(filename)
                .mime_str("application/octet-stream")?,
        );

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                SubLingoError::provider(&self.provider, format!("request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SubLingoError::provider(
                &self.provider,
                format!("status {}: {}", status, text),
            ));
        }

        let bytes = response.bytes().await.map_err(|e| {
            SubLingoError::provider(&self.provider, format!("failed to read body: {}", e))
        })?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SourceSeparator for HttpSeparationClient {
    async fn separate(&self, audio: &Path, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let retry = RetryConfig::from_provider(
            self.config.max_retries,
            self.config.retry_delay_ms,
            self.config.timeout_seconds,
        );
        retry_with_backoff(|| self.try_separate(audio), &retry, cancel, &self.provider).await
    }

    fn name(&self) -> &str {
        &self.provider
    }
}

/// Deterministic mock used by tests and the test-providers flag.
#[derive(Debug)]
pub struct MockSeparator;

#[async_trait]
impl SourceSeparator for MockSeparator {
    async fn separate(&self, _audio: &Path, cancel: &CancellationToken) -> Result<Vec<u8>> {
        if cancel.is_cancelled() {
            return Err(SubLingoError::Canceled);
        }
        Ok(b"mock-vocals".to_vec())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_api_key() {
        let config = SeparationConfig::default();
        assert!(HttpSeparationClient::from_config("demucs", &config).is_err());

        let mut with_key = SeparationConfig::default();
        with_key.api_key = Some("key".to_string());
        let client = HttpSeparationClient::from_config("demucs_ft", &with_key).unwrap();
        assert_eq!(client.name(), "demucs_ft");
    }

    #[tokio::test]
    async fn test_mock_returns_bytes() {
        let mock = MockSeparator;
        let bytes = mock
            .separate(Path::new("audio.flac"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!bytes.is_empty());
    }
}
