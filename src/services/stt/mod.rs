//! Speech-to-text providers.
//!
//! The [`SpeechToText`] capability turns an audio file into a cue-aligned
//! [`Transcript`]. The Whisper-style back-end uploads the audio as a
//! streamed multipart form and parses the verbose JSON response; the mock
//! back-end serves tests and the test-providers environment flag.

use crate::Result;
use crate::config::SttConfig;
use crate::core::language::Language;
use crate::error::SubLingoError;
use crate::services::retry::{RetryConfig, retry_with_backoff};
use async_trait::async_trait;
use reqwest::{Client, multipart::Form};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio_util::codec::{BytesCodec, FramedRead};
use tokio_util::sync::CancellationToken;

pub mod dubtitles;

/// One transcribed segment with provider-reported timing.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptSegment {
    /// Segment start in seconds.
    pub start: f64,
    /// Segment end in seconds.
    pub end: f64,
    /// Transcribed text.
    pub text: String,
}

/// Cue-aligned transcription result.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    /// Full transcribed text.
    pub text: String,
    /// Provider-aligned segments.
    pub segments: Vec<TranscriptSegment>,
}

/// Speech-to-text capability.
#[async_trait]
pub trait SpeechToText: Send + Sync + std::fmt::Debug {
    /// Transcribe an audio file with an optional language hint and priming
    /// prompt.
    async fn transcribe(
        &self,
        audio: &Path,
        language: Option<&Language>,
        prompt: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Transcript>;

    /// The model identifier, used in dubtitle file naming.
    fn model_name(&self) -> &str;
}

/// Whisper-compatible API client.
#[derive(Debug)]
pub struct WhisperClient {
    client: Client,
    api_key: String,
    base_url: String,
    config: SttConfig,
}

// Raw verbose-JSON response shape.
#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    segments: Vec<TranscriptSegment>,
}

impl WhisperClient {
    /// Build a client from the STT configuration section.
    pub fn from_config(config: &SttConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| SubLingoError::config("STT API key is not configured"))?;
        crate::services::validate_base_url("whisper", &config.base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                SubLingoError::provider("whisper", format!("failed to create HTTP client: {}", e))
            })?;
        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.clone(),
            config: config.clone(),
        })
    }

    async fn try_transcribe(
        &self,
        audio: &Path,
        language: Option<&Language>,
        prompt: Option<&str>,
    ) -> Result<Transcript> {
        let file = File::open(audio).await.map_err(|e| {
            SubLingoError::provider("whisper", format!("failed to open audio file: {}", e))
        })?;
        let stream = FramedRead::new(file, BytesCodec::new());
        let body = reqwest::Body::wrap_stream(stream);

        let filename = audio
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.wav".to_string());
        let mut form = Form::new()
            .text("model", self.config.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment")
            .part(
                "file",
                reqwest::multipart::Part::stream(body)
                    .file_name(filename)
                    .mime_str("application/octet-stream")?,
            );

        if let Some(language) = language {
            form = form.text("language", language.code().to_string());
        }
        if let Some(prompt) = prompt {
            form = form.text("prompt", prompt.to_string());
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| SubLingoError::provider("whisper", format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SubLingoError::provider(
                "whisper",
                format!("status {}: {}", status, text),
            ));
        }

        let raw: WhisperResponse = response.json().await.map_err(|e| {
            SubLingoError::provider("whisper", format!("failed to parse response: {}", e))
        })?;
        Ok(Transcript {
            text: raw.text,
            segments: raw.segments,
        })
    }
}

#[async_trait]
impl SpeechToText for WhisperClient {
    async fn transcribe(
        &self,
        audio: &Path,
        language: Option<&Language>,
        prompt: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Transcript> {
        let retry = RetryConfig::from_provider(
            self.config.max_retries,
            self.config.retry_delay_ms,
            self.config.timeout_seconds,
        );
        retry_with_backoff(
            || self.try_transcribe(audio, language, prompt),
            &retry,
            cancel,
            "whisper",
        )
        .await
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Deterministic mock used by tests and the test-providers flag.
#[derive(Debug)]
pub struct MockSpeechToText {
    model: String,
}

impl MockSpeechToText {
    /// Create a mock reporting the given model name.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

#[async_trait]
impl SpeechToText for MockSpeechToText {
    async fn transcribe(
        &self,
        audio: &Path,
        _language: Option<&Language>,
        _prompt: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Transcript> {
        if cancel.is_cancelled() {
            return Err(SubLingoError::Canceled);
        }
        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Transcript {
            text: format!("transcribed {}", stem),
            segments: vec![TranscriptSegment {
                start: 0.0,
                end: 1.0,
                text: format!("transcribed {}", stem),
            }],
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
