//! Transliteration providers.
//!
//! A transliterator renders target-language text as any subset of
//! tokenized, romanized, selectively-romanized, and tokenized-selective
//! strings. The Japanese back-end uniquely supports selective
//! transliteration driven by a kanji frequency threshold. Providers without
//! native progress reporting receive their input in bounded line-aligned
//! chunks so partial progress can be surfaced.

use crate::Result;
use crate::config::TranslitConfig;
use crate::core::worker::progress::ProgressSink;
use crate::error::SubLingoError;
use crate::services::retry::{RetryConfig, retry_with_backoff};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Upper bound on chunk count regardless of input size.
pub const MAX_CHUNKS: usize = 64;

/// Which renderings the caller wants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranslitKinds {
    /// Whitespace-tokenized rendering.
    pub tokenized: bool,
    /// Fully romanized rendering.
    pub romanized: bool,
    /// Selective rendering (rare kanji only).
    pub selective: bool,
    /// Tokenized selective rendering.
    pub selective_tokenized: bool,
}

impl TranslitKinds {
    /// Whether any rendering was requested.
    pub fn any(&self) -> bool {
        self.tokenized || self.romanized || self.selective || self.selective_tokenized
    }

    /// Whether a selective rendering was requested.
    pub fn wants_selective(&self) -> bool {
        self.selective || self.selective_tokenized
    }
}

/// Renderings produced by one call; absent kinds stay `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranslitOutput {
    /// Whitespace-tokenized rendering.
    pub tokenized: Option<String>,
    /// Fully romanized rendering.
    pub romanized: Option<String>,
    /// Selective rendering.
    pub selective: Option<String>,
    /// Tokenized selective rendering.
    pub selective_tokenized: Option<String>,
}

/// Transliteration capability.
#[async_trait]
pub trait Transliterator: Send + Sync {
    /// Produce the requested renderings of `text`. Line structure must be
    /// preserved: output fields contain exactly as many lines as the input.
    async fn transliterate(
        &self,
        text: &str,
        kinds: TranslitKinds,
        cancel: &CancellationToken,
    ) -> Result<TranslitOutput>;

    /// Whether the back-end supports selective transliteration.
    fn supports_selective(&self) -> bool;

    /// Canonical provider name.
    fn name(&self) -> &str;
}

#[derive(Serialize)]
struct TranslitRequestBody<'a> {
    text: &'a str,
    tokenize: bool,
    romanize: bool,
    selective: bool,
    selective_tokenized: bool,
    kanji_frequency_threshold: u32,
}

/// Japanese back-end with selective support (ichiran-style service).
pub struct IchiranClient {
    client: Client,
    base_url: String,
    config: TranslitConfig,
}

impl IchiranClient {
    /// Build a client from the transliteration configuration section.
    pub fn from_config(config: &TranslitConfig) -> Result<Self> {
        crate::services::validate_base_url(&config.provider, &config.base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                SubLingoError::provider("ichiran", format!("failed to create HTTP client: {}", e))
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            config: config.clone(),
        })
    }

    async fn try_transliterate(&self, text: &str, kinds: TranslitKinds) -> Result<TranslitOutput> {
        let body = TranslitRequestBody {
            text,
            tokenize: kinds.tokenized,
            romanize: kinds.romanized,
            selective: kinds.selective,
            selective_tokenized: kinds.selective_tokenized,
            kanji_frequency_threshold: self.config.kanji_frequency_threshold,
        };
        let response = self
            .client
            .post(format!("{}/translit", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| SubLingoError::provider("ichiran", format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SubLingoError::provider(
                "ichiran",
                format!("status {}: {}", status, text),
            ));
        }

        let output: TranslitOutput = response.json().await.map_err(|e| {
            SubLingoError::provider("ichiran", format!("failed to parse response: {}", e))
        })?;
        Ok(output)
    }
}

#[async_trait]
impl Transliterator for IchiranClient {
    async fn transliterate(
        &self,
        text: &str,
        kinds: TranslitKinds,
        cancel: &CancellationToken,
    ) -> Result<TranslitOutput> {
        let retry = RetryConfig::from_provider(
            self.config.max_retries,
            self.config.retry_delay_ms,
            self.config.timeout_seconds,
        );
        retry_with_backoff(
            || self.try_transliterate(text, kinds),
            &retry,
            cancel,
            "ichiran",
        )
        .await
    }

    fn supports_selective(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "ichiran"
    }
}

/// Generic romanize/tokenize back-end for non-Japanese scripts; selective
/// kinds are not supported and come back empty.
pub struct GenericTranslitClient {
    client: Client,
    base_url: String,
    config: TranslitConfig,
}

impl GenericTranslitClient {
    /// Build a client from the transliteration configuration section.
    pub fn from_config(config: &TranslitConfig) -> Result<Self> {
        crate::services::validate_base_url(&config.provider, &config.base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                SubLingoError::provider("translit", format!("failed to create HTTP client: {}", e))
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            config: config.clone(),
        })
    }

    async fn try_transliterate(&self, text: &str, kinds: TranslitKinds) -> Result<TranslitOutput> {
        let body = TranslitRequestBody {
            text,
            tokenize: kinds.tokenized,
            romanize: kinds.romanized,
            selective: false,
            selective_tokenized: false,
            kanji_frequency_threshold: 0,
        };
        let response = self
            .client
            .post(format!("{}/translit", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| SubLingoError::provider("translit", format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SubLingoError::provider(
                "translit",
                format!("status {}: {}", status, text),
            ));
        }

        let output: TranslitOutput = response.json().await.map_err(|e| {
            SubLingoError::provider("translit", format!("failed to parse response: {}", e))
        })?;
        Ok(output)
    }
}

#[async_trait]
impl Transliterator for GenericTranslitClient {
    async fn transliterate(
        &self,
        text: &str,
        kinds: TranslitKinds,
        cancel: &CancellationToken,
    ) -> Result<TranslitOutput> {
        let retry = RetryConfig::from_provider(
            self.config.max_retries,
            self.config.retry_delay_ms,
            self.config.timeout_seconds,
        );
        retry_with_backoff(
            || self.try_transliterate(text, kinds),
            &retry,
            cancel,
            "translit",
        )
        .await
    }

    fn supports_selective(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "generic"
    }
}

/// Deterministic mock used by tests and the test-providers flag.
pub struct MockTransliterator;

#[async_trait]
impl Transliterator for MockTransliterator {
    async fn transliterate(
        &self,
        text: &str,
        kinds: TranslitKinds,
        cancel: &CancellationToken,
    ) -> Result<TranslitOutput> {
        if cancel.is_cancelled() {
            return Err(SubLingoError::Canceled);
        }
        let render = |prefix: &str| {
            text.split('\n')
                .map(|l| format!("{}:{}", prefix, l))
                .collect::<Vec<_>>()
                .join("\n")
        };
        Ok(TranslitOutput {
            tokenized: kinds.tokenized.then(|| render("tok")),
            romanized: kinds.romanized.then(|| render("rom")),
            selective: kinds.selective.then(|| render("sel")),
            selective_tokenized: kinds.selective_tokenized.then(|| render("selt")),
        })
    }

    fn supports_selective(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Split text into at most [`MAX_CHUNKS`] chunks of whole lines, each
/// roughly `chunk_chars` characters. The chunk size grows when the bound
/// would otherwise be exceeded.
pub fn chunk_lines(text: &str, chunk_chars: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let chunk_chars = chunk_chars.max(1);
    let needed = text.len().div_ceil(chunk_chars);
    let effective = if needed > MAX_CHUNKS {
        text.len().div_ceil(MAX_CHUNKS)
    } else {
        chunk_chars
    };

    let mut chunks = Vec::new();
    let mut current = String::new();
    // split('\n') rather than lines(): a trailing empty line must survive
    // so renderings stay positionally aligned with cues
    for line in text.split('\n') {
        if !current.is_empty() && current.len() + line.len() + 1 > effective {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    // line-boundary rounding can overshoot the cap by a chunk or two
    while chunks.len() > MAX_CHUNKS {
        let last = chunks.pop().unwrap();
        if let Some(previous) = chunks.last_mut() {
            previous.push('\n');
            previous.push_str(&last);
        }
    }
    chunks
}

/// Run a transliterator over line-aligned chunks sequentially, reporting
/// per-chunk progress, and merge the outputs preserving line order.
pub async fn transliterate_chunked(
    provider: &dyn Transliterator,
    text: &str,
    kinds: TranslitKinds,
    chunk_chars: usize,
    cancel: &CancellationToken,
    progress: &dyn ProgressSink,
) -> Result<TranslitOutput> {
    let chunks = chunk_lines(text, chunk_chars);
    progress.set_total(chunks.len() as u64);

    let mut merged = TranslitOutput::default();
    let mut append = |slot: &mut Option<String>, piece: Option<String>| {
        if let Some(piece) = piece {
            match slot {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(&piece);
                }
                None => *slot = Some(piece),
            }
        }
    };

    for chunk in &chunks {
        if cancel.is_cancelled() {
            return Err(SubLingoError::Canceled);
        }
        let output = provider.transliterate(chunk, kinds, cancel).await?;
        append(&mut merged.tokenized, output.tokenized);
        append(&mut merged.romanized, output.romanized);
        append(&mut merged.selective, output.selective);
        append(&mut merged.selective_tokenized, output.selective_tokenized);
        progress.inc(1);
    }
    Ok(merged)
}
