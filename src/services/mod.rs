//! Remote provider gateway for sublingo.
//!
//! Three capability sets sit behind trait objects created by the
//! [`factory::ProviderFactory`]: source separation, speech-to-text, and
//! transliteration. All HTTP back-ends share the jittered retry helper in
//! [`retry`] and honor task cancellation.

use crate::Result;
use crate::error::SubLingoError;

pub mod factory;
pub mod retry;
pub mod separation;
pub mod stt;
pub mod translit;

/// Validate a configured provider base URL before building a client, so a
/// typo fails at configuration time instead of on the first request.
pub fn validate_base_url(provider: &str, base_url: &str) -> Result<()> {
    url::Url::parse(base_url).map_err(|e| {
        SubLingoError::config(format!(
            "invalid base URL for provider '{}': {} ({})",
            provider, base_url, e
        ))
    })?;
    Ok(())
}
