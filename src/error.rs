//! Comprehensive error types for the sublingo processing engine.
//!
//! This module defines the `SubLingoError` enum covering all error conditions
//! that can occur during task execution, subtitle discovery, subprocess
//! invocation, remote provider calls, and per-cue worker processing.
//!
//! Every error carries a [`ErrorBehavior`] describing how the pipeline should
//! react to it, and maps to a process exit code via
//! [`SubLingoError::exit_code`].
use std::path::PathBuf;
use thiserror::Error;

/// How the task pipeline reacts to an error.
///
/// The pipeline surfaces errors immediately; this tag tells the caller
/// whether the current task, the whole bulk run, or nothing at all should
/// be torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorBehavior {
    /// Ignore and keep going.
    Continue,
    /// Log a warning and keep going.
    WarnContinue,
    /// Abort the current task; a bulk run continues with the next file.
    AbortTask,
    /// Abort every task and exit non-zero.
    AbortAll,
}

/// Represents all possible errors in the sublingo application.
///
/// Each variant provides specific context to facilitate debugging and
/// user-friendly reporting.
///
/// # Exit Codes
///
/// Each error variant maps to an exit code via `SubLingoError::exit_code`.
#[derive(Error, Debug)]
pub enum SubLingoError {
    /// I/O operation failed during file system access.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error due to invalid or missing settings.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error
        message: String,
    },

    /// Bad task input rejected before any processing started.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the rejected input
        message: String,
    },

    /// Subtitle format error indicating invalid timestamps or structure.
    #[error("Subtitle format error [{format}]: {message}")]
    SubtitleFormat {
        /// The subtitle format that caused the error (e.g., "SRT", "ASS")
        format: String,
        /// Detailed error message describing the issue
        message: String,
    },

    /// No subtitle candidate matched the requested target language.
    #[error("No subtitle matching target language: {language}")]
    NoSubtitleForLanguage {
        /// The requested target language code
        language: String,
    },

    /// An external binary exited non-zero or could not be spawned.
    #[error("Subprocess error [{program}]: {message}")]
    Subprocess {
        /// The binary that failed (e.g. the transmuxer or the probe)
        program: String,
        /// Captured stderr tail or spawn failure description
        message: String,
    },

    /// Media probe produced output the engine could not interpret, or the
    /// container failed its integrity pre-check.
    #[error("Corrupt or unreadable media: {0}")]
    CorruptMedia(PathBuf),

    /// The probed container exposes no audio track to work with.
    #[error("No audio track found in {0}")]
    NoAudioTrack(PathBuf),

    /// A remote provider returned a status error.
    #[error("Provider error [{provider}]: {message}")]
    Provider {
        /// Provider name as configured (e.g. "whisper", "demucs")
        provider: String,
        /// Error message relayed from the provider
        message: String,
    },

    /// A provider call exceeded its per-attempt timeout.
    #[error("Provider timeout [{provider}] after {seconds}s")]
    Timeout {
        /// Provider name as configured
        provider: String,
        /// The per-attempt timeout that elapsed
        seconds: u64,
    },

    /// The user canceled the run; not a failure.
    #[error("canceled by user")]
    Canceled,

    /// Worker pool internal failure.
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// Catch-all error variant wrapping any other failure.
    #[error("Unknown error: {0}")]
    Other(#[from] anyhow::Error),
}

// Convert reqwest error to provider error
impl From<reqwest::Error> for SubLingoError {
    fn from(err: reqwest::Error) -> Self {
        SubLingoError::Provider {
            provider: "http".to_string(),
            message: err.to_string(),
        }
    }
}

// Convert file exploration error to I/O error where one is attached
impl From<walkdir::Error> for SubLingoError {
    fn from(err: walkdir::Error) -> Self {
        if err.io_error().is_some() {
            SubLingoError::Io(err.into_io_error().unwrap())
        } else {
            SubLingoError::Other(anyhow::anyhow!(err))
        }
    }
}

// Convert config crate error to configuration error
impl From<config::ConfigError> for SubLingoError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(path) => SubLingoError::Config {
                message: format!("Configuration file not found: {}", path),
            },
            config::ConfigError::Message(msg) => SubLingoError::Config { message: msg },
            _ => SubLingoError::Config {
                message: format!("Configuration error: {}", err),
            },
        }
    }
}

impl From<serde_json::Error> for SubLingoError {
    fn from(err: serde_json::Error) -> Self {
        SubLingoError::Config {
            message: format!("JSON serialization/deserialization error: {}", err),
        }
    }
}

/// Specialized `Result` type for sublingo operations.
pub type SubLingoResult<T> = Result<T, SubLingoError>;

impl SubLingoError {
    /// Create a configuration error with the given message.
    pub fn config<S: Into<String>>(message: S) -> Self {
        SubLingoError::Config {
            message: message.into(),
        }
    }

    /// Create a validation error with the given message.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        SubLingoError::Validation {
            message: message.into(),
        }
    }

    /// Create a subtitle format error for the given format and message.
    pub fn subtitle_format<S1, S2>(format: S1, message: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        SubLingoError::SubtitleFormat {
            format: format.into(),
            message: message.into(),
        }
    }

    /// Create a subprocess error for the given program and message.
    pub fn subprocess<S1, S2>(program: S1, message: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        SubLingoError::Subprocess {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Create a provider error for the given provider name and message.
    pub fn provider<S1, S2>(provider: S1, message: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        SubLingoError::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a worker pool error with the given message.
    pub fn worker_pool<S: Into<String>>(message: S) -> Self {
        SubLingoError::WorkerPool(message.into())
    }

    /// Return how the pipeline should react to this error.
    ///
    /// Cancellation is an abort-all that is not a failure; subprocess
    /// failures and missing provider keys tear the whole run down, while
    /// timeouts only abort the task at hand.
    pub fn behavior(&self) -> ErrorBehavior {
        match self {
            SubLingoError::Canceled => ErrorBehavior::AbortAll,
            SubLingoError::Config { .. } => ErrorBehavior::AbortAll,
            SubLingoError::Subprocess { .. } => ErrorBehavior::AbortAll,
            SubLingoError::Validation { .. } => ErrorBehavior::AbortTask,
            SubLingoError::NoSubtitleForLanguage { .. } => ErrorBehavior::AbortTask,
            SubLingoError::CorruptMedia(_) => ErrorBehavior::AbortTask,
            SubLingoError::NoAudioTrack(_) => ErrorBehavior::AbortTask,
            SubLingoError::Timeout { .. } => ErrorBehavior::AbortTask,
            SubLingoError::Provider { .. } => ErrorBehavior::AbortTask,
            SubLingoError::SubtitleFormat { .. } => ErrorBehavior::AbortTask,
            SubLingoError::WorkerPool(_) => ErrorBehavior::AbortTask,
            SubLingoError::Io(_) => ErrorBehavior::AbortTask,
            SubLingoError::Other(_) => ErrorBehavior::AbortTask,
        }
    }

    /// Whether this error represents a user-requested cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self, SubLingoError::Canceled)
    }

    /// Return the corresponding exit code for this error variant.
    ///
    /// Zero is reserved for success; cancellation also exits zero since it
    /// is not a failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            SubLingoError::Canceled => 0,
            SubLingoError::Io(_) => 1,
            SubLingoError::Config { .. } => 2,
            SubLingoError::Validation { .. } => 2,
            SubLingoError::Provider { .. } => 3,
            SubLingoError::Timeout { .. } => 3,
            SubLingoError::SubtitleFormat { .. } => 4,
            SubLingoError::NoSubtitleForLanguage { .. } => 4,
            SubLingoError::Subprocess { .. } => 5,
            SubLingoError::CorruptMedia(_) => 5,
            SubLingoError::NoAudioTrack(_) => 5,
            SubLingoError::WorkerPool(_) => 6,
            SubLingoError::Other(_) => 1,
        }
    }

    /// Return a user-friendly error message with suggested remedies.
    pub fn user_friendly_message(&self) -> String {
        match self {
            SubLingoError::Io(e) => format!("File operation error: {}", e),
            SubLingoError::Config { message } => format!(
                "Configuration error: {}\nHint: run 'sublingo config --help' for details",
                message
            ),
            SubLingoError::Validation { message } => format!("Invalid input: {}", message),
            SubLingoError::SubtitleFormat { message, .. } => format!(
                "Subtitle processing error: {}\nHint: check file format and encoding",
                message
            ),
            SubLingoError::NoSubtitleForLanguage { language } => format!(
                "No subtitle matching target language '{}'\nHint: pass an explicit subtitle file or check the language flags",
                language
            ),
            SubLingoError::Subprocess { program, message } => format!(
                "External tool '{}' failed: {}\nHint: verify the binary is installed and on PATH",
                program, message
            ),
            SubLingoError::CorruptMedia(path) => format!(
                "Corrupt or unreadable media: {}\nHint: verify the file plays in a media player",
                path.display()
            ),
            SubLingoError::NoAudioTrack(path) => {
                format!("No audio track found in {}", path.display())
            }
            SubLingoError::Provider { provider, message } => format!(
                "Provider '{}' error: {}\nHint: check network connection and API key settings",
                provider, message
            ),
            SubLingoError::Timeout { provider, seconds } => format!(
                "Provider '{}' timed out after {}s\nHint: retry later or raise the timeout",
                provider, seconds
            ),
            SubLingoError::Canceled => "Canceled by user".to_string(),
            SubLingoError::WorkerPool(msg) => format!("Worker pool error: {}", msg),
            SubLingoError::Other(err) => {
                format!("Unknown error: {}\nHint: please report this issue", err)
            }
        }
    }
}

// Unit test: SubLingoError error types and helper methods
#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_error_creation() {
        let error = SubLingoError::config("test config error");
        assert!(matches!(error, SubLingoError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: test config error");
    }

    #[test]
    fn test_subtitle_format_error_creation() {
        let error = SubLingoError::subtitle_format("SRT", "invalid format");
        assert!(matches!(error, SubLingoError::SubtitleFormat { .. }));
        let msg = error.to_string();
        assert!(msg.contains("SRT"));
        assert!(msg.contains("invalid format"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: SubLingoError = io_error.into();
        assert!(matches!(err, SubLingoError::Io(_)));
    }

    #[test]
    fn test_behavior_tags() {
        assert_eq!(
            SubLingoError::config("x").behavior(),
            ErrorBehavior::AbortAll
        );
        assert_eq!(
            SubLingoError::subprocess("ffmpeg", "exit 1").behavior(),
            ErrorBehavior::AbortAll
        );
        assert_eq!(
            SubLingoError::Timeout {
                provider: "whisper".into(),
                seconds: 30
            }
            .behavior(),
            ErrorBehavior::AbortTask
        );
        assert_eq!(SubLingoError::Canceled.behavior(), ErrorBehavior::AbortAll);
    }

    #[test]
    fn test_canceled_is_not_a_failure() {
        let err = SubLingoError::Canceled;
        assert!(err.is_canceled());
        assert_eq!(err.exit_code(), 0);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(SubLingoError::config("test").exit_code(), 2);
        assert_eq!(SubLingoError::subtitle_format("SRT", "test").exit_code(), 4);
        assert_eq!(SubLingoError::subprocess("mediainfo", "x").exit_code(), 5);
        assert_eq!(SubLingoError::worker_pool("test").exit_code(), 6);
    }

    #[test]
    fn test_user_friendly_messages() {
        let config_error = SubLingoError::config("missing key");
        let message = config_error.user_friendly_message();
        assert!(message.contains("Configuration error:"));
        assert!(message.contains("sublingo config --help"));

        let provider_error = SubLingoError::provider("whisper", "network failure");
        let message = provider_error.user_friendly_message();
        assert!(message.contains("whisper"));
        assert!(message.contains("check network connection"));
    }
}
