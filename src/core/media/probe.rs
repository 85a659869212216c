//! Media-info probe subprocess driver.
//!
//! Invokes a MediaInfo-compatible binary with JSON output and parses the
//! result into typed general/video/audio/text track records. The probe also
//! doubles as the bulk router's integrity pre-check: containers the probe
//! cannot parse are reported as corrupt.

use crate::Result;
use crate::core::language::Language;
use crate::error::SubLingoError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// One audio track of a probed container.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    /// Zero-based index among audio tracks.
    pub index: usize,
    /// Declared language, when tagged.
    pub language: Option<Language>,
    /// Channel count.
    pub channels: u32,
    /// Track title, when tagged.
    pub title: Option<String>,
    /// Codec identifier.
    pub codec: String,
    /// Container-level format name.
    pub format: String,
    /// Whether the container marks this track default.
    pub default: bool,
    /// Stream order within the container.
    pub stream_order: usize,
}

/// One embedded text (subtitle) track of a probed container.
#[derive(Debug, Clone)]
pub struct TextTrack {
    /// Zero-based index among text tracks.
    pub index: usize,
    /// Declared language, when tagged.
    pub language: Option<Language>,
    /// Track title, when tagged.
    pub title: Option<String>,
    /// Codec identifier (e.g. `S_TEXT/ASS`).
    pub codec: String,
    /// Format name (e.g. `ASS`, `UTF-8`, `PGS`).
    pub format: String,
    /// Whether the container marks this track default.
    pub default: bool,
    /// Stream order within the container.
    pub stream_order: usize,
}

impl TextTrack {
    /// Whether the track is text-based (image-based subtitle formats such
    /// as PGS/VobSub cannot be processed).
    pub fn is_text_based(&self) -> bool {
        !matches!(
            self.format.to_uppercase().as_str(),
            "PGS" | "VOBSUB" | "DVB SUBTITLE" | "HDMV PGS"
        )
    }
}

/// Parsed probe result for one container.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    /// The probed path.
    pub path: PathBuf,
    /// Container duration in milliseconds, when reported.
    pub duration_ms: Option<u64>,
    /// Whether a video track is present.
    pub has_video: bool,
    /// Audio tracks in stream order.
    pub audio_tracks: Vec<AudioTrack>,
    /// Embedded text tracks in stream order.
    pub text_tracks: Vec<TextTrack>,
}

/// Media-info probe subprocess wrapper.
#[derive(Debug, Clone)]
pub struct MediaProbe {
    binary: String,
}

// Raw JSON shape emitted by `mediainfo --Output=JSON`.
#[derive(Debug, Deserialize)]
struct RawOutput {
    media: Option<RawMedia>,
}

#[derive(Debug, Deserialize)]
struct RawMedia {
    track: Vec<RawTrack>,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "Duration")]
    duration: Option<String>,
    #[serde(rename = "Language")]
    language: Option<String>,
    #[serde(rename = "Channels")]
    channels: Option<String>,
    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "CodecID")]
    codec_id: Option<String>,
    #[serde(rename = "Format")]
    format: Option<String>,
    #[serde(rename = "Default")]
    default: Option<String>,
    #[serde(rename = "StreamOrder")]
    stream_order: Option<String>,
}

impl MediaProbe {
    /// Create a probe wrapper around the given binary.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Probe a container, honoring cancellation.
    pub async fn probe(&self, path: &Path, cancel: &CancellationToken) -> Result<MediaInfo> {
        let mut child = Command::new(&self.binary)
            .arg("--Output=JSON")
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SubLingoError::subprocess(&self.binary, format!("spawn failed: {}", e))
            })?;

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(SubLingoError::Canceled),
            out = child.wait_with_output() => out.map_err(|e| {
                SubLingoError::subprocess(&self.binary, format!("wait failed: {}", e))
            })?,
        };

        if !output.status.success() {
            return Err(SubLingoError::subprocess(
                &self.binary,
                format!(
                    "exit {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr)
                ),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_output(&stdout, path)
    }

    /// Lightweight integrity pre-check used by the bulk router.
    pub async fn check_integrity(&self, path: &Path, cancel: &CancellationToken) -> Result<()> {
        let info = self.probe(path, cancel).await?;
        if !info.has_video && info.audio_tracks.is_empty() {
            return Err(SubLingoError::CorruptMedia(path.to_path_buf()));
        }
        Ok(())
    }

    /// Parse probe JSON output into a [`MediaInfo`].
    pub fn parse_output(json: &str, path: &Path) -> Result<MediaInfo> {
        let raw: RawOutput = serde_json::from_str(json)
            .map_err(|_| SubLingoError::CorruptMedia(path.to_path_buf()))?;
        let media = raw
            .media
            .ok_or_else(|| SubLingoError::CorruptMedia(path.to_path_buf()))?;

        let mut info = MediaInfo {
            path: path.to_path_buf(),
            duration_ms: None,
            has_video: false,
            audio_tracks: Vec::new(),
            text_tracks: Vec::new(),
        };

        for track in media.track {
            match track.kind.as_str() {
                "General" => {
                    info.duration_ms = track
                        .duration
                        .as_deref()
                        .and_then(|d| d.parse::<f64>().ok())
                        .map(|secs| (secs * 1000.0) as u64);
                }
                "Video" => info.has_video = true,
                "Audio" => {
                    let index = info.audio_tracks.len();
                    info.audio_tracks.push(AudioTrack {
                        index,
                        language: track.language.as_deref().and_then(Language::parse),
                        channels: track
                            .channels
                            .as_deref()
                            .and_then(|c| c.parse().ok())
                            .unwrap_or(2),
                        title: track.title.clone(),
                        codec: track.codec_id.clone().unwrap_or_default(),
                        format: track.format.clone().unwrap_or_default(),
                        default: track.default.as_deref() == Some("Yes"),
                        stream_order: track
                            .stream_order
                            .as_deref()
                            .and_then(|s| s.parse().ok())
                            .unwrap_or(index),
                    });
                }
                "Text" => {
                    let index = info.text_tracks.len();
                    info.text_tracks.push(TextTrack {
                        index,
                        language: track.language.as_deref().and_then(Language::parse),
                        title: track.title.clone(),
                        codec: track.codec_id.clone().unwrap_or_default(),
                        format: track.format.clone().unwrap_or_default(),
                        default: track.default.as_deref() == Some("Yes"),
                        stream_order: track
                            .stream_order
                            .as_deref()
                            .and_then(|s| s.parse().ok())
                            .unwrap_or(index),
                    });
                }
                _ => {}
            }
        }

        Ok(info)
    }
}
