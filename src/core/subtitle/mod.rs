//! Subtitle document model and format handling.
//!
//! A [`SubtitleDocument`] is an ordered sequence of [`Cue`]s read from an
//! SRT or ASS/SSA file. Cues are mutable during preprocessing (closed-caption
//! bracket stripping, default-style filtering); a deep copy taken before
//! style filtering lets transliteration see every cue.

use crate::Result;
use crate::error::SubLingoError;
use std::path::Path;
use std::time::Duration;

pub mod ass;
pub mod preprocess;
pub mod srt;

/// A single subtitle entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    /// Start time from the beginning of the media.
    pub start: Duration,
    /// End time from the beginning of the media.
    pub end: Duration,
    /// Text lines of the cue.
    pub lines: Vec<String>,
    /// Style name for positional formats (ASS/SSA); `None` for SRT.
    pub style: Option<String>,
}

impl Cue {
    /// Joined cue text with newlines between lines.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// On-disk subtitle file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFileFormat {
    /// SubRip.
    Srt,
    /// Advanced SubStation Alpha.
    Ass,
    /// SubStation Alpha.
    Ssa,
}

impl SubtitleFileFormat {
    /// Determine the format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "srt" => Some(Self::Srt),
            "ass" => Some(Self::Ass),
            "ssa" => Some(Self::Ssa),
            _ => None,
        }
    }

    /// Canonical file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Srt => "srt",
            Self::Ass => "ass",
            Self::Ssa => "ssa",
        }
    }

    /// Whether the format carries per-cue style information.
    pub fn supports_styles(&self) -> bool {
        matches!(self, Self::Ass | Self::Ssa)
    }
}

/// An ordered sequence of cues plus enough format context to write the
/// document back out.
#[derive(Debug, Clone)]
pub struct SubtitleDocument {
    /// The cues in presentation order.
    pub cues: Vec<Cue>,
    /// The format the document was read from.
    pub format: SubtitleFileFormat,
    /// Raw header sections for ASS/SSA (script info, styles); empty for SRT.
    pub header: String,
    /// The default style name declared by the header, when present.
    pub default_style: Option<String>,
}

impl SubtitleDocument {
    /// Open a subtitle file, decoding non-UTF-8 encodings where detectable.
    pub fn open(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let format = SubtitleFileFormat::from_extension(ext).ok_or_else(|| {
            SubLingoError::subtitle_format(ext, format!("unsupported extension: {}", ext))
        })?;

        let bytes = std::fs::read(path)?;
        let content = decode_bytes(&bytes);

        match format {
            SubtitleFileFormat::Srt => srt::parse(&content),
            SubtitleFileFormat::Ass | SubtitleFileFormat::Ssa => ass::parse(&content, format),
        }
    }

    /// Serialize and write the document to the given path.
    pub fn write(&self, path: &Path) -> Result<()> {
        let content = match self.format {
            SubtitleFileFormat::Srt => srt::serialize(self),
            SubtitleFileFormat::Ass | SubtitleFileFormat::Ssa => ass::serialize(self),
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// A deep copy of the document; mutations to the copy do not affect the
    /// original.
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// Number of cues carrying any text.
    pub fn item_count(&self) -> usize {
        self.cues
            .iter()
            .filter(|c| c.lines.iter().any(|l| !l.trim().is_empty()))
            .count()
    }
}

/// Decode raw subtitle bytes: honor a UTF-8/UTF-16 BOM, else try UTF-8,
/// falling back to Windows-1252.
fn decode_bytes(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(&bytes[3..]).into_owned();
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        let (decoded, _, _) = encoding_rs::UTF_16LE.decode(bytes);
        return decoded.into_owned();
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let (decoded, _, _) = encoding_rs::UTF_16BE.decode(bytes);
        return decoded.into_owned();
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Format a duration as `HH:MM:SS,mmm` (the tabular start-time column and
/// resumption fingerprint format).
pub fn format_timestamp(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let milliseconds = total_ms % 1000;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        hours, minutes, seconds, milliseconds
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            SubtitleFileFormat::from_extension("SRT"),
            Some(SubtitleFileFormat::Srt)
        );
        assert_eq!(
            SubtitleFileFormat::from_extension("ass"),
            Some(SubtitleFileFormat::Ass)
        );
        assert!(SubtitleFileFormat::from_extension("sub").is_none());
    }

    #[test]
    fn test_style_support() {
        assert!(!SubtitleFileFormat::Srt.supports_styles());
        assert!(SubtitleFileFormat::Ass.supports_styles());
        assert!(SubtitleFileFormat::Ssa.supports_styles());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(Duration::from_millis(1000)), "00:00:01,000");
        assert_eq!(
            format_timestamp(Duration::from_millis(3_661_042)),
            "01:01:01,042"
        );
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let doc = SubtitleDocument {
            cues: vec![Cue {
                start: Duration::from_secs(1),
                end: Duration::from_secs(2),
                lines: vec!["hello".to_string()],
                style: None,
            }],
            format: SubtitleFileFormat::Srt,
            header: String::new(),
            default_style: None,
        };
        let mut copy = doc.deep_copy();
        copy.cues[0].lines[0] = "changed".to_string();
        assert_eq!(doc.cues[0].lines[0], "hello");

        // deep-copy of a deep-copy is identical
        let copy2 = copy.deep_copy().deep_copy();
        assert_eq!(copy2.cues[0].lines[0], "changed");
    }

    #[test]
    fn test_decode_bom_utf8() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("hello".as_bytes());
        assert_eq!(decode_bytes(&bytes), "hello");
    }

    #[test]
    fn test_decode_windows_1252_fallback() {
        // 0xE9 is é in Windows-1252 and invalid standalone UTF-8
        let bytes = b"caf\xe9";
        assert_eq!(decode_bytes(bytes), "café");
    }

    #[test]
    fn test_item_count_skips_empty_cues() {
        let doc = SubtitleDocument {
            cues: vec![
                Cue {
                    start: Duration::from_secs(0),
                    end: Duration::from_secs(1),
                    lines: vec!["text".to_string()],
                    style: None,
                },
                Cue {
                    start: Duration::from_secs(1),
                    end: Duration::from_secs(2),
                    lines: vec!["  ".to_string()],
                    style: None,
                },
            ],
            format: SubtitleFileFormat::Srt,
            header: String::new(),
            default_style: None,
        };
        assert_eq!(doc.item_count(), 1);
    }
}
