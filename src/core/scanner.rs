//! Subtitle candidate discovery, ranking, and materialization.
//!
//! The scanner enumerates standalone subtitle files next to the media file
//! and embedded text tracks inside the container, guesses each candidate's
//! language and subtype, then picks the best target/native pair for the
//! task. Selection is deterministic given the same file set and
//! configuration.

use crate::Result;
use crate::core::language::Language;
use crate::core::media::{FfmpegDriver, MediaInfo};
use crate::core::media::ffmpeg::extract_subtitle_args;
use crate::error::SubLingoError;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Subtitle subtype, ranked differently for target and native selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleKind {
    /// Plain dialogue track.
    Dialogue,
    /// Captions for deaf/hard-of-hearing with non-lexical annotations.
    ClosedCaptions,
    /// SDH track with annotations already removed.
    StrippedSdh,
    /// Subtitles transcribed from a dub track.
    Dubtitles,
}

impl SubtitleKind {
    /// Priority for native-language selection: annotations help comprehension.
    fn native_priority(self) -> u8 {
        match self {
            SubtitleKind::StrippedSdh => 3,
            SubtitleKind::ClosedCaptions => 2,
            SubtitleKind::Dubtitles => 1,
            SubtitleKind::Dialogue => 0,
        }
    }

    /// Priority for target-language selection: clean dialogue is the
    /// learning material, so the ranking reverses.
    fn target_priority(self) -> u8 {
        3 - self.native_priority()
    }
}

/// Where a candidate lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateSource {
    /// A standalone file on disk.
    Standalone(PathBuf),
    /// A text track embedded in the container.
    Embedded {
        /// The container path.
        container: PathBuf,
        /// Index among text tracks.
        track_index: usize,
        /// Absolute stream index within the container.
        stream_index: usize,
        /// Codec identifier.
        codec: String,
        /// Format name (drives the output extension on extraction).
        format: String,
    },
}

/// A discovered subtitle candidate.
#[derive(Debug, Clone)]
pub struct SubtitleCandidate {
    /// Guessed or declared language.
    pub language: Option<Language>,
    /// Source descriptor.
    pub source: CandidateSource,
    /// Subtype derived from filename or track title.
    pub kind: SubtitleKind,
    /// Container default flag (false for standalone files).
    pub is_default: bool,
    /// Track title, when present.
    pub title: Option<String>,
    /// Materialized path, set once the candidate is extracted or resolved.
    pub path: Option<PathBuf>,
}

/// Result of target/native selection.
#[derive(Debug, Clone)]
pub struct CandidateSelection {
    /// The chosen target-language candidate.
    pub target: SubtitleCandidate,
    /// The chosen native-language candidate, when one matched.
    pub native: Option<SubtitleCandidate>,
    /// Whether the target is CC or dubtitles; drives bracket stripping and
    /// the STT confirmation prompt.
    pub is_cc_or_dubs: bool,
}

/// Known standalone subtitle extensions.
const SUBTITLE_EXTENSIONS: [&str; 3] = ["srt", "ass", "ssa"];

/// Filename markers of files this tool generated itself; scanning them back
/// in would feed outputs into inputs.
const GENERATED_MARKERS: [&str; 6] = [
    ".dubtitles.",
    ".tokenized.",
    ".romanized.",
    ".selective.",
    ".enhanced.",
    ".merged.",
];

/// Subtitle candidate scanner.
pub struct CandidateScanner {
    ffmpeg: FfmpegDriver,
}

impl CandidateScanner {
    /// Create a scanner using the given transmuxer for embedded extraction.
    pub fn new(ffmpeg: FfmpegDriver) -> Self {
        Self { ffmpeg }
    }

    /// Enumerate candidates: standalone files beside the media plus embedded
    /// text tracks from the probe result.
    pub fn scan(&self, media_path: &Path, info: &MediaInfo) -> Result<Vec<SubtitleCandidate>> {
        let mut candidates = Vec::new();

        let dir = media_path.parent().unwrap_or_else(|| Path::new("."));
        let media_base = media_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_lowercase();

        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        entries.sort();

        for path in entries {
            if let Some(candidate) = self.classify_standalone(&path, &media_base) {
                candidates.push(candidate);
            }
        }

        for track in &info.text_tracks {
            if !track.is_text_based() {
                continue;
            }
            let kind = kind_from_title(track.title.as_deref());
            candidates.push(SubtitleCandidate {
                language: track.language.clone(),
                source: CandidateSource::Embedded {
                    container: media_path.to_path_buf(),
                    track_index: track.index,
                    stream_index: track.stream_order,
                    codec: track.codec.clone(),
                    format: track.format.clone(),
                },
                kind,
                is_default: track.default,
                title: track.title.clone(),
                path: None,
            });
        }

        Ok(candidates)
    }

    fn classify_standalone(&self, path: &Path, media_base: &str) -> Option<SubtitleCandidate> {
        if !path.is_file() {
            return None;
        }
        let ext = path.extension()?.to_str()?.to_lowercase();
        if !SUBTITLE_EXTENSIONS.contains(&ext.as_str()) {
            return None;
        }
        let name = path.file_name()?.to_str()?;
        let name_lower = name.to_lowercase();

        if GENERATED_MARKERS.iter().any(|m| name_lower.contains(m)) {
            return None;
        }
        if name_lower.contains("forced") {
            return None;
        }
        if !name_lower.starts_with(media_base) {
            return None;
        }

        let language = Language::guess_from_filename(path);
        let kind = kind_from_filename(&name_lower);

        Some(SubtitleCandidate {
            language,
            source: CandidateSource::Standalone(path.to_path_buf()),
            kind,
            is_default: false,
            title: None,
            path: Some(path.to_path_buf()),
        })
    }

    /// Select the best target and native candidates.
    ///
    /// Target selection prefers clean dialogue; native selection prefers
    /// annotated tracks. Ties break on default flag, then embedded over
    /// standalone, then scan order.
    pub fn select(
        &self,
        candidates: &[SubtitleCandidate],
        target: &Language,
        native: Option<&Language>,
    ) -> Result<CandidateSelection> {
        let best_target = best_match(candidates, target, true).ok_or_else(|| {
            SubLingoError::NoSubtitleForLanguage {
                language: target.to_string(),
            }
        })?;

        let best_native = native.and_then(|lang| best_match(candidates, lang, false));

        let is_cc_or_dubs = matches!(
            best_target.kind,
            SubtitleKind::ClosedCaptions | SubtitleKind::Dubtitles
        );

        Ok(CandidateSelection {
            target: best_target,
            native: best_native,
            is_cc_or_dubs,
        })
    }

    /// Materialize a candidate to an on-disk file.
    ///
    /// Standalone candidates return their existing path. Embedded candidates
    /// are extracted into `scratch_dir`, named to preserve the language tag
    /// for downstream filename-based detection.
    pub async fn materialize(
        &self,
        candidate: &mut SubtitleCandidate,
        media_base: &str,
        scratch_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        match &candidate.source {
            CandidateSource::Standalone(path) => {
                candidate.path = Some(path.clone());
                Ok(path.clone())
            }
            CandidateSource::Embedded {
                container,
                stream_index,
                format,
                ..
            } => {
                let ext = extension_for_format(format);
                let lang = candidate
                    .language
                    .as_ref()
                    .map(|l| l.short_tag().to_string())
                    .unwrap_or_else(|| "und".to_string());
                let out = scratch_dir.join(format!("{}.{}.{}", media_base, lang, ext));
                std::fs::create_dir_all(scratch_dir)?;
                let args = extract_subtitle_args(container, *stream_index, &out);
                self.ffmpeg.run(&args, cancel).await?;
                candidate.path = Some(out.clone());
                Ok(out)
            }
        }
    }
}

fn best_match(
    candidates: &[SubtitleCandidate],
    language: &Language,
    for_target: bool,
) -> Option<SubtitleCandidate> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.language.as_ref().is_some_and(|l| l.matches(language)))
        .max_by_key(|(i, c)| {
            let priority = if for_target {
                c.kind.target_priority()
            } else {
                c.kind.native_priority()
            };
            let embedded = matches!(c.source, CandidateSource::Embedded { .. });
            // Higher tuple wins; later index loses (stable order).
            (priority, c.is_default, embedded, std::cmp::Reverse(*i))
        })
        .map(|(_, c)| c.clone())
}

fn kind_from_filename(name_lower: &str) -> SubtitleKind {
    if name_lower.contains(".cc.") || name_lower.contains("closedcaption") {
        SubtitleKind::ClosedCaptions
    } else if name_lower.contains("sdh") {
        SubtitleKind::StrippedSdh
    } else if name_lower.contains("dub") {
        SubtitleKind::Dubtitles
    } else {
        SubtitleKind::Dialogue
    }
}

fn kind_from_title(title: Option<&str>) -> SubtitleKind {
    let Some(title) = title else {
        return SubtitleKind::Dialogue;
    };
    let lower = title.to_lowercase();
    if lower.contains("sdh") {
        SubtitleKind::StrippedSdh
    } else if lower.contains("cc") || lower.contains("caption") {
        SubtitleKind::ClosedCaptions
    } else if lower.contains("dub") {
        SubtitleKind::Dubtitles
    } else {
        SubtitleKind::Dialogue
    }
}

fn extension_for_format(format: &str) -> &'static str {
    match format.to_uppercase().as_str() {
        "ASS" => "ass",
        "SSA" => "ssa",
        _ => "srt",
    }
}
