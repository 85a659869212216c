//! Output registry and container merger.
//!
//! Every successful artifact writer registers its file here. When merging
//! is enabled and the registry is non-empty, the merger composes a single
//! container: the source video, the highest-priority enhanced audio track
//! (else the source audio), and the registered subtitle artifacts with the
//! codec the container dictates.

use crate::Result;
use crate::core::language::Language;
use crate::core::media::FfmpegDriver;
use crate::core::media::ffmpeg::merge_args;
use crate::error::SubLingoError;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Kind of a produced artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// An original or derived subtitle file.
    Subtitle,
    /// An STT-derived dubtitle file.
    Dubtitle,
    /// A voice-isolated audio track.
    EnhancedAudio,
    /// A romanized subtitle rendering.
    Romanized,
    /// A tokenized subtitle rendering.
    Tokenized,
    /// The condensed audio compilation.
    CondensedAudio,
    /// The merged container itself.
    Merged,
}

/// One registered artifact.
#[derive(Debug, Clone)]
pub struct OutputRecord {
    /// Path of the written file.
    pub path: PathBuf,
    /// Artifact kind.
    pub kind: OutputKind,
    /// Language of the artifact, when language-bound.
    pub language: Option<Language>,
    /// Free-form feature tag (e.g. the transliteration kind).
    pub feature: String,
    /// Merge priority; higher wins when a kind has duplicates.
    pub priority: i32,
}

/// Collects produced artifacts for the merge stage.
#[derive(Debug, Default)]
pub struct OutputRegistry {
    records: Vec<OutputRecord>,
}

impl OutputRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an artifact. The file must exist; the registry only ever
    /// refers to files the engine actually wrote.
    pub fn register(&mut self, record: OutputRecord) -> Result<()> {
        if !record.path.exists() {
            return Err(SubLingoError::validation(format!(
                "refusing to register missing output file: {}",
                record.path.display()
            )));
        }
        self.records.push(record);
        Ok(())
    }

    /// Whether nothing was registered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in registration order.
    pub fn records(&self) -> &[OutputRecord] {
        &self.records
    }

    /// Subtitle-like artifacts (subtitles, dubtitles, transliterations)
    /// ordered by descending priority, then registration order.
    pub fn subtitle_artifacts(&self) -> Vec<&OutputRecord> {
        let mut subs: Vec<(usize, &OutputRecord)> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                matches!(
                    r.kind,
                    OutputKind::Subtitle
                        | OutputKind::Dubtitle
                        | OutputKind::Romanized
                        | OutputKind::Tokenized
                )
            })
            .collect();
        subs.sort_by_key(|(i, r)| (std::cmp::Reverse(r.priority), *i));
        subs.into_iter().map(|(_, r)| r).collect()
    }

    /// The highest-priority enhanced audio track, if any.
    pub fn best_enhanced_audio(&self) -> Option<&OutputRecord> {
        self.records
            .iter()
            .filter(|r| r.kind == OutputKind::EnhancedAudio)
            .max_by_key(|r| r.priority)
    }
}

/// Result of a merge attempt.
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// Merge was skipped (nothing registered or merging disabled).
    pub skipped: bool,
    /// Output path when a container was written.
    pub path: Option<PathBuf>,
    /// Whether the merge subprocess succeeded.
    pub ok: bool,
}

impl MergeResult {
    /// A skipped merge.
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            path: None,
            ok: true,
        }
    }
}

/// Assembles the merged container from the registry.
pub struct Merger {
    ffmpeg: FfmpegDriver,
}

impl Merger {
    /// Create a merger using the given transmuxer.
    pub fn new(ffmpeg: FfmpegDriver) -> Self {
        Self { ffmpeg }
    }

    /// Compute the merged container path: `<base>.MERGED.<ext>`.
    pub fn merged_path(video: &Path) -> PathBuf {
        let ext = video
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mkv")
            .to_string();
        let stem = video
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = format!("{}.MERGED.{}", stem, ext);
        match video.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Merge the registered artifacts around the source video.
    pub async fn merge(
        &self,
        video: &Path,
        registry: &OutputRegistry,
        cancel: &CancellationToken,
    ) -> Result<MergeResult> {
        if registry.is_empty() {
            return Ok(MergeResult::skipped());
        }

        let out = Self::merged_path(video);
        let audio = registry.best_enhanced_audio().map(|r| r.path.clone());
        let subtitles: Vec<(PathBuf, Language)> = registry
            .subtitle_artifacts()
            .into_iter()
            .map(|r| {
                (
                    r.path.clone(),
                    r.language
                        .clone()
                        .unwrap_or_else(|| Language::from_code("und")),
                )
            })
            .collect();

        let args = merge_args(video, audio.as_deref(), &subtitles, &out);
        self.ffmpeg.run(&args, cancel).await?;

        Ok(MergeResult {
            skipped: false,
            path: Some(out),
            ok: true,
        })
    }
}
