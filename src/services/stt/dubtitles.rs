//! Dubtitle derivation: re-voicing subtitle text with STT transcriptions of
//! the dub track's per-cue audio clips.
//!
//! The tabular output file already references one audio clip per processed
//! cue; each clip is transcribed and the resulting text replaces the cue's
//! lines while the original timings stay untouched.

use crate::Result;
use crate::core::language::Language;
use crate::core::subtitle::SubtitleDocument;
use crate::services::stt::SpeechToText;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

static SUBTITLE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)subtitles?").unwrap());

/// Build the dubtitle output file name from the subtitle file it derives
/// from: `subtitle(s)` becomes `DUBTITLES` (case-insensitive) or the marker
/// is appended, followed by the uppercased STT model and the original
/// extension.
pub fn dubtitle_file_name(subtitle_path: &Path, model: &str) -> PathBuf {
    let stem = subtitle_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = subtitle_path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "srt".to_string());

    let base = if SUBTITLE_TOKEN.is_match(&stem) {
        SUBTITLE_TOKEN.replace_all(&stem, "DUBTITLES").into_owned()
    } else {
        format!("{}.DUBTITLES", stem)
    };

    let model_marker = model.to_uppercase().replace(['/', ' '], "_");
    let name = format!("{}.{}.{}", base, model_marker, ext);
    match subtitle_path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Derive a dubtitle document: transcribe each cue's audio clip and replace
/// the cue text, keeping the original timings.
///
/// `clips` maps cue index to the clip produced for it; cues without a clip
/// keep their existing text.
pub async fn derive_dubtitles(
    document: &SubtitleDocument,
    clips: &[(usize, PathBuf)],
    stt: &dyn SpeechToText,
    language: Option<&Language>,
    prompt: Option<&str>,
    cancel: &CancellationToken,
) -> Result<SubtitleDocument> {
    let mut dubtitles = document.deep_copy();
    for (index, clip) in clips {
        if cancel.is_cancelled() {
            return Err(crate::error::SubLingoError::Canceled);
        }
        let Some(cue) = dubtitles.cues.get_mut(*index) else {
            continue;
        };
        let transcript = stt.transcribe(clip, language, prompt, cancel).await?;
        let text = transcript.text.trim();
        if !text.is_empty() {
            cue.lines = text.lines().map(|l| l.to_string()).collect();
        }
    }
    Ok(dubtitles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::subtitle::{Cue, SubtitleFileFormat};
    use crate::services::stt::MockSpeechToText;
    use std::time::Duration;

    #[test]
    fn test_name_without_subtitle_token_appends_marker() {
        let name = dubtitle_file_name(Path::new("/d/movie.ja.srt"), "whisper");
        assert_eq!(name, PathBuf::from("/d/movie.ja.DUBTITLES.WHISPER.srt"));
    }

    #[test]
    fn test_name_substitutes_subtitle_token_case_insensitive() {
        let name = dubtitle_file_name(Path::new("movie Subtitles.ja.srt"), "whisper");
        assert_eq!(name, PathBuf::from("movie DUBTITLES.ja.WHISPER.srt"));

        let name = dubtitle_file_name(Path::new("movie.SUBTITLE.srt"), "large-v3");
        assert_eq!(name, PathBuf::from("movie.DUBTITLES.LARGE-V3.srt"));
    }

    #[tokio::test]
    async fn test_derivation_keeps_timings_and_replaces_text() {
        let document = SubtitleDocument {
            cues: vec![
                Cue {
                    start: Duration::from_secs(1),
                    end: Duration::from_secs(3),
                    lines: vec!["original one".to_string()],
                    style: None,
                },
                Cue {
                    start: Duration::from_secs(4),
                    end: Duration::from_secs(6),
                    lines: vec!["original two".to_string()],
                    style: None,
                },
            ],
            format: SubtitleFileFormat::Srt,
            header: String::new(),
            default_style: None,
        };
        let clips = vec![(0usize, PathBuf::from("clip_0001.ogg"))];
        let stt = MockSpeechToText::new("base");

        let dubtitles = derive_dubtitles(
            &document,
            &clips,
            &stt,
            None,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(dubtitles.cues[0].start, Duration::from_secs(1));
        assert_eq!(dubtitles.cues[0].text(), "transcribed clip_0001");
        // the cue without a clip keeps its text
        assert_eq!(dubtitles.cues[1].text(), "original two");
        // the source document is untouched
        assert_eq!(document.cues[0].text(), "original one");
    }
}
