//! Dubtitle file naming rules.

use std::path::{Path, PathBuf};
use sublingo::services::stt::dubtitles::dubtitle_file_name;

#[test]
fn plain_base_gets_marker_appended() {
    assert_eq!(
        dubtitle_file_name(Path::new("/d/movie.ja.srt"), "whisper"),
        PathBuf::from("/d/movie.ja.DUBTITLES.WHISPER.srt")
    );
}

#[test]
fn subtitle_word_is_substituted_case_insensitively() {
    assert_eq!(
        dubtitle_file_name(Path::new("Show S01E02 subtitles.ja.ass"), "whisper"),
        PathBuf::from("Show S01E02 DUBTITLES.ja.WHISPER.ass")
    );
    assert_eq!(
        dubtitle_file_name(Path::new("movie.SUBTITLE.srt"), "whisper"),
        PathBuf::from("movie.DUBTITLES.WHISPER.srt")
    );
}

#[test]
fn model_marker_is_uppercased_and_sanitized() {
    assert_eq!(
        dubtitle_file_name(Path::new("movie.ja.srt"), "large-v3"),
        PathBuf::from("movie.ja.DUBTITLES.LARGE-V3.srt")
    );
    assert_eq!(
        dubtitle_file_name(Path::new("movie.ja.srt"), "openai/whisper-1"),
        PathBuf::from("movie.ja.DUBTITLES.OPENAI_WHISPER-1.srt")
    );
}

#[test]
fn original_extension_is_preserved() {
    let name = dubtitle_file_name(Path::new("movie.ja.ssa"), "whisper");
    assert_eq!(name.extension().unwrap(), "ssa");
}
