//! Transmuxer/encoder subprocess driver.
//!
//! Builds argument vectors for every FFmpeg-compatible invocation the engine
//! needs (per-cue audio clips, still images, WAV segments, embedded subtitle
//! extraction, enhanced-voice mixing, concat assembly, container merging)
//! and runs them with cancellation support. Argument construction is kept
//! separate from execution so the vectors are unit-testable.
//!
//! Single quotes in file names are tolerated by replacing them in any
//! concat-facing base name; a single quote in the containing directory is a
//! hard error enforced upstream by task validation (the concat list format
//! cannot escape it).

use crate::Result;
use crate::core::language::Language;
use crate::error::SubLingoError;
use log::debug;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// How many trailing stderr lines are kept for error reporting.
const STDERR_TAIL: usize = 12;

/// Transmuxer subprocess wrapper.
#[derive(Debug, Clone)]
pub struct FfmpegDriver {
    binary: String,
}

impl FfmpegDriver {
    /// Create a driver around the given binary.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run the transmuxer with the given argument vector, honoring
    /// cancellation. The subprocess is killed when the token fires.
    pub async fn run(&self, args: &[String], cancel: &CancellationToken) -> Result<()> {
        debug!("{} {}", self.binary, args.join(" "));
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SubLingoError::subprocess(&self.binary, format!("spawn failed: {}", e))
            })?;

        // Stream stderr so long encodes do not fill the pipe buffer.
        let stderr = child.stderr.take();
        let tail_task = tokio::spawn(async move {
            let mut tail: Vec<String> = Vec::new();
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tail.len() >= STDERR_TAIL {
                        tail.remove(0);
                    }
                    tail.push(line);
                }
            }
            tail
        });

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(SubLingoError::Canceled);
            }
            status = child.wait() => status.map_err(|e| {
                SubLingoError::subprocess(&self.binary, format!("wait failed: {}", e))
            })?,
        };

        let tail = tail_task.await.unwrap_or_default();
        if !status.success() {
            return Err(SubLingoError::subprocess(
                &self.binary,
                format!("exit {}: {}", status.code().unwrap_or(-1), tail.join(" | ")),
            ));
        }
        Ok(())
    }

    /// Write the concat list file for [`concat_args`], replacing single
    /// quotes inside file names.
    ///
    /// The concat list format cannot represent a quote in the directory
    /// part; task validation rejects such directories before any worker
    /// starts.
    pub fn write_concat_list(&self, segments: &[PathBuf], list_path: &Path) -> Result<()> {
        let mut content = String::new();
        for segment in segments {
            let dir = segment.parent().unwrap_or_else(|| Path::new(""));
            if dir.to_string_lossy().contains('\'') {
                return Err(SubLingoError::validation(format!(
                    "directory path contains an apostrophe, unsupported by concat lists: {}",
                    dir.display()
                )));
            }
            let name = segment
                .file_name()
                .map(|n| n.to_string_lossy().replace('\'', " "))
                .unwrap_or_default();
            content.push_str(&format!("file '{}'\n", dir.join(name).display()));
        }
        std::fs::write(list_path, content)?;
        Ok(())
    }
}

/// Format a duration as an FFmpeg `HH:MM:SS.mmm` time value.
pub fn fmt_time(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        total_ms / 3_600_000,
        (total_ms % 3_600_000) / 60_000,
        (total_ms % 60_000) / 1000,
        total_ms % 1000
    )
}

/// Apply a signed millisecond offset to a cue time, saturating at zero.
pub fn apply_offset(time: Duration, offset_ms: i64) -> Duration {
    if offset_ms >= 0 {
        time + Duration::from_millis(offset_ms as u64)
    } else {
        time.saturating_sub(Duration::from_millis(offset_ms.unsigned_abs()))
    }
}

/// Replace single quotes in a base name destined for concat-facing paths.
pub fn ffmpeg_safe_base(base: &str) -> String {
    base.replace('\'', " ")
}

/// Per-cue audio clip extraction (Opus in OGG).
pub fn audio_clip_args(
    media: &Path,
    audio_track: usize,
    start: Duration,
    end: Duration,
    offset_ms: i64,
    out: &Path,
) -> Vec<String> {
    vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-ss".into(),
        fmt_time(apply_offset(start, offset_ms)),
        "-to".into(),
        fmt_time(apply_offset(end, offset_ms)),
        "-i".into(),
        media.to_string_lossy().into_owned(),
        "-map".into(),
        format!("0:a:{}", audio_track),
        "-c:a".into(),
        "libopus".into(),
        "-b:a".into(),
        "64k".into(),
        out.to_string_lossy().into_owned(),
    ]
}

/// Per-cue still image extraction at the cue midpoint.
pub fn still_image_args(media: &Path, at: Duration, out: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-ss".into(),
        fmt_time(at),
        "-i".into(),
        media.to_string_lossy().into_owned(),
        "-frames:v".into(),
        "1".into(),
        "-q:v".into(),
        "2".into(),
        out.to_string_lossy().into_owned(),
    ]
}

/// Per-cue WAV segment extraction for condensed audio.
pub fn cue_wav_args(
    media: &Path,
    audio_track: usize,
    start: Duration,
    end: Duration,
    offset_ms: i64,
    out: &Path,
) -> Vec<String> {
    vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-ss".into(),
        fmt_time(apply_offset(start, offset_ms)),
        "-to".into(),
        fmt_time(apply_offset(end, offset_ms)),
        "-i".into(),
        media.to_string_lossy().into_owned(),
        "-map".into(),
        format!("0:a:{}", audio_track),
        "-ar".into(),
        "44100".into(),
        "-ac".into(),
        "2".into(),
        out.to_string_lossy().into_owned(),
    ]
}

/// Embedded subtitle track extraction to a standalone file.
pub fn extract_subtitle_args(media: &Path, stream_index: usize, out: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        media.to_string_lossy().into_owned(),
        "-map".into(),
        format!("0:{}", stream_index),
        out.to_string_lossy().into_owned(),
    ]
}

/// Whole-track audio extraction to a lossy-safe file for provider upload.
pub fn full_audio_args(media: &Path, audio_track: usize, out: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        media.to_string_lossy().into_owned(),
        "-map".into(),
        format!("0:a:{}", audio_track),
        "-ac".into(),
        "2".into(),
        "-c:a".into(),
        "flac".into(),
        out.to_string_lossy().into_owned(),
    ]
}

/// Enhanced-voice mix: isolated vocals boosted over the attenuated original
/// bed, then a limiter, encoded as Opus in OGG for merge sync.
pub fn enhance_mix_args(
    media: &Path,
    audio_track: usize,
    vocals: &Path,
    voice_gain_db: f64,
    original_gain_db: f64,
    out: &Path,
) -> Vec<String> {
    let filter = format!(
        "[1:a]volume={}dB[voice];[0:a:{}]volume={}dB[bed];[voice][bed]amix=inputs=2:duration=first,alimiter=limit=0.95",
        voice_gain_db, audio_track, original_gain_db
    );
    vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        media.to_string_lossy().into_owned(),
        "-i".into(),
        vocals.to_string_lossy().into_owned(),
        "-filter_complex".into(),
        filter,
        "-c:a".into(),
        "libopus".into(),
        "-b:a".into(),
        "128k".into(),
        out.to_string_lossy().into_owned(),
    ]
}

/// Concat-demuxer assembly of per-cue WAV segments into one audio file.
pub fn concat_args(list_file: &Path, out: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        list_file.to_string_lossy().into_owned(),
        "-c:a".into(),
        "libopus".into(),
        "-b:a".into(),
        "64k".into(),
        out.to_string_lossy().into_owned(),
    ]
}

/// Subtitle codec appropriate for a container extension.
pub fn subtitle_codec_for_container(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "mp4" | "m4v" | "mov" => "mov_text",
        "webm" => "webvtt",
        _ => "ass",
    }
}

/// Container merge: video copy, chosen audio copy, registered subtitle
/// artifacts with per-container codec and per-track language metadata.
pub fn merge_args(
    video: &Path,
    audio: Option<&Path>,
    subtitles: &[(PathBuf, Language)],
    out: &Path,
) -> Vec<String> {
    let ext = out
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mkv")
        .to_string();
    let sub_codec = subtitle_codec_for_container(&ext);

    let mut args: Vec<String> = vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        video.to_string_lossy().into_owned(),
    ];
    if let Some(audio) = audio {
        args.push("-i".into());
        args.push(audio.to_string_lossy().into_owned());
    }
    for (path, _) in subtitles {
        args.push("-i".into());
        args.push(path.to_string_lossy().into_owned());
    }

    // Input 0 supplies video; audio comes from the enhanced input when
    // present, else the source track.
    args.push("-map".into());
    args.push("0:v:0".into());
    let sub_input_base = if audio.is_some() {
        args.push("-map".into());
        args.push("1:a:0".into());
        2
    } else {
        args.push("-map".into());
        args.push("0:a:0".into());
        1
    };
    for (i, _) in subtitles.iter().enumerate() {
        args.push("-map".into());
        args.push(format!("{}:s:0", sub_input_base + i));
    }

    args.push("-c:v".into());
    args.push("copy".into());
    args.push("-c:a".into());
    args.push("copy".into());
    args.push("-c:s".into());
    args.push(sub_codec.into());

    for (i, (_, lang)) in subtitles.iter().enumerate() {
        args.push(format!("-metadata:s:s:{}", i));
        args.push(format!("language={}", lang.code()));
    }

    args.push(out.to_string_lossy().into_owned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_time() {
        assert_eq!(fmt_time(Duration::from_millis(1000)), "00:00:01.000");
        assert_eq!(fmt_time(Duration::from_millis(3_661_042)), "01:01:01.042");
    }

    #[test]
    fn test_apply_offset() {
        assert_eq!(
            apply_offset(Duration::from_secs(10), 500),
            Duration::from_millis(10_500)
        );
        assert_eq!(
            apply_offset(Duration::from_secs(10), -500),
            Duration::from_millis(9_500)
        );
        // negative offset saturates at zero
        assert_eq!(apply_offset(Duration::from_millis(100), -500), Duration::ZERO);
    }

    #[test]
    fn test_audio_clip_args_shape() {
        let args = audio_clip_args(
            Path::new("movie.mp4"),
            0,
            Duration::from_secs(1),
            Duration::from_secs(3),
            0,
            Path::new("out.ogg"),
        );
        assert!(args.contains(&"-ss".to_string()));
        assert!(args.contains(&"00:00:01.000".to_string()));
        assert!(args.contains(&"00:00:03.000".to_string()));
        assert!(args.contains(&"0:a:0".to_string()));
        assert_eq!(args.last().unwrap(), "out.ogg");
    }

    #[test]
    fn test_subtitle_codec_mapping() {
        assert_eq!(subtitle_codec_for_container("mp4"), "mov_text");
        assert_eq!(subtitle_codec_for_container("mkv"), "ass");
        assert_eq!(subtitle_codec_for_container("webm"), "webvtt");
    }

    #[test]
    fn test_merge_args_with_enhanced_audio() {
        let subs = vec![(PathBuf::from("movie.ja.srt"), Language::parse("ja").unwrap())];
        let args = merge_args(
            Path::new("movie.mkv"),
            Some(Path::new("enhanced.ogg")),
            &subs,
            Path::new("movie.MERGED.mkv"),
        );
        assert!(args.contains(&"1:a:0".to_string()));
        assert!(args.contains(&"2:s:0".to_string()));
        assert!(args.contains(&"-metadata:s:s:0".to_string()));
        assert!(args.contains(&"language=jpn".to_string()));
        assert!(args.contains(&"ass".to_string()));
    }

    #[test]
    fn test_merge_args_without_enhanced_audio() {
        let args = merge_args(
            Path::new("movie.mp4"),
            None,
            &[],
            Path::new("movie.MERGED.mp4"),
        );
        assert!(args.contains(&"0:a:0".to_string()));
        assert!(args.contains(&"mov_text".to_string()));
    }

    #[test]
    fn test_ffmpeg_safe_base() {
        assert_eq!(ffmpeg_safe_base("it's a movie"), "it s a movie");
        assert_eq!(ffmpeg_safe_base("plain"), "plain");
    }

    #[test]
    fn test_concat_list_rejects_apostrophe_directory() {
        let driver = FfmpegDriver::new("ffmpeg");
        let segments = vec![PathBuf::from("/data/it's here/seg_0001.wav")];
        let err = driver
            .write_concat_list(&segments, Path::new("/tmp/list.txt"))
            .unwrap_err();
        assert!(matches!(err, SubLingoError::Validation { .. }));
    }

    #[test]
    fn test_concat_list_content() {
        let temp = tempfile::TempDir::new().unwrap();
        let list = temp.path().join("list.txt");
        let segments = vec![
            temp.path().join("seg_0001.wav"),
            temp.path().join("don't.wav"),
        ];
        let driver = FfmpegDriver::new("ffmpeg");
        driver.write_concat_list(&segments, &list).unwrap();
        let content = std::fs::read_to_string(&list).unwrap();
        assert!(content.contains("seg_0001.wav"));
        // quote replaced inside the name
        assert!(content.contains("don t.wav"));
        assert_eq!(content.lines().count(), 2);
    }
}
