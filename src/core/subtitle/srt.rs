//! SubRip (.srt) parsing and serialization.

use crate::Result;
use crate::core::subtitle::{Cue, SubtitleDocument, SubtitleFileFormat, format_timestamp};
use crate::error::SubLingoError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

static TIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{2}):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d{2}):(\d{2}):(\d{2})[,.](\d{3})")
        .unwrap()
});

/// Parse SRT content into a document.
pub fn parse(content: &str) -> Result<SubtitleDocument> {
    let normalized = content.replace("\r\n", "\n");
    let mut cues = Vec::new();

    for block in normalized.split("\n\n") {
        if block.trim().is_empty() {
            continue;
        }
        let lines: Vec<&str> = block.lines().collect();

        // The numeric counter line is optional in the wild; find the timing
        // line and take everything after it as text.
        let timing_pos = lines.iter().position(|l| TIME_REGEX.is_match(l));
        let Some(pos) = timing_pos else { continue };

        let caps = TIME_REGEX.captures(lines[pos]).ok_or_else(|| {
            SubLingoError::subtitle_format("SRT", format!("bad timing line: {}", lines[pos]))
        })?;
        let start = parse_time(&caps, 1)?;
        let end = parse_time(&caps, 5)?;
        let text_lines: Vec<String> = lines[pos + 1..]
            .iter()
            .map(|l| l.to_string())
            .collect();

        cues.push(Cue {
            start,
            end,
            lines: text_lines,
            style: None,
        });
    }

    Ok(SubtitleDocument {
        cues,
        format: SubtitleFileFormat::Srt,
        header: String::new(),
        default_style: None,
    })
}

/// Serialize a document as SRT, renumbering entries from 1.
pub fn serialize(doc: &SubtitleDocument) -> String {
    let mut output = String::new();
    for (i, cue) in doc.cues.iter().enumerate() {
        output.push_str(&format!("{}\n", i + 1));
        output.push_str(&format!(
            "{} --> {}\n",
            format_timestamp(cue.start),
            format_timestamp(cue.end)
        ));
        output.push_str(&cue.lines.join("\n"));
        output.push_str("\n\n");
    }
    output
}

fn parse_time(caps: &regex::Captures, start_group: usize) -> Result<Duration> {
    let mut parts = [0u64; 4];
    for (i, part) in parts.iter_mut().enumerate() {
        *part = caps[start_group + i]
            .parse()
            .map_err(|e| SubLingoError::subtitle_format("SRT", format!("bad time value: {}", e)))?;
    }
    Ok(Duration::from_millis(
        parts[0] * 3_600_000 + parts[1] * 60_000 + parts[2] * 1000 + parts[3],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_SRT: &str = "1\n00:00:01,000 --> 00:00:03,000\nHello, World!\n\n2\n00:00:05,000 --> 00:00:08,000\nThis is a test subtitle.\nSecond line\n\n";

    #[test]
    fn test_srt_parsing_basic() {
        let doc = parse(SAMPLE_SRT).unwrap();
        assert_eq!(doc.cues.len(), 2);
        assert_eq!(doc.format, SubtitleFileFormat::Srt);

        let first = &doc.cues[0];
        assert_eq!(first.start, Duration::from_millis(1000));
        assert_eq!(first.end, Duration::from_millis(3000));
        assert_eq!(first.text(), "Hello, World!");

        let second = &doc.cues[1];
        assert_eq!(second.lines.len(), 2);
        assert_eq!(second.text(), "This is a test subtitle.\nSecond line");
    }

    #[test]
    fn test_srt_parsing_crlf_and_missing_counter() {
        let content = "00:00:01,000 --> 00:00:02,000\r\nNo counter line\r\n\r\n";
        let doc = parse(content).unwrap();
        assert_eq!(doc.cues.len(), 1);
        assert_eq!(doc.cues[0].text(), "No counter line");
    }

    #[test]
    fn test_srt_serialization_roundtrip() {
        let doc = parse(SAMPLE_SRT).unwrap();
        let out = serialize(&doc);
        let back = parse(&out).unwrap();
        assert_eq!(back.cues, doc.cues);
    }

    #[test]
    fn test_srt_dot_millisecond_separator() {
        let content = "1\n00:00:01.500 --> 00:00:02.750\nDot separators\n\n";
        let doc = parse(content).unwrap();
        assert_eq!(doc.cues[0].start, Duration::from_millis(1500));
        assert_eq!(doc.cues[0].end, Duration::from_millis(2750));
    }

    #[test]
    fn test_empty_content() {
        let doc = parse("").unwrap();
        assert!(doc.cues.is_empty());
    }
}
