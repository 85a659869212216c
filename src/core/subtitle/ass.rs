//! Advanced SubStation Alpha (.ass/.ssa) parsing and serialization.
//!
//! Only the `[Events]` section is parsed into cues; `[Script Info]` and
//! `[V4+ Styles]` are retained verbatim in the document header so a write
//! round-trips the styling. The default style name is taken from the first
//! style whose name is `Default`, else the first declared style.

use crate::Result;
use crate::core::subtitle::{Cue, SubtitleDocument, SubtitleFileFormat};
use crate::error::SubLingoError;
use std::time::Duration;

/// Parse ASS/SSA content into a document.
pub fn parse(content: &str, format: SubtitleFileFormat) -> Result<SubtitleDocument> {
    let normalized = content.replace("\r\n", "\n");
    let mut header = String::new();
    let mut cues = Vec::new();
    let mut default_style: Option<String> = None;
    let mut in_events = false;
    let mut event_format: Vec<String> = Vec::new();

    for line in normalized.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('[') {
            in_events = trimmed.eq_ignore_ascii_case("[events]");
            if !in_events {
                header.push_str(line);
                header.push('\n');
            }
            continue;
        }

        if !in_events {
            header.push_str(line);
            header.push('\n');
            // Track the first declared style as default candidate; an
            // explicit "Default" style always wins.
            if let Some(rest) = trimmed.strip_prefix("Style:") {
                let name = rest.split(',').next().unwrap_or("").trim().to_string();
                if !name.is_empty() {
                    let pinned = default_style.as_deref() == Some("Default");
                    if !pinned && (name == "Default" || default_style.is_none()) {
                        default_style = Some(name);
                    }
                }
            }
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("Format:") {
            event_format = rest.split(',').map(|f| f.trim().to_lowercase()).collect();
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("Dialogue:") {
            let cue = parse_dialogue(rest, &event_format)?;
            cues.push(cue);
        }
    }

    Ok(SubtitleDocument {
        cues,
        format,
        header,
        default_style,
    })
}

/// Serialize a document as ASS/SSA, re-emitting the retained header.
pub fn serialize(doc: &SubtitleDocument) -> String {
    let mut output = String::new();
    if doc.header.trim().is_empty() {
        output.push_str("[Script Info]\nScriptType: v4.00+\n\n");
    } else {
        output.push_str(&doc.header);
        if !doc.header.ends_with('\n') {
            output.push('\n');
        }
    }
    output.push_str("[Events]\n");
    output.push_str("Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n");
    for cue in &doc.cues {
        let style = cue.style.as_deref().unwrap_or("Default");
        output.push_str(&format!(
            "Dialogue: 0,{},{},{},,0,0,0,,{}\n",
            format_ass_time(cue.start),
            format_ass_time(cue.end),
            style,
            cue.lines.join("\\N"),
        ));
    }
    output
}

fn parse_dialogue(rest: &str, event_format: &[String]) -> Result<Cue> {
    // The Text field may itself contain commas: split only as many times as
    // there are leading fields.
    let field_count = if event_format.is_empty() {
        10
    } else {
        event_format.len()
    };
    let fields: Vec<&str> = rest.splitn(field_count, ',').collect();
    if fields.len() < 3 {
        return Err(SubLingoError::subtitle_format(
            "ASS",
            format!("dialogue line with too few fields: {}", rest),
        ));
    }

    let idx_of = |name: &str, fallback: usize| -> usize {
        event_format
            .iter()
            .position(|f| f == name)
            .unwrap_or(fallback)
    };
    let start_idx = idx_of("start", 1);
    let end_idx = idx_of("end", 2);
    let style_idx = idx_of("style", 3);
    let text_idx = fields.len() - 1;

    let start = parse_ass_time(fields.get(start_idx).unwrap_or(&"").trim())?;
    let end = parse_ass_time(fields.get(end_idx).unwrap_or(&"").trim())?;
    let style = fields
        .get(style_idx)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let raw_text = fields.get(text_idx).unwrap_or(&"").trim();
    let stripped = strip_override_tags(raw_text);
    let lines: Vec<String> = stripped
        .split("\\N")
        .map(|l| l.trim().to_string())
        .collect();

    Ok(Cue {
        start,
        end,
        lines,
        style,
    })
}

/// Remove `{\...}` override tags from dialogue text.
fn strip_override_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for ch in text.chars() {
        match ch {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Parse `H:MM:SS.cc` centisecond timestamps.
fn parse_ass_time(value: &str) -> Result<Duration> {
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() != 3 {
        return Err(SubLingoError::subtitle_format(
            "ASS",
            format!("bad timestamp: {}", value),
        ));
    }
    let hours: u64 = parts[0]
        .parse()
        .map_err(|e| SubLingoError::subtitle_format("ASS", format!("bad hours: {}", e)))?;
    let minutes: u64 = parts[1]
        .parse()
        .map_err(|e| SubLingoError::subtitle_format("ASS", format!("bad minutes: {}", e)))?;
    let (secs_str, centis_str) = parts[2].split_once('.').unwrap_or((parts[2], "0"));
    let seconds: u64 = secs_str
        .parse()
        .map_err(|e| SubLingoError::subtitle_format("ASS", format!("bad seconds: {}", e)))?;
    let centis: u64 = centis_str
        .parse()
        .map_err(|e| SubLingoError::subtitle_format("ASS", format!("bad centiseconds: {}", e)))?;

    Ok(Duration::from_millis(
        hours * 3_600_000 + minutes * 60_000 + seconds * 1000 + centis * 10,
    ))
}

fn format_ass_time(duration: Duration) -> String {
    let total_cs = duration.as_millis() / 10;
    let hours = total_cs / 360_000;
    let minutes = (total_cs % 360_000) / 6000;
    let seconds = (total_cs % 6000) / 100;
    let centis = total_cs % 100;
    format!("{}:{:02}:{:02}.{:02}", hours, minutes, seconds, centis)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_ASS: &str = "[Script Info]\nTitle: Test\nScriptType: v4.00+\n\n[V4+ Styles]\nFormat: Name, Fontname\nStyle: Default,Arial\nStyle: Signs,Arial\n\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\nDialogue: 0,0:00:01.00,0:00:03.00,Default,,0,0,0,,Hello there\nDialogue: 0,0:00:04.50,0:00:06.00,Signs,,0,0,0,,{\\pos(120,50)}Sign text\nDialogue: 0,0:00:07.00,0:00:09.00,Default,,0,0,0,,First\\NSecond\n";

    #[test]
    fn test_ass_parsing_basic() {
        let doc = parse(SAMPLE_ASS, SubtitleFileFormat::Ass).unwrap();
        assert_eq!(doc.cues.len(), 3);
        assert_eq!(doc.default_style.as_deref(), Some("Default"));

        let first = &doc.cues[0];
        assert_eq!(first.start, Duration::from_millis(1000));
        assert_eq!(first.end, Duration::from_millis(3000));
        assert_eq!(first.style.as_deref(), Some("Default"));
        assert_eq!(first.text(), "Hello there");
    }

    #[test]
    fn test_override_tags_stripped() {
        let doc = parse(SAMPLE_ASS, SubtitleFileFormat::Ass).unwrap();
        assert_eq!(doc.cues[1].text(), "Sign text");
        assert_eq!(doc.cues[1].style.as_deref(), Some("Signs"));
    }

    #[test]
    fn test_multiline_dialogue() {
        let doc = parse(SAMPLE_ASS, SubtitleFileFormat::Ass).unwrap();
        assert_eq!(doc.cues[2].lines, vec!["First", "Second"]);
    }

    #[test]
    fn test_header_retained_on_serialize() {
        let doc = parse(SAMPLE_ASS, SubtitleFileFormat::Ass).unwrap();
        let out = serialize(&doc);
        assert!(out.contains("Title: Test"));
        assert!(out.contains("Dialogue: 0,0:00:01.00,0:00:03.00,Default"));
        let back = parse(&out, SubtitleFileFormat::Ass).unwrap();
        assert_eq!(back.cues.len(), 3);
        assert_eq!(back.cues[0].text(), "Hello there");
    }

    #[test]
    fn test_text_with_commas_survives() {
        let content = "[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\nDialogue: 0,0:00:01.00,0:00:02.00,Default,,0,0,0,,one, two, three\n";
        let doc = parse(content, SubtitleFileFormat::Ass).unwrap();
        assert_eq!(doc.cues[0].text(), "one, two, three");
    }
}
