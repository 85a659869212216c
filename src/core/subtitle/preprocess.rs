//! Subtitle preprocessing: closed-caption bracket stripping and
//! default-style filtering.
//!
//! CC and dubtitle tracks carry non-lexical annotations (`[crowd noise]`,
//! `(door slams)`, speaker dashes) that must not reach the per-cue
//! processing stage. Style filtering keeps only default-style cues for
//! positional formats, dropping signs and karaoke lines.

use crate::core::subtitle::{Cue, SubtitleDocument};
use once_cell::sync::Lazy;
use regex::Regex;

static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)").unwrap());
static MUSIC_NOTE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[♪♫\s]*$").unwrap());
static SPEAKER_DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*-\s*").unwrap());

/// Strip closed-caption annotations from every cue in place.
///
/// Removes bracketed and parenthesized content, music-note-only lines, and
/// leading speaker dashes. Cues whose text becomes empty are kept (the
/// filtered item count accounts for them via [`SubtitleDocument::item_count`]).
pub fn strip_cc_annotations(doc: &mut SubtitleDocument) {
    for cue in &mut doc.cues {
        strip_cue(cue);
    }
}

fn strip_cue(cue: &mut Cue) {
    let mut new_lines = Vec::with_capacity(cue.lines.len());
    for line in &cue.lines {
        let without_brackets = BRACKETED.replace_all(line, "");
        if MUSIC_NOTE_LINE.is_match(&without_brackets) {
            continue;
        }
        let without_dash = SPEAKER_DASH.replace(&without_brackets, "");
        let cleaned = without_dash.trim().to_string();
        if !cleaned.is_empty() {
            new_lines.push(cleaned);
        }
    }
    cue.lines = new_lines;
}

/// Keep only default-style cues, returning the number of cues removed.
///
/// Applying the filter twice is a no-op: the survivors all carry the
/// default style already.
pub fn filter_default_style(doc: &mut SubtitleDocument) -> usize {
    let Some(default) = doc.default_style.clone() else {
        return 0;
    };
    let before = doc.cues.len();
    doc.cues.retain(|cue| match &cue.style {
        Some(style) => style.eq_ignore_ascii_case(&default),
        None => true,
    });
    before - doc.cues.len()
}
