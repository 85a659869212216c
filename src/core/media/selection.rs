//! Audio track selection.
//!
//! Selectors run in a fixed order (ideal match, any language match, first
//! track); the first selector that assigns a track wins. Selection is
//! deterministic given the same track list and target language.

use crate::core::language::Language;
use crate::core::media::AudioTrack;

/// A single audio-track selection strategy.
pub trait AudioSelector {
    /// Return the chosen track index among `tracks`, or `None` to defer to
    /// the next selector.
    fn select(&self, tracks: &[AudioTrack], target: Option<&Language>) -> Option<usize>;

    /// Strategy name for logging.
    fn name(&self) -> &'static str;
}

/// Language matches, track is not a commentary, and it is either the
/// container default or at least stereo.
pub struct IdealMatchSelector;

impl AudioSelector for IdealMatchSelector {
    fn select(&self, tracks: &[AudioTrack], target: Option<&Language>) -> Option<usize> {
        let target = target?;
        tracks
            .iter()
            .filter(|t| {
                t.language.as_ref().is_some_and(|l| l.matches(target))
                    && !is_commentary(t)
                    && (t.default || t.channels >= 2)
            })
            .min_by_key(|t| t.stream_order)
            .map(|t| t.index)
    }

    fn name(&self) -> &'static str {
        "ideal-match"
    }
}

/// Any track whose language matches the target.
pub struct AnyLanguageMatchSelector;

impl AudioSelector for AnyLanguageMatchSelector {
    fn select(&self, tracks: &[AudioTrack], target: Option<&Language>) -> Option<usize> {
        let target = target?;
        tracks
            .iter()
            .filter(|t| t.language.as_ref().is_some_and(|l| l.matches(target)))
            .min_by_key(|t| t.stream_order)
            .map(|t| t.index)
    }

    fn name(&self) -> &'static str {
        "any-language-match"
    }
}

/// Fall back to the first track in stream order.
pub struct FirstTrackSelector;

impl AudioSelector for FirstTrackSelector {
    fn select(&self, tracks: &[AudioTrack], _target: Option<&Language>) -> Option<usize> {
        tracks.iter().min_by_key(|t| t.stream_order).map(|t| t.index)
    }

    fn name(&self) -> &'static str {
        "first-track"
    }
}

fn is_commentary(track: &AudioTrack) -> bool {
    track
        .title
        .as_deref()
        .is_some_and(|t| t.to_lowercase().contains("commentary"))
}

/// Run the selector chain; `None` only when the track list is empty.
pub fn select_audio_track(tracks: &[AudioTrack], target: Option<&Language>) -> Option<usize> {
    let selectors: [&dyn AudioSelector; 3] = [
        &IdealMatchSelector,
        &AnyLanguageMatchSelector,
        &FirstTrackSelector,
    ];
    for selector in selectors {
        if let Some(index) = selector.select(tracks, target) {
            log::debug!("audio track {} chosen by {}", index, selector.name());
            return Some(index);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(
        index: usize,
        lang: Option<&str>,
        channels: u32,
        title: Option<&str>,
        default: bool,
    ) -> AudioTrack {
        AudioTrack {
            index,
            language: lang.and_then(Language::parse),
            channels,
            title: title.map(|t| t.to_string()),
            codec: "aac".to_string(),
            format: "AAC".to_string(),
            default,
            stream_order: index,
        }
    }

    #[test]
    fn test_ideal_match_wins() {
        let tracks = vec![
            track(0, Some("en"), 2, None, true),
            track(1, Some("ja"), 2, None, false),
        ];
        let target = Language::parse("ja").unwrap();
        assert_eq!(select_audio_track(&tracks, Some(&target)), Some(1));
    }

    #[test]
    fn test_commentary_skipped_by_ideal_but_caught_by_any() {
        let tracks = vec![track(0, Some("ja"), 2, Some("Director Commentary"), false)];
        let target = Language::parse("ja").unwrap();
        // ideal rejects the commentary; any-language still matches it
        assert_eq!(select_audio_track(&tracks, Some(&target)), Some(0));
    }

    #[test]
    fn test_fallback_to_first_track() {
        let tracks = vec![
            track(0, Some("en"), 2, None, false),
            track(1, Some("de"), 2, None, false),
        ];
        let target = Language::parse("ja").unwrap();
        assert_eq!(select_audio_track(&tracks, Some(&target)), Some(0));
    }

    #[test]
    fn test_no_target_uses_first_track() {
        let tracks = vec![track(0, None, 2, None, false)];
        assert_eq!(select_audio_track(&tracks, None), Some(0));
    }

    #[test]
    fn test_empty_track_list() {
        assert_eq!(select_audio_track(&[], None), None);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let tracks = vec![
            track(0, Some("ja"), 2, None, false),
            track(1, Some("ja"), 2, None, false),
        ];
        let target = Language::parse("ja").unwrap();
        let first = select_audio_track(&tracks, Some(&target));
        for _ in 0..10 {
            assert_eq!(select_audio_track(&tracks, Some(&target)), first);
        }
    }
}
