//! Language tags and filename-based language guessing.
//!
//! A [`Language`] is an ISO 639-3 code with an optional script/region subtag
//! and an optional human-readable name. Tags are immutable after
//! construction. Guessing from filenames recognizes the common
//! `name.<code>.srt` / `name_<code>.srt` / `name-<code>.srt` conventions.
//!
//! # Examples
//!
//! ```rust
//! use sublingo::core::language::Language;
//! use std::path::Path;
//!
//! let lang = Language::parse("ja").unwrap();
//! assert_eq!(lang.code(), "jpn");
//! let guessed = Language::guess_from_filename(Path::new("movie.ja.srt")).unwrap();
//! assert!(lang.matches(&guessed));
//! ```
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Mapping from ISO 639-1 (and common aliases) to ISO 639-3 codes.
static ALIAS_TO_639_3: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("ja", "jpn");
    m.insert("jp", "jpn");
    m.insert("en", "eng");
    m.insert("de", "deu");
    m.insert("ger", "deu");
    m.insert("fr", "fra");
    m.insert("fre", "fra");
    m.insert("es", "spa");
    m.insert("it", "ita");
    m.insert("ko", "kor");
    m.insert("zh", "zho");
    m.insert("chi", "zho");
    m.insert("ru", "rus");
    m.insert("pt", "por");
    m.insert("nl", "nld");
    m.insert("dut", "nld");
    m.insert("pl", "pol");
    m.insert("sv", "swe");
    m.insert("ar", "ara");
    m.insert("hi", "hin");
    m.insert("th", "tha");
    m.insert("vi", "vie");
    m.insert("id", "ind");
    m.insert("tr", "tur");
    m
});

/// Display names for a handful of common codes.
static NAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("jpn", "Japanese");
    m.insert("eng", "English");
    m.insert("deu", "German");
    m.insert("fra", "French");
    m.insert("spa", "Spanish");
    m.insert("ita", "Italian");
    m.insert("kor", "Korean");
    m.insert("zho", "Chinese");
    m.insert("rus", "Russian");
    m.insert("por", "Portuguese");
    m
});

static FILENAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"[._-]([a-zA-Z]{2,3}(?:-[a-zA-Z]{2,4})?)\.[^.]+$").unwrap(),
        Regex::new(r"\.([a-zA-Z]{2,3})\.").unwrap(),
    ]
});

/// Codes the filename guesser accepts. User-supplied tags may be any ISO
/// 639-3 string, but filename tokens are only trusted when they are known
/// codes; otherwise `movie.en.sdh.srt` would guess "sdh".
static KNOWN_CODES: Lazy<std::collections::HashSet<&'static str>> = Lazy::new(|| {
    let mut set = std::collections::HashSet::new();
    for (alias, code) in ALIAS_TO_639_3.iter() {
        set.insert(*alias);
        set.insert(*code);
    }
    for code in NAMES.keys() {
        set.insert(*code);
    }
    set
});

/// An immutable language tag: ISO 639-3 code plus optional subtag.
///
/// Two tags match if their codes are equal and their subtags are either both
/// empty or equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Language {
    code: String,
    subtag: Option<String>,
    name: Option<String>,
    raw: String,
}

impl Language {
    /// Parse a language tag from user input.
    ///
    /// Accepts ISO 639-1 ("ja"), ISO 639-3 ("jpn"), and subtagged forms
    /// ("zh-Hant", "pt-BR"). Returns `None` for strings that cannot be a
    /// language code.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        let (raw_code, subtag) = match input.split_once('-') {
            Some((c, s)) => (c, Some(s.to_string())),
            None => (input, None),
        };
        let raw_lower = raw_code.to_lowercase();
        let code = match raw_lower.len() {
            2 => (*ALIAS_TO_639_3.get(raw_lower.as_str())?).to_string(),
            3 => ALIAS_TO_639_3
                .get(raw_lower.as_str())
                .map(|c| c.to_string())
                .unwrap_or_else(|| raw_lower.clone()),
            _ => return None,
        };
        let name = NAMES.get(code.as_str()).map(|n| n.to_string());
        let raw = match &subtag {
            Some(sub) => format!("{}-{}", raw_lower, sub),
            None => raw_lower,
        };
        Some(Self {
            code,
            subtag,
            name,
            raw,
        })
    }

    /// Construct directly from a known ISO 639-3 code.
    pub fn from_code(code: &str) -> Self {
        let code = code.to_lowercase();
        let name = NAMES.get(code.as_str()).map(|n| n.to_string());
        Self {
            raw: code.clone(),
            code,
            subtag: None,
            name,
        }
    }

    /// The ISO 639-3 code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The optional script/region subtag.
    pub fn subtag(&self) -> Option<&str> {
        self.subtag.as_deref()
    }

    /// The human-readable name, if known.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The tag as the user or source wrote it (lowercased), used in
    /// filename construction so `ja` stays `ja` rather than `jpn`.
    pub fn short_tag(&self) -> &str {
        &self.raw
    }

    /// Whether two tags denote the same language.
    ///
    /// Codes must be equal; subtags must be both empty or equal.
    pub fn matches(&self, other: &Language) -> bool {
        if self.code != other.code {
            return false;
        }
        match (&self.subtag, &other.subtag) {
            (None, None) => true,
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }

    /// Guess the language tag from a filename.
    ///
    /// Recognizes `movie.ja.srt`, `movie_jpn.srt`, `movie-ja.ass`, and
    /// subtagged forms like `movie.zh-Hant.srt`.
    pub fn guess_from_filename(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        for re in FILENAME_PATTERNS.iter() {
            for cap in re.captures_iter(name) {
                let Some(m) = cap.get(1) else { continue };
                let token = m.as_str();
                let code_part = token.split('-').next().unwrap_or(token).to_lowercase();
                if !KNOWN_CODES.contains(code_part.as_str()) {
                    continue;
                }
                if let Some(lang) = Self::parse(token) {
                    return Some(lang);
                }
            }
        }
        None
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subtag {
            Some(sub) => write!(f, "{}-{}", self.code, sub),
            None => write!(f, "{}", self.code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_parse_iso_639_1_maps_to_639_3() {
        let lang = Language::parse("ja").unwrap();
        assert_eq!(lang.code(), "jpn");
        assert_eq!(lang.name(), Some("Japanese"));
    }

    #[test]
    fn test_parse_iso_639_3_passthrough() {
        let lang = Language::parse("jpn").unwrap();
        assert_eq!(lang.code(), "jpn");
        let unknown = Language::parse("xyz").unwrap();
        assert_eq!(unknown.code(), "xyz");
        assert!(unknown.name().is_none());
    }

    #[test]
    fn test_parse_rejects_non_codes() {
        assert!(Language::parse("").is_none());
        assert!(Language::parse("engl").is_none());
        assert!(Language::parse("x").is_none());
    }

    #[test]
    fn test_matching_rules() {
        let a = Language::parse("ja").unwrap();
        let b = Language::parse("jpn").unwrap();
        assert!(a.matches(&b));

        let tagged = Language::parse("zh-Hant").unwrap();
        let plain = Language::parse("zh").unwrap();
        assert!(!tagged.matches(&plain));
        assert!(tagged.matches(&Language::parse("zh-hant").unwrap()));
    }

    #[test]
    fn test_guess_from_filename() {
        let lang = Language::guess_from_filename(Path::new("movie.ja.srt")).unwrap();
        assert_eq!(lang.code(), "jpn");
        let lang = Language::guess_from_filename(Path::new("show_en.ass")).unwrap();
        assert_eq!(lang.code(), "eng");
        assert!(Language::guess_from_filename(Path::new("movie.srt")).is_none());
    }

    #[test]
    fn test_guess_skips_non_language_tokens() {
        // "sdh" sits next to the extension but is not a language
        let lang = Language::guess_from_filename(Path::new("movie.en.sdh.srt")).unwrap();
        assert_eq!(lang.code(), "eng");
        assert!(Language::guess_from_filename(Path::new("movie.sdh.srt")).is_none());
    }

    #[test]
    fn test_guess_with_subtag() {
        let lang = Language::guess_from_filename(Path::new("movie.zh-Hant.srt")).unwrap();
        assert_eq!(lang.code(), "zho");
        assert_eq!(lang.subtag(), Some("Hant"));
    }

    #[test]
    fn test_short_tag_preserves_input_form() {
        assert_eq!(Language::parse("ja").unwrap().short_tag(), "ja");
        assert_eq!(Language::parse("jpn").unwrap().short_tag(), "jpn");
        assert_eq!(Language::parse("zh-Hant").unwrap().short_tag(), "zh-Hant");
    }

    #[test]
    fn test_display() {
        assert_eq!(Language::parse("ja").unwrap().to_string(), "jpn");
        assert_eq!(Language::parse("zh-Hant").unwrap().to_string(), "zho-Hant");
    }
}
