//! Resumption duplicate detection.
//!
//! The tabular output file is read once at startup; afterwards every lookup
//! is an in-memory substring check for the fingerprint
//! `<sep><HH:MM:SS,mmm><sep>`. A cue whose fingerprint is present is never
//! re-processed and never re-written.

use crate::Result;
use std::path::Path;

/// In-memory duplicate checker over the existing tabular output.
pub struct DuplicateChecker {
    content: String,
    separator: String,
}

impl DuplicateChecker {
    /// Read the output file once. A missing file yields an empty checker
    /// (nothing is a duplicate).
    pub fn from_file(path: &Path, separator: &str) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            content,
            separator: separator.to_string(),
        })
    }

    /// Build a checker over in-memory content (tests).
    pub fn from_content(content: impl Into<String>, separator: &str) -> Self {
        Self {
            content: content.into(),
            separator: separator.to_string(),
        }
    }

    /// Whether a cue starting at `timestamp` was already emitted.
    pub fn contains(&self, timestamp: &str) -> bool {
        if self.content.is_empty() {
            return false;
        }
        let fingerprint = format!("{}{}{}", self.separator, timestamp, self.separator);
        self.content.contains(&fingerprint)
    }

    /// Number of existing rows (for logging).
    pub fn existing_rows(&self) -> usize {
        self.content.lines().filter(|l| !l.trim().is_empty()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let checker =
            DuplicateChecker::from_file(&temp.path().join("none.tsv"), "\t").unwrap();
        assert!(!checker.contains("00:00:01,000"));
        assert_eq!(checker.existing_rows(), 0);
    }

    #[test]
    fn test_fingerprint_match() {
        let checker = DuplicateChecker::from_content(
            "clip.ogg\t00:00:04,000\timg.jpg\ttext\n",
            "\t",
        );
        assert!(checker.contains("00:00:04,000"));
        assert!(!checker.contains("00:00:01,000"));
    }

    #[test]
    fn test_timestamp_must_be_separator_bounded() {
        // the timestamp appearing inside a text field does not count
        let checker = DuplicateChecker::from_content(
            "clip.ogg\t00:00:04,000\timg.jpg\tat 00:00:09,000 she left\n",
            "\t",
        );
        assert!(!checker.contains("00:00:09,000"));
    }

    #[test]
    fn test_from_file_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.tsv");
        std::fs::write(&path, "a\t00:00:02,500\tb\n").unwrap();
        let checker = DuplicateChecker::from_file(&path, "\t").unwrap();
        assert!(checker.contains("00:00:02,500"));
        assert_eq!(checker.existing_rows(), 1);
    }
}
