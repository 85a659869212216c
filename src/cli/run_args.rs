//! Shared per-mode task options.

use crate::Result;
use crate::config::{Config as AppConfig, RetentionPolicy};
use crate::core::language::Language;
use crate::core::pipeline::task::{TaskConfig, TaskMode};
use crate::error::SubLingoError;
use crate::services::translit::TranslitKinds;
use clap::Args;
use std::path::PathBuf;

/// Options shared by every processing subcommand.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Media file (or root directory in bulk mode)
    pub path: PathBuf,

    /// Target (learning) language, e.g. "ja" or "jpn"
    #[arg(short = 't', long = "target-lang")]
    pub target_lang: Option<String>,

    /// Native (reference) language, e.g. "en"
    #[arg(short = 'n', long = "native-lang")]
    pub native_lang: Option<String>,

    /// Explicit target subtitle file, bypassing auto-discovery
    #[arg(long = "target-sub")]
    pub target_sub: Option<PathBuf>,

    /// Explicit native subtitle file
    #[arg(long = "native-sub")]
    pub native_sub: Option<PathBuf>,

    /// Audio track index override
    #[arg(long = "audio-track")]
    pub audio_track: Option<usize>,

    /// Worker count (default: CPU count - 1)
    #[arg(short = 'w', long = "workers")]
    pub workers: Option<usize>,

    /// Field separator for the tabular output ("\t" gives .tsv)
    #[arg(long = "sep")]
    pub separator: Option<String>,

    /// Timing offset in milliseconds applied to extraction
    #[arg(long = "offset", default_value_t = 0)]
    pub offset_ms: i64,

    /// Assemble a merged container from the produced artifacts
    #[arg(long = "merge")]
    pub merge: bool,

    /// Produce a tokenized rendering
    #[arg(long = "tokenized")]
    pub tokenized: bool,

    /// Produce a romanized rendering
    #[arg(long = "romanized")]
    pub romanized: bool,

    /// Produce a selective rendering (rare kanji only)
    #[arg(long = "selective")]
    pub selective: bool,

    /// Produce a tokenized selective rendering
    #[arg(long = "selective-tokenized")]
    pub selective_tokenized: bool,

    /// Also produce the condensed audio compilation
    #[arg(long = "condensed-audio")]
    pub condensed_audio: bool,

    /// Also produce the enhanced voice track
    #[arg(long = "enhanced-track")]
    pub enhanced_track: bool,

    /// Skip dubtitle derivation in dubs mode
    #[arg(long = "no-dubtitles")]
    pub no_dubtitles: bool,

    /// Intermediary retention: keep, delete-after-merge, delete-resumption-only
    #[arg(long = "retention")]
    pub retention: Option<String>,

    /// Delete the resumption (tabular) file on completion
    #[arg(long = "delete-resumption")]
    pub delete_resumption: bool,
}

impl RunArgs {
    fn parse_languages(&self) -> Result<(Option<Language>, Option<Language>)> {
        let target = match &self.target_lang {
            Some(raw) => Some(Language::parse(raw).ok_or_else(|| {
                SubLingoError::validation(format!("unrecognized target language: {}", raw))
            })?),
            None => None,
        };
        let native = match &self.native_lang {
            Some(raw) => Some(Language::parse(raw).ok_or_else(|| {
                SubLingoError::validation(format!("unrecognized native language: {}", raw))
            })?),
            None => None,
        };
        Ok((target, native))
    }

    fn parse_retention(&self) -> Result<RetentionPolicy> {
        match self.retention.as_deref() {
            None | Some("keep") => Ok(RetentionPolicy::Keep),
            Some("delete-after-merge") => Ok(RetentionPolicy::DeleteAfterMerge),
            Some("delete-resumption-only") => Ok(RetentionPolicy::DeleteResumptionOnly),
            Some(other) => Err(SubLingoError::validation(format!(
                "unknown retention policy: {}",
                other
            ))),
        }
    }

    fn fill_common(
        &self,
        config: &mut TaskConfig,
        app: &AppConfig,
        profile: bool,
    ) -> Result<()> {
        let (target, native) = self.parse_languages()?;
        config.target_language = target;
        config.native_language = native;
        config.target_subtitle = self.target_sub.clone();
        config.native_subtitle = self.native_sub.clone();
        config.audio_track_override = self.audio_track;
        config.max_workers = self.workers.unwrap_or(0);
        config.field_separator = self
            .separator
            .clone()
            .unwrap_or_else(|| app.general.field_separator.clone());
        config.timing_offset_ms = if self.offset_ms != 0 {
            self.offset_ms
        } else {
            app.general.timing_offset_ms
        };
        config.merge_outputs = self.merge;
        config.translit_kinds = TranslitKinds {
            tokenized: self.tokenized,
            romanized: self.romanized,
            selective: self.selective,
            selective_tokenized: self.selective_tokenized,
        };
        config.want_condensed_audio = config.want_condensed_audio || self.condensed_audio;
        config.want_enhanced_track = config.want_enhanced_track || self.enhanced_track;
        if self.no_dubtitles {
            config.want_dubtitles = false;
        }
        config.retention = if self.retention.is_some() {
            self.parse_retention()?
        } else {
            app.general.retention
        };
        config.delete_resumption_file = self.delete_resumption;
        config.profile = profile;
        Ok(())
    }

    /// Build the task configuration for a single-file run.
    pub fn to_task_config(
        &self,
        mode: TaskMode,
        app: &AppConfig,
        profile: bool,
    ) -> Result<TaskConfig> {
        let mut config = TaskConfig::new(mode, &self.path);
        self.fill_common(&mut config, app, profile)?;
        Ok(config)
    }

    /// Build the template configuration for a bulk run; the router fills in
    /// each media path.
    pub fn to_task_config_for_bulk(
        &self,
        mode: TaskMode,
        app: &AppConfig,
        profile: bool,
    ) -> Result<TaskConfig> {
        let mut config = TaskConfig::new(mode, PathBuf::new());
        self.fill_common(&mut config, app, profile)?;
        if config.target_language.is_none() {
            return Err(SubLingoError::validation(
                "bulk mode requires a target language",
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: RunArgs,
    }

    #[test]
    fn test_basic_card_invocation() {
        let harness =
            Harness::parse_from(["test", "movie.mp4", "-t", "ja", "-n", "en", "-w", "4"]);
        let config = harness
            .args
            .to_task_config(TaskMode::Subs2Cards, &AppConfig::default(), false)
            .unwrap();
        assert_eq!(config.mode, TaskMode::Subs2Cards);
        assert_eq!(config.target_language.unwrap().code(), "jpn");
        assert_eq!(config.native_language.unwrap().code(), "eng");
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.field_separator, "\t");
    }

    #[test]
    fn test_bad_language_rejected() {
        let harness = Harness::parse_from(["test", "movie.mp4", "-t", "nonsense"]);
        let result = harness
            .args
            .to_task_config(TaskMode::Subs2Cards, &AppConfig::default(), false);
        assert!(result.is_err());
    }

    #[test]
    fn test_translit_kind_flags() {
        let harness = Harness::parse_from([
            "test",
            "movie.mp4",
            "-t",
            "ja",
            "--romanized",
            "--selective",
        ]);
        let config = harness
            .args
            .to_task_config(TaskMode::Translit, &AppConfig::default(), false)
            .unwrap();
        assert!(config.translit_kinds.romanized);
        assert!(config.translit_kinds.selective);
        assert!(!config.translit_kinds.tokenized);
    }

    #[test]
    fn test_dubs_default_wants_dubtitles() {
        let harness = Harness::parse_from(["test", "movie.mp4", "-t", "ja"]);
        let config = harness
            .args
            .to_task_config(TaskMode::Subs2Dubs, &AppConfig::default(), false)
            .unwrap();
        assert!(config.want_dubtitles);

        let harness = Harness::parse_from(["test", "movie.mp4", "-t", "ja", "--no-dubtitles"]);
        let config = harness
            .args
            .to_task_config(TaskMode::Subs2Dubs, &AppConfig::default(), false)
            .unwrap();
        assert!(!config.want_dubtitles);
    }

    #[test]
    fn test_retention_parsing() {
        let harness = Harness::parse_from([
            "test",
            "movie.mp4",
            "-t",
            "ja",
            "--retention",
            "delete-after-merge",
        ]);
        let config = harness
            .args
            .to_task_config(TaskMode::Subs2Cards, &AppConfig::default(), false)
            .unwrap();
        assert_eq!(config.retention, RetentionPolicy::DeleteAfterMerge);

        let harness =
            Harness::parse_from(["test", "movie.mp4", "-t", "ja", "--retention", "bogus"]);
        assert!(
            harness
                .args
                .to_task_config(TaskMode::Subs2Cards, &AppConfig::default(), false)
                .is_err()
        );
    }

    #[test]
    fn test_bulk_requires_target_language() {
        let harness = Harness::parse_from(["test", "/media"]);
        assert!(
            harness
                .args
                .to_task_config_for_bulk(TaskMode::Subs2Cards, &AppConfig::default(), false)
                .is_err()
        );
    }
}
