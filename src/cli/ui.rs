// src/cli/ui.rs
//! Terminal UI: progress bars, prompts, and the candidate table.

use crate::core::pipeline::TaskHandler;
use crate::core::scanner::{CandidateSource, SubtitleCandidate};
use crate::core::worker::progress::ProgressSink;
use colored::Colorize;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tabled::{Table, Tabled};

/// Progress sink backed by an indicatif bar.
///
/// High-load mode lowers the draw rate so thousands of resumption skips do
/// not flood the terminal.
pub struct IndicatifProgress {
    bar: ProgressBar,
    high_load: AtomicBool,
}

impl IndicatifProgress {
    /// Create a hidden bar; it becomes visible once a total is set.
    pub fn new() -> Self {
        let bar = ProgressBar::hidden();
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:36.cyan/blue}] {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self {
            bar,
            high_load: AtomicBool::new(false),
        }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        if self.bar.is_hidden() {
            self.bar
                .set_draw_target(indicatif::ProgressDrawTarget::stderr());
        }
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_high_load(&self) {
        if !self.high_load.swap(true, Ordering::SeqCst) {
            self.bar
                .set_draw_target(indicatif::ProgressDrawTarget::stderr_with_hz(2));
        }
    }

    fn set_message(&self, message: &str) {
        if !self.high_load.load(Ordering::SeqCst) {
            self.bar.set_message(message.to_string());
        }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// CLI task handler: indicatif progress plus a synchronous confirmation
/// prompt. No tabular-output path override.
pub struct CliHandler {
    progress: Arc<IndicatifProgress>,
}

impl CliHandler {
    /// Create a handler with a fresh progress bar.
    pub fn new() -> Self {
        Self {
            progress: Arc::new(IndicatifProgress::new()),
        }
    }
}

impl Default for CliHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskHandler for CliHandler {
    fn progress(&self) -> Arc<dyn ProgressSink> {
        Arc::clone(&self.progress) as Arc<dyn ProgressSink>
    }

    fn output_file_path(&self) -> Option<PathBuf> {
        None
    }

    fn confirm_stt_replacement(&self, message: &str) -> bool {
        Confirm::new()
            .with_prompt(message)
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

#[derive(Tabled)]
struct CandidateRow {
    #[tabled(rename = "Language")]
    language: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Default")]
    default: String,
    #[tabled(rename = "Title")]
    title: String,
}

/// Print the discovered candidates as a table.
pub fn print_candidate_table(candidates: &[SubtitleCandidate]) {
    if candidates.is_empty() {
        print_warning("no subtitle candidates found");
        return;
    }
    let rows: Vec<CandidateRow> = candidates
        .iter()
        .map(|c| CandidateRow {
            language: c
                .language
                .as_ref()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "?".to_string()),
            kind: format!("{:?}", c.kind),
            source: match &c.source {
                CandidateSource::Standalone(path) => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                CandidateSource::Embedded { track_index, .. } => {
                    format!("embedded #{}", track_index)
                }
            },
            default: if c.is_default { "yes" } else { "" }.to_string(),
            title: c.title.clone().unwrap_or_default(),
        })
        .collect();
    println!("{}", Table::new(rows));
}

/// Print a success line.
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning line.
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an error line.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_counts() {
        let progress = IndicatifProgress::new();
        progress.set_total(10);
        progress.inc(3);
        assert_eq!(progress.bar.position(), 3);
        progress.set_high_load();
        progress.inc(1);
        assert_eq!(progress.bar.position(), 4);
        progress.finish();
    }

    #[test]
    fn test_candidate_table_handles_empty() {
        print_candidate_table(&[]);
    }
}
