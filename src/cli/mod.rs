//! Command-line interface for the sublingo processing engine.
//!
//! The CLI constructs a configured task per invocation and hands it to the
//! engine; it owns the progress bars, the confirmation prompt, and the
//! Ctrl-C handler, nothing more.
//!
//! # Subcommands
//!
//! - `cards` - per-cue flashcard table with audio and image snippets
//! - `dubs` - cards plus STT-derived dubtitles
//! - `enhance` - voice-isolated audio track
//! - `translit` - transliterated subtitle renderings
//! - `condense` - condensed audio compilation
//! - `bulk` - run one of the above over a directory tree
//! - `scan` - list discovered subtitle candidates
//! - `config` - print the resolved configuration
//!
//! # Examples
//!
//! ```bash
//! sublingo cards movie.mp4 -t ja -n en
//! sublingo dubs movie.mp4 -t ja --workers 4
//! sublingo enhance movie.mp4
//! sublingo bulk cards /media/shows -t ja -n en
//! ```

mod run_args;
pub mod ui;

use crate::config::{
    Config as AppConfig, ConfigService, ENV_PROFILE, EnvironmentProvider,
    ProductionConfigService, SystemEnvironmentProvider,
};
use crate::core::media::{FfmpegDriver, MediaProbe};
use crate::core::pipeline::bulk::BulkRouter;
use crate::core::pipeline::task::{Task, TaskMode};
use crate::core::pipeline::{NoopTelemetry, TaskHandler};
use crate::core::scanner::CandidateScanner;
use crate::error::SubLingoError;
use crate::services::factory::ProviderFactory;
use crate::{Result, VERSION};
use clap::{Parser, Subcommand};
use colored::Colorize;
pub use run_args::RunArgs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
pub use ui::{CliHandler, print_error, print_success, print_warning};

/// Main CLI application structure defining the top-level interface.
#[derive(Parser, Debug)]
#[command(name = "sublingo")]
#[command(about = "Turn foreign-language videos into language-learning material")]
#[command(version = VERSION)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a flashcard table with per-cue audio clips and images
    Cards(RunArgs),

    /// Build cards and derive dubtitles from the dub track via STT
    Dubs(RunArgs),

    /// Produce a voice-isolated enhanced audio track
    Enhance(RunArgs),

    /// Produce transliterated/tokenized subtitle renderings
    Translit(RunArgs),

    /// Produce a condensed audio compilation
    Condense(RunArgs),

    /// Run a mode over every container under a directory
    Bulk {
        /// The mode to run per file
        #[arg(value_parser = parse_mode)]
        mode: TaskMode,
        /// Shared task options; the path argument is the root directory
        #[command(flatten)]
        args: RunArgs,
    },

    /// List discovered subtitle candidates for a media file
    Scan {
        /// The media file to scan
        path: PathBuf,
    },

    /// Print the resolved configuration
    Config,
}

fn parse_mode(value: &str) -> std::result::Result<TaskMode, String> {
    match value {
        "cards" => Ok(TaskMode::Subs2Cards),
        "dubs" => Ok(TaskMode::Subs2Dubs),
        "enhance" => Ok(TaskMode::Enhance),
        "translit" => Ok(TaskMode::Translit),
        "condense" => Ok(TaskMode::Condense),
        other => Err(format!("unknown mode: {}", other)),
    }
}

/// Execute the CLI application with parsed arguments.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let env = SystemEnvironmentProvider::new();
    let config_service = ProductionConfigService::new()?;
    let app_config = config_service.get_config()?;
    let factory = Arc::new(ProviderFactory::new(app_config.clone(), &env));
    let profile = env.flag(ENV_PROFILE);

    // Ctrl-C trips the task-scoped token; the engine unwinds cleanly.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ui::print_warning("interrupt received, finishing up...");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Cards(args) => {
            run_single(TaskMode::Subs2Cards, args, app_config, factory, profile, &cancel).await
        }
        Commands::Dubs(args) => {
            run_single(TaskMode::Subs2Dubs, args, app_config, factory, profile, &cancel).await
        }
        Commands::Enhance(args) => {
            run_single(TaskMode::Enhance, args, app_config, factory, profile, &cancel).await
        }
        Commands::Translit(args) => {
            run_single(TaskMode::Translit, args, app_config, factory, profile, &cancel).await
        }
        Commands::Condense(args) => {
            run_single(TaskMode::Condense, args, app_config, factory, profile, &cancel).await
        }
        Commands::Bulk { mode, args } => {
            run_bulk(mode, args, app_config, factory, profile, &cancel).await
        }
        Commands::Scan { path } => run_scan(&path, &app_config, &cancel).await,
        Commands::Config => {
            let toml_str = toml::to_string_pretty(&app_config)
                .map_err(|e| SubLingoError::config(e.to_string()))?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

async fn run_single(
    mode: TaskMode,
    args: RunArgs,
    app_config: AppConfig,
    factory: Arc<ProviderFactory>,
    profile: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let config = args.to_task_config(mode, &app_config, profile)?;
    let handler: Arc<dyn TaskHandler> = Arc::new(CliHandler::new());
    let mut task = Task::new(
        config,
        app_config,
        handler,
        Arc::new(NoopTelemetry),
        factory,
    );
    let report = task.execute(cancel).await?;

    ui::print_success(&format!(
        "{} written, {} skipped",
        report.written, report.skipped
    ));
    for record in &report.outputs {
        println!("  {} {}", "→".dimmed(), record.path.display());
    }
    if let Some(merge) = &report.merge {
        if let Some(path) = &merge.path {
            println!("  {} {}", "merged:".cyan(), path.display());
        }
    }
    Ok(())
}

async fn run_bulk(
    mode: TaskMode,
    args: RunArgs,
    app_config: AppConfig,
    factory: Arc<ProviderFactory>,
    profile: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let root = args.path.clone();
    if !root.is_dir() {
        return Err(SubLingoError::validation(format!(
            "bulk mode expects a directory: {}",
            root.display()
        )));
    }
    let template = args.to_task_config_for_bulk(mode, &app_config, profile)?;
    let handler: Arc<dyn TaskHandler> = Arc::new(CliHandler::new());
    let router = BulkRouter::new(app_config, handler, Arc::new(NoopTelemetry), factory);
    let report = router.run(&root, &template, cancel).await?;

    ui::print_success(&format!(
        "bulk run: {} succeeded, {} failed, {} rejected",
        report.succeeded, report.failed, report.rejected
    ));
    Ok(())
}

async fn run_scan(path: &PathBuf, app_config: &AppConfig, cancel: &CancellationToken) -> Result<()> {
    let probe = MediaProbe::new(app_config.binaries.probe.clone());
    let info = probe.probe(path, cancel).await?;
    let scanner = CandidateScanner::new(FfmpegDriver::new(app_config.binaries.transmuxer.clone()));
    let candidates = scanner.scan(path, &info)?;
    ui::print_candidate_table(&candidates);
    Ok(())
}
