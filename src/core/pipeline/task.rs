//! Per-file task executor.
//!
//! One [`Task`] routes one video through a mode-dependent sequence of
//! stages: validation, subtitle setup, media probing and audio selection,
//! output directory preparation, preprocessing, the worker pool (or the
//! mode's own main stage), dubtitle derivation, transliteration, audio
//! enhancement, condensed audio, merging, and cleanup. Stage helpers return
//! early with `?`; a snapshot of the phase name goes to the telemetry sink
//! at every boundary.

use crate::Result;
use crate::config::{Config as AppConfig, RetentionPolicy};
use crate::core::language::Language;
use crate::core::media::ffmpeg::{
    self, FfmpegDriver, audio_clip_args, concat_args, cue_wav_args, enhance_mix_args,
    full_audio_args, still_image_args,
};
use crate::core::media::probe::{MediaInfo, MediaProbe};
use crate::core::media::selection::select_audio_track;
use crate::core::pipeline::intermediary::IntermediaryManager;
use crate::core::pipeline::outputs::{
    MergeResult, Merger, OutputKind, OutputRecord, OutputRegistry,
};
use crate::core::pipeline::{TaskHandler, TelemetrySink};
use crate::core::scanner::{CandidateScanner, CandidateSource, SubtitleCandidate};
use crate::core::subtitle::preprocess::{filter_default_style, strip_cc_annotations};
use crate::core::subtitle::{Cue, SubtitleDocument, format_timestamp};
use crate::core::worker::dedup::DuplicateChecker;
use crate::core::worker::eta::{EtaProvider, SimpleEta, StatisticalEta};
use crate::core::worker::item::{ProcessedItem, RowWriter, TabularRowWriter};
use crate::core::worker::pool::{CueProcessor, TaskCounters, WorkerPool};
use crate::error::SubLingoError;
use crate::services::factory::ProviderFactory;
use crate::services::stt::dubtitles::{derive_dubtitles, dubtitle_file_name};
use crate::services::translit::{TranslitKinds, transliterate_chunked};
use async_trait::async_trait;
use log::{debug, warn};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Processing mode of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMode {
    /// Flashcard table with per-cue audio and images.
    Subs2Cards,
    /// Cards plus STT dubtitles from the dub track.
    Subs2Dubs,
    /// Voice-isolated audio track only.
    Enhance,
    /// Transliterated subtitle renderings.
    Translit,
    /// Condensed audio compilation.
    Condense,
}

impl TaskMode {
    /// Mode name for logging and telemetry.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskMode::Subs2Cards => "cards",
            TaskMode::Subs2Dubs => "dubs",
            TaskMode::Enhance => "enhance",
            TaskMode::Translit => "translit",
            TaskMode::Condense => "condense",
        }
    }

    fn needs_subtitles(&self) -> bool {
        !matches!(self, TaskMode::Enhance)
    }

    fn prepares_output_dir(&self) -> bool {
        matches!(
            self,
            TaskMode::Subs2Cards | TaskMode::Subs2Dubs | TaskMode::Condense
        )
    }

    fn produces_tabular(&self) -> bool {
        matches!(self, TaskMode::Subs2Cards | TaskMode::Subs2Dubs)
    }
}

/// Everything needed to run one task.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// Processing mode.
    pub mode: TaskMode,
    /// Source media container.
    pub media_path: PathBuf,
    /// Target (learning) language.
    pub target_language: Option<Language>,
    /// Native (reference) language.
    pub native_language: Option<Language>,
    /// Explicit target subtitle path, bypassing the scanner.
    pub target_subtitle: Option<PathBuf>,
    /// Explicit native subtitle path.
    pub native_subtitle: Option<PathBuf>,
    /// Audio track override (index among audio tracks).
    pub audio_track_override: Option<usize>,
    /// Requested transliteration renderings.
    pub translit_kinds: TranslitKinds,
    /// Derive dubtitles after the pool run (dubs mode).
    pub want_dubtitles: bool,
    /// Produce the condensed audio compilation.
    pub want_condensed_audio: bool,
    /// Produce the enhanced voice track.
    pub want_enhanced_track: bool,
    /// Assemble a merged container from the registry.
    pub merge_outputs: bool,
    /// Timing offset in milliseconds applied to extraction.
    pub timing_offset_ms: i64,
    /// Worker count; zero means the configured default.
    pub max_workers: usize,
    /// Intermediary retention policy.
    pub retention: RetentionPolicy,
    /// Delete the resumption file on completion.
    pub delete_resumption_file: bool,
    /// Tabular field separator.
    pub field_separator: String,
    /// Emit the deterministic transliteration performance summary.
    pub profile: bool,
}

impl TaskConfig {
    /// Create a config with defaults for everything but mode and media.
    pub fn new(mode: TaskMode, media_path: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            media_path: media_path.into(),
            target_language: None,
            native_language: None,
            target_subtitle: None,
            native_subtitle: None,
            audio_track_override: None,
            translit_kinds: TranslitKinds::default(),
            want_dubtitles: mode == TaskMode::Subs2Dubs,
            want_condensed_audio: mode == TaskMode::Condense,
            want_enhanced_track: mode == TaskMode::Enhance,
            merge_outputs: false,
            timing_offset_ms: 0,
            max_workers: 0,
            retention: RetentionPolicy::Keep,
            delete_resumption_file: false,
            field_separator: "\t".to_string(),
            profile: false,
        }
    }
}

/// Summary of one finished task.
#[derive(Debug)]
pub struct TaskReport {
    /// Rows written by the pool this run.
    pub written: usize,
    /// Cues skipped through resumption.
    pub skipped: usize,
    /// All registered output records.
    pub outputs: Vec<OutputRecord>,
    /// Merge result when the merge stage ran.
    pub merge: Option<MergeResult>,
}

/// Per-file task executor.
pub struct Task {
    config: TaskConfig,
    app: AppConfig,
    handler: Arc<dyn TaskHandler>,
    telemetry: Arc<dyn TelemetrySink>,
    factory: Arc<ProviderFactory>,
    counters: Arc<TaskCounters>,

    ffmpeg: FfmpegDriver,
    probe: MediaProbe,
    registry: OutputRegistry,

    media_info: Option<MediaInfo>,
    target_doc: Option<SubtitleDocument>,
    raw_doc: Option<SubtitleDocument>,
    native_doc: Option<SubtitleDocument>,
    target_subtitle_path: Option<PathBuf>,
    is_cc_or_dubs: bool,
    audio_track: usize,
    base: String,
    tabular_path: Option<PathBuf>,
    media_dir: Option<PathBuf>,
}

impl Task {
    /// Create a task. The handler and telemetry sink are owned by the
    /// hosting program; the factory owns the mock/real provider decision.
    pub fn new(
        config: TaskConfig,
        app: AppConfig,
        handler: Arc<dyn TaskHandler>,
        telemetry: Arc<dyn TelemetrySink>,
        factory: Arc<ProviderFactory>,
    ) -> Self {
        let ffmpeg = FfmpegDriver::new(app.binaries.transmuxer.clone());
        let probe = MediaProbe::new(app.binaries.probe.clone());
        Self {
            config,
            app,
            handler,
            telemetry,
            factory,
            counters: Arc::new(TaskCounters::default()),
            ffmpeg,
            probe,
            registry: OutputRegistry::new(),
            media_info: None,
            target_doc: None,
            raw_doc: None,
            native_doc: None,
            target_subtitle_path: None,
            is_cc_or_dubs: false,
            audio_track: 0,
            base: String::new(),
            tabular_path: None,
            media_dir: None,
        }
    }

    /// Counters injected into the pool (live total, processed).
    pub fn counters(&self) -> Arc<TaskCounters> {
        Arc::clone(&self.counters)
    }

    fn checkpoint(&self, phase: &str, cancel: &CancellationToken) -> Result<()> {
        self.telemetry.snapshot(phase, self.config.mode.as_str());
        if cancel.is_cancelled() {
            debug!("canceled by user");
            return Err(SubLingoError::Canceled);
        }
        Ok(())
    }

    /// Run the task through all phases.
    pub async fn execute(&mut self, cancel: &CancellationToken) -> Result<TaskReport> {
        self.checkpoint("validate", cancel)?;
        self.validate()?;

        self.checkpoint("intermediary-init", cancel)?;
        let mut intermediary = IntermediaryManager::new(
            self.config.retention,
            self.config.delete_resumption_file,
        );

        self.checkpoint("subtitle-setup", cancel)?;
        if self.config.mode.needs_subtitles() {
            self.setup_subtitles(&mut intermediary, cancel).await?;
        }

        self.checkpoint("register-originals", cancel)?;
        if self.config.merge_outputs {
            self.register_originals()?;
        }

        self.checkpoint("audio-selection", cancel)?;
        self.select_audio(cancel).await?;

        self.checkpoint("output-prep", cancel)?;
        if self.config.mode.prepares_output_dir() {
            self.prepare_output_dir(&mut intermediary)?;
        }

        self.checkpoint("preprocess", cancel)?;
        if self.config.mode.needs_subtitles() {
            self.preprocess_subtitles();
        }

        self.checkpoint("confirm", cancel)?;
        self.confirm_stt()?;

        self.checkpoint("main", cancel)?;
        let (written, skipped) = self.run_main(cancel).await?;

        self.checkpoint("dubtitles", cancel)?;
        if self.config.mode == TaskMode::Subs2Dubs && self.config.want_dubtitles {
            self.write_dubtitles(cancel).await?;
        }

        self.checkpoint("transliteration", cancel)?;
        if self.config.translit_kinds.any() && self.config.mode.needs_subtitles() {
            self.run_transliteration(cancel).await?;
        }

        self.checkpoint("enhancement", cancel)?;
        if self.config.mode == TaskMode::Enhance || self.config.want_enhanced_track {
            self.run_enhancement(&mut intermediary, cancel).await?;
        }

        self.checkpoint("condensed", cancel)?;
        if self.config.mode == TaskMode::Translit && self.config.want_condensed_audio {
            self.extract_condense_segments(cancel).await?;
        }
        if self.config.want_condensed_audio {
            self.assemble_condensed(&mut intermediary, cancel).await?;
        }

        self.checkpoint("merge", cancel)?;
        let merge = if self.config.merge_outputs && !self.registry.is_empty() {
            let merger = Merger::new(self.ffmpeg.clone());
            Some(
                merger
                    .merge(&self.config.media_path, &self.registry, cancel)
                    .await?,
            )
        } else {
            None
        };

        self.checkpoint("cleanup", cancel)?;
        let merge_ok = merge.as_ref().map(|m| m.ok && !m.skipped).unwrap_or(false);
        intermediary.finalize(merge_ok)?;

        Ok(TaskReport {
            written,
            skipped,
            outputs: self.registry.records().to_vec(),
            merge,
        })
    }

    // Phase 1: input validation.
    fn validate(&self) -> Result<()> {
        if !self.config.media_path.exists() {
            return Err(SubLingoError::validation(format!(
                "media file does not exist: {}",
                self.config.media_path.display()
            )));
        }
        let dir = self
            .config
            .media_path
            .parent()
            .unwrap_or_else(|| Path::new("."));
        if dir.to_string_lossy().contains('\'') {
            return Err(SubLingoError::validation(format!(
                "directory path contains an apostrophe, unsupported by concat lists: {}",
                dir.display()
            )));
        }
        if self.config.mode.needs_subtitles()
            && self.config.target_language.is_none()
            && self.config.target_subtitle.is_none()
        {
            return Err(SubLingoError::validation(
                "either a target language or an explicit target subtitle is required",
            ));
        }
        Ok(())
    }

    async fn probe_media(&mut self, cancel: &CancellationToken) -> Result<&MediaInfo> {
        if self.media_info.is_none() {
            let info = self.probe.probe(&self.config.media_path, cancel).await?;
            self.media_info = Some(info);
        }
        Ok(self.media_info.as_ref().unwrap())
    }

    // Phase 3: discover or accept subtitles, open documents, set the base
    // name and the single-file progress total.
    async fn setup_subtitles(
        &mut self,
        intermediary: &mut IntermediaryManager,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let media_stem = self
            .config
            .media_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (target_path, native_path) = match &self.config.target_subtitle {
            Some(path) => {
                // Explicit subtitles: guess language tags from filenames.
                if self.config.target_language.is_none() {
                    self.config.target_language = Language::guess_from_filename(path);
                }
                if self.config.native_language.is_none() {
                    if let Some(native) = &self.config.native_subtitle {
                        self.config.native_language = Language::guess_from_filename(native);
                    }
                }
                self.base = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (path.clone(), self.config.native_subtitle.clone())
            }
            None => {
                let target_lang = self.config.target_language.clone().ok_or_else(|| {
                    SubLingoError::validation("target language required for subtitle discovery")
                })?;
                self.probe_media(cancel).await?;
                let info = self.media_info.as_ref().unwrap();
                let scanner = CandidateScanner::new(self.ffmpeg.clone());
                let candidates = scanner.scan(&self.config.media_path, info)?;
                let selection = scanner.select(
                    &candidates,
                    &target_lang,
                    self.config.native_language.as_ref(),
                )?;
                self.is_cc_or_dubs = selection.is_cc_or_dubs;

                if self.config.mode == TaskMode::Subs2Cards && selection.native.is_none() {
                    warn!(
                        "no native-language subtitle found for {}; cards will lack translations",
                        self.config.media_path.display()
                    );
                }

                let mut target = selection.target;
                let scratch = std::env::temp_dir().join(format!("sublingo-{}", uuid::Uuid::new_v4()));
                let target_path = self
                    .materialize_candidate(&mut target, &media_stem, &scratch, intermediary, cancel)
                    .await?;
                self.base = match &target.source {
                    CandidateSource::Standalone(path) => path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    CandidateSource::Embedded { .. } => {
                        format!("{}.{}", media_stem, target_lang.short_tag())
                    }
                };

                let native_path = match selection.native {
                    Some(mut native) => Some(
                        self.materialize_candidate(
                            &mut native,
                            &media_stem,
                            &scratch,
                            intermediary,
                            cancel,
                        )
                        .await?,
                    ),
                    None => None,
                };
                (target_path, native_path)
            }
        };

        let target_doc = SubtitleDocument::open(&target_path)?;
        self.counters
            .total
            .store(target_doc.item_count(), Ordering::SeqCst);
        self.target_doc = Some(target_doc);
        self.target_subtitle_path = Some(target_path);

        if let Some(native_path) = native_path {
            match SubtitleDocument::open(&native_path) {
                Ok(doc) => self.native_doc = Some(doc),
                Err(e) => warn!("could not open native subtitle: {}", e),
            }
        }
        Ok(())
    }

    async fn materialize_candidate(
        &self,
        candidate: &mut SubtitleCandidate,
        media_stem: &str,
        scratch: &Path,
        intermediary: &mut IntermediaryManager,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let scanner = CandidateScanner::new(self.ffmpeg.clone());
        let path = scanner
            .materialize(candidate, media_stem, scratch, cancel)
            .await?;
        if matches!(candidate.source, CandidateSource::Embedded { .. }) {
            intermediary.track(&path);
        }
        Ok(path)
    }

    // Phase 4: originals go into the registry so the merge stage can carry
    // them over.
    fn register_originals(&mut self) -> Result<()> {
        if let Some(path) = self.target_subtitle_path.clone() {
            self.registry.register(OutputRecord {
                path,
                kind: OutputKind::Subtitle,
                language: self.config.target_language.clone(),
                feature: "original".to_string(),
                priority: 10,
            })?;
        }
        Ok(())
    }

    // Phase 5: probe, require audio, run the selector chain.
    async fn select_audio(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.probe_media(cancel).await?;
        let info = self.media_info.as_ref().unwrap();
        if info.audio_tracks.is_empty() {
            return Err(SubLingoError::NoAudioTrack(self.config.media_path.clone()));
        }
        self.audio_track = match self.config.audio_track_override {
            Some(index) if index < info.audio_tracks.len() => index,
            Some(index) => {
                return Err(SubLingoError::validation(format!(
                    "audio track override {} out of range ({} tracks)",
                    index,
                    info.audio_tracks.len()
                )));
            }
            None => select_audio_track(
                &info.audio_tracks,
                self.config.target_language.as_ref(),
            )
            .unwrap_or(0),
        };
        Ok(())
    }

    // Phase 6: tabular file and per-cue media directory.
    fn prepare_output_dir(&mut self, intermediary: &mut IntermediaryManager) -> Result<()> {
        let dir = self
            .config
            .media_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        if self.config.mode.produces_tabular() {
            let ext = if self.config.field_separator == "\t" {
                "tsv"
            } else {
                "csv"
            };
            let tabular = match self.handler.output_file_path() {
                Some(path) => path,
                None => dir.join(format!("{}.{}", self.base, ext)),
            };
            // append-write-create so resumption reads survive
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&tabular)?;
            intermediary.track_resumption(&tabular);
            self.tabular_path = Some(tabular);
        }

        let media_dir = dir.join(format!("{}.media", ffmpeg::ffmpeg_safe_base(&self.base)));
        std::fs::create_dir_all(&media_dir)?;
        intermediary.track_media_dir(&media_dir);
        self.media_dir = Some(media_dir);
        Ok(())
    }

    // Phase 7: CC stripping, raw deep copy, default-style filtering.
    fn preprocess_subtitles(&mut self) {
        let Some(doc) = self.target_doc.as_mut() else {
            return;
        };
        if self.is_cc_or_dubs {
            strip_cc_annotations(doc);
        }
        // transliteration must see every cue, styles included
        self.raw_doc = Some(doc.deep_copy());
        if doc.format.supports_styles() {
            let removed = filter_default_style(doc);
            if removed > 0 {
                let total = doc.item_count();
                self.counters.total.store(total, Ordering::SeqCst);
                debug!("style filter removed {} cues, total now {}", removed, total);
            }
        }
    }

    // Phase 8: CLI confirmation before STT replaces existing CC/dubtitles.
    fn confirm_stt(&self) -> Result<()> {
        let stt_requested = self.config.mode == TaskMode::Subs2Dubs || self.config.want_dubtitles;
        if stt_requested && self.is_cc_or_dubs {
            let message = "the selected subtitle already carries CC/dubtitle content; \
                           run speech-to-text anyway?";
            if !self.handler.confirm_stt_replacement(message) {
                return Err(SubLingoError::Canceled);
            }
        }
        Ok(())
    }

    fn worker_count(&self) -> usize {
        if self.config.max_workers > 0 {
            self.config.max_workers
        } else {
            self.app.workers.effective_workers()
        }
    }

    fn make_eta(total: usize) -> Box<dyn EtaProvider> {
        // tiny jobs gain nothing from rate statistics
        if total < 30 {
            Box::new(SimpleEta::new())
        } else {
            Box::new(StatisticalEta::new())
        }
    }

    // Phase 9: the mode's main stage.
    async fn run_main(&mut self, cancel: &CancellationToken) -> Result<(usize, usize)> {
        match self.config.mode {
            TaskMode::Subs2Cards | TaskMode::Subs2Dubs => self.run_pool_cards(cancel).await,
            TaskMode::Condense => self.run_pool_condense(cancel).await,
            TaskMode::Enhance | TaskMode::Translit => Ok((0, 0)),
        }
    }

    async fn run_pool_cards(&mut self, cancel: &CancellationToken) -> Result<(usize, usize)> {
        let doc = self
            .target_doc
            .as_ref()
            .ok_or_else(|| SubLingoError::worker_pool("no target document"))?;
        let cues = doc.cues.clone();
        let media_dir = self
            .media_dir
            .clone()
            .ok_or_else(|| SubLingoError::worker_pool("no media directory"))?;
        let tabular = self
            .tabular_path
            .clone()
            .ok_or_else(|| SubLingoError::worker_pool("no tabular output path"))?;

        let dedup = DuplicateChecker::from_file(&tabular, &self.config.field_separator)?;
        if dedup.existing_rows() > 0 {
            debug!("resumption: {} existing rows", dedup.existing_rows());
        }
        let file = std::fs::OpenOptions::new().append(true).open(&tabular)?;
        let writer: Box<dyn RowWriter> = Box::new(TabularRowWriter::new(
            BufWriter::new(file),
            self.config.field_separator.clone(),
        ));

        let native_texts = align_native_texts(doc, self.native_doc.as_ref());
        let processor = Arc::new(MediaCueProcessor {
            ffmpeg: self.ffmpeg.clone(),
            media_path: self.config.media_path.clone(),
            audio_track: self.audio_track,
            media_dir,
            base: ffmpeg::ffmpeg_safe_base(&self.base),
            offset_ms: self.config.timing_offset_ms,
            foreign: doc.cues.iter().map(|c| c.lines.join(" ")).collect(),
            native: native_texts,
        });

        let pool = WorkerPool::new(self.worker_count(), self.handler.progress());
        let outcome = pool
            .run(
                cues,
                processor,
                Some(dedup),
                Some(writer),
                Self::make_eta(self.counters.total.load(Ordering::SeqCst)),
                self.counters(),
                cancel,
            )
            .await?;
        Ok((outcome.written, outcome.skipped))
    }

    async fn run_pool_condense(&mut self, cancel: &CancellationToken) -> Result<(usize, usize)> {
        let doc = self
            .target_doc
            .as_ref()
            .ok_or_else(|| SubLingoError::worker_pool("no target document"))?;
        let cues = doc.cues.clone();
        let media_dir = self
            .media_dir
            .clone()
            .ok_or_else(|| SubLingoError::worker_pool("no media directory"))?;

        let processor = Arc::new(CondenseCueProcessor {
            ffmpeg: self.ffmpeg.clone(),
            media_path: self.config.media_path.clone(),
            audio_track: self.audio_track,
            media_dir,
            base: ffmpeg::ffmpeg_safe_base(&self.base),
            offset_ms: self.config.timing_offset_ms,
        });

        let pool = WorkerPool::new(self.worker_count(), self.handler.progress());
        // the fingerprint check is bypassed in condense mode
        let outcome = pool
            .run(
                cues,
                processor,
                None,
                None,
                Self::make_eta(self.counters.total.load(Ordering::SeqCst)),
                self.counters(),
                cancel,
            )
            .await?;
        Ok((outcome.written, outcome.skipped))
    }

    // Phase 10: dubtitles from the tabular file's clips.
    async fn write_dubtitles(&mut self, cancel: &CancellationToken) -> Result<()> {
        let Some(tabular) = self.tabular_path.clone() else {
            return Ok(());
        };
        let Some(doc) = self.target_doc.as_ref() else {
            return Ok(());
        };
        let Some(media_dir) = self.media_dir.clone() else {
            return Ok(());
        };
        let Some(subtitle_path) = self.target_subtitle_path.clone() else {
            return Ok(());
        };

        let rows = read_tabular_rows(&tabular, &self.config.field_separator)?;
        let mut clips: Vec<(usize, PathBuf)> = Vec::new();
        for (clip_name, timestamp) in rows {
            let Some(index) = doc
                .cues
                .iter()
                .position(|c| format_timestamp(c.start) == timestamp)
            else {
                continue;
            };
            let clip = media_dir.join(clip_name);
            if clip.exists() {
                clips.push((index, clip));
            }
        }

        let stt = self.factory.create_stt()?;
        let dubtitles = derive_dubtitles(
            doc,
            &clips,
            stt.as_ref(),
            self.config.target_language.as_ref(),
            self.app.stt.initial_prompt.as_deref(),
            cancel,
        )
        .await?;

        let out = dubtitle_file_name(&subtitle_path, stt.model_name());
        dubtitles.write(&out)?;
        self.registry.register(OutputRecord {
            path: out,
            kind: OutputKind::Dubtitle,
            language: self.config.target_language.clone(),
            feature: stt.model_name().to_string(),
            priority: 50,
        })?;
        Ok(())
    }

    // Phase 11: transliteration over the raw document.
    async fn run_transliteration(&mut self, cancel: &CancellationToken) -> Result<()> {
        let Some(raw) = self.raw_doc.clone() else {
            return Ok(());
        };
        let Some(subtitle_path) = self.target_subtitle_path.clone() else {
            return Ok(());
        };
        let target = self
            .config
            .target_language
            .clone()
            .ok_or_else(|| SubLingoError::validation("transliteration requires a target language"))?;

        let provider = self.factory.create_transliterator(&target)?;
        let mut kinds = self.config.translit_kinds;
        if kinds.wants_selective() && !provider.supports_selective() {
            warn!(
                "provider '{}' does not support selective transliteration; dropping those renderings",
                provider.name()
            );
            kinds.selective = false;
            kinds.selective_tokenized = false;
        }
        if !kinds.any() {
            return Ok(());
        }

        // one line per cue so renderings map back positionally
        let text = raw
            .cues
            .iter()
            .map(|c| c.lines.join(" "))
            .collect::<Vec<_>>()
            .join("\n");
        let output = transliterate_chunked(
            provider.as_ref(),
            &text,
            kinds,
            self.app.translit.chunk_chars,
            cancel,
            self.handler.progress().as_ref(),
        )
        .await?;

        let renderings: [(&str, OutputKind, Option<String>); 4] = [
            ("tokenized", OutputKind::Tokenized, output.tokenized),
            ("romanized", OutputKind::Romanized, output.romanized),
            ("selective", OutputKind::Romanized, output.selective),
            (
                "selective-tokenized",
                OutputKind::Tokenized,
                output.selective_tokenized,
            ),
        ];
        for (suffix, kind, rendering) in renderings {
            let Some(rendering) = rendering else { continue };
            let lines: Vec<&str> = rendering.split('\n').collect();
            if lines.len() != raw.cues.len() {
                return Err(SubLingoError::provider(
                    provider.name(),
                    format!(
                        "rendering line count {} does not match cue count {}",
                        lines.len(),
                        raw.cues.len()
                    ),
                ));
            }
            let mut doc = raw.deep_copy();
            for (cue, line) in doc.cues.iter_mut().zip(&lines) {
                cue.lines = vec![line.to_string()];
            }
            let out = translit_file_name(&subtitle_path, suffix);
            doc.write(&out)?;
            self.registry.register(OutputRecord {
                path: out,
                kind,
                language: Some(target.clone()),
                feature: suffix.to_string(),
                priority: 20,
            })?;
        }

        if self.config.profile {
            self.write_translit_profile(&subtitle_path, &text, kinds)?;
        }
        Ok(())
    }

    // Deterministic summary: counts only, no timings.
    fn write_translit_profile(
        &self,
        subtitle_path: &Path,
        text: &str,
        kinds: TranslitKinds,
    ) -> Result<()> {
        let chunks = crate::services::translit::chunk_lines(text, self.app.translit.chunk_chars);
        let stem = subtitle_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let out = subtitle_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!("{}.translit-profile.txt", stem));
        let summary = format!(
            "cues: {}\nchars: {}\nchunks: {}\nkinds: tokenized={} romanized={} selective={} selective_tokenized={}\n",
            text.lines().count(),
            text.len(),
            chunks.len(),
            kinds.tokenized,
            kinds.romanized,
            kinds.selective,
            kinds.selective_tokenized,
        );
        std::fs::write(out, summary)?;
        Ok(())
    }

    // Phase 12: voice isolation and the enhanced mix.
    async fn run_enhancement(
        &mut self,
        intermediary: &mut IntermediaryManager,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let separator = self.factory.create_separator()?;
        let media_stem = self
            .config
            .media_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = self
            .config
            .media_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        let scratch = std::env::temp_dir().join(format!("sublingo-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&scratch)?;

        // lossy-safe upload copy of the chosen track
        let upload = scratch.join(format!("{}.flac", media_stem));
        let args = full_audio_args(&self.config.media_path, self.audio_track, &upload);
        self.ffmpeg.run(&args, cancel).await?;
        intermediary.track(&upload);

        let vocals_bytes = separator.separate(&upload, cancel).await?;
        let vocals = scratch.join(format!("{}.vocals.wav", media_stem));
        std::fs::write(&vocals, &vocals_bytes)?;
        intermediary.track(&vocals);

        let lang_code = self
            .config
            .target_language
            .as_ref()
            .map(|l| l.short_tag().to_string())
            .or_else(|| {
                self.media_info.as_ref().and_then(|info| {
                    info.audio_tracks
                        .get(self.audio_track)
                        .and_then(|t| t.language.as_ref())
                        .map(|l| l.short_tag().to_string())
                })
            })
            .unwrap_or_else(|| "und".to_string());
        let out = dir.join(format!("{}.{}.ENHANCED.ogg", media_stem, lang_code));

        let args = enhance_mix_args(
            &self.config.media_path,
            self.audio_track,
            &vocals,
            self.app.separation.voice_gain_db,
            self.app.separation.original_gain_db,
            &out,
        );
        self.ffmpeg.run(&args, cancel).await?;

        self.registry.register(OutputRecord {
            path: out,
            kind: OutputKind::EnhancedAudio,
            language: Language::parse(&lang_code),
            feature: separator.name().to_string(),
            priority: 100,
        })?;
        Ok(())
    }

    // Phase 13 (translit tail): ad-hoc WAV extraction outside the pool.
    async fn extract_condense_segments(&mut self, cancel: &CancellationToken) -> Result<()> {
        let Some(doc) = self.target_doc.as_ref() else {
            return Ok(());
        };
        let dir = self
            .config
            .media_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let media_dir = match &self.media_dir {
            Some(dir) => dir.clone(),
            None => {
                let media_dir =
                    dir.join(format!("{}.media", ffmpeg::ffmpeg_safe_base(&self.base)));
                std::fs::create_dir_all(&media_dir)?;
                self.media_dir = Some(media_dir.clone());
                media_dir
            }
        };

        let base = ffmpeg::ffmpeg_safe_base(&self.base);
        for (index, cue) in doc.cues.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(SubLingoError::Canceled);
            }
            let out = media_dir.join(format!("{}_{:04}.wav", base, index + 1));
            let args = cue_wav_args(
                &self.config.media_path,
                self.audio_track,
                cue.start,
                cue.end,
                self.config.timing_offset_ms,
                &out,
            );
            self.ffmpeg.run(&args, cancel).await?;
        }
        Ok(())
    }

    // Phase 13: concat the per-cue WAV segments into the condensed track.
    async fn assemble_condensed(
        &mut self,
        intermediary: &mut IntermediaryManager,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let Some(media_dir) = self.media_dir.clone() else {
            return Ok(());
        };
        let mut segments: Vec<PathBuf> = std::fs::read_dir(&media_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("wav"))
            .collect();
        segments.sort();
        segments.retain(|segment| {
            if is_valid_wav(segment) {
                true
            } else {
                warn!("dropping unreadable WAV segment {}", segment.display());
                false
            }
        });
        if segments.is_empty() {
            warn!("no WAV segments to condense in {}", media_dir.display());
            return Ok(());
        }

        let list = media_dir.join("concat.txt");
        self.ffmpeg.write_concat_list(&segments, &list)?;
        intermediary.track(&list);
        for segment in &segments {
            intermediary.track(segment);
        }

        let dir = self
            .config
            .media_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let out = dir.join(format!("{}.CONDENSED.ogg", self.base));
        let args = concat_args(&list, &out);
        self.ffmpeg.run(&args, cancel).await?;

        self.registry.register(OutputRecord {
            path: out,
            kind: OutputKind::CondensedAudio,
            language: self.config.target_language.clone(),
            feature: "condensed".to_string(),
            priority: 30,
        })?;
        Ok(())
    }
}

/// Per-cue processor for cards/dubs: audio clip plus still image.
struct MediaCueProcessor {
    ffmpeg: FfmpegDriver,
    media_path: PathBuf,
    audio_track: usize,
    media_dir: PathBuf,
    base: String,
    offset_ms: i64,
    foreign: Vec<String>,
    native: Vec<String>,
}

#[async_trait]
impl CueProcessor for MediaCueProcessor {
    async fn process(
        &self,
        index: usize,
        cue: &Cue,
        cancel: &CancellationToken,
    ) -> Result<ProcessedItem> {
        let clip = self
            .media_dir
            .join(format!("{}_{:04}.ogg", self.base, index + 1));
        let image = self
            .media_dir
            .join(format!("{}_{:04}.jpg", self.base, index + 1));

        let already_done = clip.exists() && image.exists();
        if !already_done {
            let args = audio_clip_args(
                &self.media_path,
                self.audio_track,
                cue.start,
                cue.end,
                self.offset_ms,
                &clip,
            );
            self.ffmpeg.run(&args, cancel).await?;

            let midpoint = cue.start
                + cue
                    .end
                    .checked_sub(cue.start)
                    .unwrap_or(Duration::ZERO)
                    / 2;
            let args = still_image_args(&self.media_path, midpoint, &image);
            self.ffmpeg.run(&args, cancel).await?;
        }

        let text_at = |texts: &[String], i: isize| -> String {
            if i < 0 {
                return String::new();
            }
            texts.get(i as usize).cloned().unwrap_or_default()
        };
        let i = index as isize;
        Ok(ProcessedItem {
            index,
            start_time: format_timestamp(cue.start),
            audio_path: Some(clip),
            image_path: Some(image),
            foreign_current: text_at(&self.foreign, i),
            native_current: text_at(&self.native, i),
            foreign_previous: text_at(&self.foreign, i - 1),
            native_previous: text_at(&self.native, i - 1),
            foreign_next: text_at(&self.foreign, i + 1),
            native_next: text_at(&self.native, i + 1),
            already_done,
        })
    }
}

/// Per-cue processor for condense: WAV segment extraction only.
struct CondenseCueProcessor {
    ffmpeg: FfmpegDriver,
    media_path: PathBuf,
    audio_track: usize,
    media_dir: PathBuf,
    base: String,
    offset_ms: i64,
}

#[async_trait]
impl CueProcessor for CondenseCueProcessor {
    async fn process(
        &self,
        index: usize,
        cue: &Cue,
        cancel: &CancellationToken,
    ) -> Result<ProcessedItem> {
        let out = self
            .media_dir
            .join(format!("{}_{:04}.wav", self.base, index + 1));
        let args = cue_wav_args(
            &self.media_path,
            self.audio_track,
            cue.start,
            cue.end,
            self.offset_ms,
            &out,
        );
        self.ffmpeg.run(&args, cancel).await?;
        Ok(ProcessedItem {
            index,
            start_time: format_timestamp(cue.start),
            audio_path: Some(out),
            ..Default::default()
        })
    }
}

/// A segment must parse as WAV and carry samples; a truncated extraction
/// would otherwise corrupt the whole concat.
fn is_valid_wav(path: &Path) -> bool {
    match hound::WavReader::open(path) {
        Ok(reader) => reader.len() > 0,
        Err(_) => false,
    }
}

/// Map each target cue to the native cue overlapping its midpoint.
fn align_native_texts(target: &SubtitleDocument, native: Option<&SubtitleDocument>) -> Vec<String> {
    let Some(native) = native else {
        return vec![String::new(); target.cues.len()];
    };
    target
        .cues
        .iter()
        .map(|cue| {
            let half = cue.end.checked_sub(cue.start).unwrap_or(Duration::ZERO) / 2;
            let mid = cue.start + half;
            native
                .cues
                .iter()
                .find(|n| n.start <= mid && mid < n.end)
                .map(|n| n.lines.join(" "))
                .unwrap_or_default()
        })
        .collect()
}

/// Transliteration output file name: `<stem>.<suffix>.<ext>`.
fn translit_file_name(subtitle_path: &Path, suffix: &str) -> PathBuf {
    let stem = subtitle_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = subtitle_path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "srt".to_string());
    let name = format!("{}.{}.{}", stem, suffix, ext);
    match subtitle_path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Read (clip, timestamp) pairs from the tabular output.
fn read_tabular_rows(path: &Path, separator: &str) -> Result<Vec<(String, String)>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let mut fields = line.split(separator);
            let clip = fields.next()?.to_string();
            let timestamp = fields.next()?.to_string();
            Some((clip, timestamp))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::{NoopHandler, NoopTelemetry};
    use crate::core::subtitle::SubtitleFileFormat;
    use tempfile::TempDir;

    fn make_task(config: TaskConfig) -> Task {
        let factory = Arc::new(ProviderFactory::with_test_mode(AppConfig::default(), true));
        Task::new(
            config,
            AppConfig::default(),
            Arc::new(NoopHandler),
            Arc::new(NoopTelemetry),
            factory,
        )
    }

    #[test]
    fn test_validate_rejects_apostrophe_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("it's a dir");
        std::fs::create_dir(&dir).unwrap();
        let media = dir.join("movie.mp4");
        std::fs::write(&media, b"").unwrap();

        let mut config = TaskConfig::new(TaskMode::Subs2Cards, &media);
        config.target_language = Language::parse("ja");
        let task = make_task(config);
        let err = task.validate().unwrap_err();
        assert!(matches!(err, SubLingoError::Validation { .. }));
    }

    #[test]
    fn test_validate_requires_language_or_subtitle() {
        let temp = TempDir::new().unwrap();
        let media = temp.path().join("movie.mp4");
        std::fs::write(&media, b"").unwrap();

        let config = TaskConfig::new(TaskMode::Subs2Cards, &media);
        let task = make_task(config);
        assert!(task.validate().is_err());

        let mut config = TaskConfig::new(TaskMode::Subs2Cards, &media);
        config.target_subtitle = Some(temp.path().join("movie.ja.srt"));
        let task = make_task(config);
        assert!(task.validate().is_ok());

        // enhance mode needs no subtitles at all
        let config = TaskConfig::new(TaskMode::Enhance, &media);
        let task = make_task(config);
        assert!(task.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_existing_media() {
        let config = TaskConfig::new(TaskMode::Enhance, "/nonexistent/movie.mp4");
        let task = make_task(config);
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_translit_file_name() {
        assert_eq!(
            translit_file_name(Path::new("/d/movie.ja.srt"), "romanized"),
            PathBuf::from("/d/movie.ja.romanized.srt")
        );
    }

    #[test]
    fn test_align_native_texts_by_overlap() {
        let target = SubtitleDocument {
            cues: vec![
                Cue {
                    start: Duration::from_secs(1),
                    end: Duration::from_secs(3),
                    lines: vec!["一".to_string()],
                    style: None,
                },
                Cue {
                    start: Duration::from_secs(10),
                    end: Duration::from_secs(12),
                    lines: vec!["二".to_string()],
                    style: None,
                },
            ],
            format: SubtitleFileFormat::Srt,
            header: String::new(),
            default_style: None,
        };
        let native = SubtitleDocument {
            cues: vec![Cue {
                start: Duration::from_millis(900),
                end: Duration::from_secs(3),
                lines: vec!["one".to_string()],
                style: None,
            }],
            format: SubtitleFileFormat::Srt,
            header: String::new(),
            default_style: None,
        };
        let aligned = align_native_texts(&target, Some(&native));
        assert_eq!(aligned, vec!["one".to_string(), String::new()]);
    }

    #[test]
    fn test_align_without_native_doc() {
        let target = SubtitleDocument {
            cues: vec![Cue {
                start: Duration::from_secs(1),
                end: Duration::from_secs(2),
                lines: vec!["x".to_string()],
                style: None,
            }],
            format: SubtitleFileFormat::Srt,
            header: String::new(),
            default_style: None,
        };
        assert_eq!(align_native_texts(&target, None), vec![String::new()]);
    }

    #[test]
    fn test_read_tabular_rows() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.tsv");
        std::fs::write(
            &path,
            "clip_0001.ogg\t00:00:01,000\timg.jpg\ttext\nclip_0002.ogg\t00:00:04,000\timg2.jpg\tmore\n",
        )
        .unwrap();
        let rows = read_tabular_rows(&path, "\t").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, "clip_0001.ogg");
        assert_eq!(rows[1].1, "00:00:04,000");
    }

    #[test]
    fn test_wav_validation() {
        let temp = TempDir::new().unwrap();

        let good = temp.path().join("seg_0001.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&good, spec).unwrap();
        for i in 0..100i16 {
            writer.write_sample(i).unwrap();
        }
        writer.finalize().unwrap();
        assert!(is_valid_wav(&good));

        let bad = temp.path().join("seg_0002.wav");
        std::fs::write(&bad, b"not a wav at all").unwrap();
        assert!(!is_valid_wav(&bad));

        assert!(!is_valid_wav(&temp.path().join("missing.wav")));
    }

    #[test]
    fn test_mode_gating_helpers() {
        assert!(TaskMode::Subs2Cards.produces_tabular());
        assert!(TaskMode::Subs2Dubs.produces_tabular());
        assert!(!TaskMode::Condense.produces_tabular());
        assert!(TaskMode::Condense.prepares_output_dir());
        assert!(!TaskMode::Enhance.prepares_output_dir());
        assert!(!TaskMode::Translit.prepares_output_dir());
        assert!(!TaskMode::Enhance.needs_subtitles());
    }
}
