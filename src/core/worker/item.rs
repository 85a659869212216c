//! Per-cue processed items and the tabular row writer.

use crate::Result;
use std::io::Write;
use std::path::PathBuf;

/// Artifacts produced for one cue.
///
/// The index equals the cue's position in the filtered document.
/// `already_done` items carry no new artifacts; the writer counts them
/// down instead of emitting a row.
#[derive(Debug, Clone, Default)]
pub struct ProcessedItem {
    /// Position in the filtered document.
    pub index: usize,
    /// Start time rendered as `HH:MM:SS,mmm`.
    pub start_time: String,
    /// Extracted audio clip, when the mode produces one.
    pub audio_path: Option<PathBuf>,
    /// Extracted still image, when the mode produces one.
    pub image_path: Option<PathBuf>,
    /// Target-language text of this cue.
    pub foreign_current: String,
    /// Native-language text of this cue.
    pub native_current: String,
    /// Target-language text of the previous cue.
    pub foreign_previous: String,
    /// Native-language text of the previous cue.
    pub native_previous: String,
    /// Target-language text of the next cue.
    pub foreign_next: String,
    /// Native-language text of the next cue.
    pub native_next: String,
    /// An equivalent artifact already existed on disk.
    pub already_done: bool,
}

/// Destination for processed-item rows.
///
/// Implementations are driven by the pool's single writer; they are never
/// called concurrently.
pub trait RowWriter: Send {
    /// Append one row.
    fn write_row(&mut self, item: &ProcessedItem) -> Result<()>;

    /// Flush buffered rows to the underlying file.
    fn flush(&mut self) -> Result<()>;
}

/// Separator-delimited row writer for the tabular output file.
///
/// The second column is the start timestamp; the literal
/// `<sep><timestamp><sep>` bytes double as the resumption fingerprint.
pub struct TabularRowWriter<W: Write + Send> {
    out: W,
    separator: String,
}

impl<W: Write + Send> TabularRowWriter<W> {
    /// Create a writer emitting fields joined by `separator`.
    pub fn new(out: W, separator: impl Into<String>) -> Self {
        Self {
            out,
            separator: separator.into(),
        }
    }
}

impl<W: Write + Send> RowWriter for TabularRowWriter<W> {
    fn write_row(&mut self, item: &ProcessedItem) -> Result<()> {
        let file_name = |p: &Option<PathBuf>| {
            p.as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        let sanitize = |s: &str| s.replace(&self.separator, " ").replace('\n', " ");

        let fields = [
            file_name(&item.audio_path),
            item.start_time.clone(),
            file_name(&item.image_path),
            sanitize(&item.foreign_current),
            sanitize(&item.native_current),
            sanitize(&item.foreign_previous),
            sanitize(&item.native_previous),
            sanitize(&item.foreign_next),
            sanitize(&item.native_next),
        ];
        writeln!(self.out, "{}", fields.join(&self.separator))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}
