//! Intermediary-file management.
//!
//! The task tracks every intermediary it writes (scratch extractions,
//! uploaded audio, concat lists) plus the resumption (tabular) file and the
//! per-cue media directory, then applies the configured retention policy
//! once the task finishes. The manager is owned by the task and holds no
//! reference back to it.

use crate::Result;
use crate::config::RetentionPolicy;
use log::{debug, warn};
use std::path::{Path, PathBuf};

/// Tracks intermediary files and applies the retention policy.
#[derive(Debug)]
pub struct IntermediaryManager {
    policy: RetentionPolicy,
    intermediaries: Vec<PathBuf>,
    resumption_file: Option<PathBuf>,
    media_dir: Option<PathBuf>,
    delete_resumption: bool,
}

impl IntermediaryManager {
    /// Create a manager for the given policy and explicit resumption-file
    /// deletion flag.
    pub fn new(policy: RetentionPolicy, delete_resumption: bool) -> Self {
        Self {
            policy,
            intermediaries: Vec::new(),
            resumption_file: None,
            media_dir: None,
            delete_resumption,
        }
    }

    /// Track an intermediary file for policy-driven cleanup.
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.intermediaries.push(path.into());
    }

    /// Track the tabular resumption file.
    pub fn track_resumption(&mut self, path: impl Into<PathBuf>) {
        self.resumption_file = Some(path.into());
    }

    /// Track the per-cue media directory for empty-dir removal.
    pub fn track_media_dir(&mut self, path: impl Into<PathBuf>) {
        self.media_dir = Some(path.into());
    }

    /// Apply the retention policy. `merge_succeeded` gates the
    /// delete-after-merge policy; an empty media directory is removed
    /// regardless of policy.
    pub fn finalize(&self, merge_succeeded: bool) -> Result<()> {
        match self.policy {
            RetentionPolicy::Keep => {}
            RetentionPolicy::DeleteAfterMerge => {
                if merge_succeeded {
                    for path in &self.intermediaries {
                        remove_quietly(path);
                    }
                }
            }
            RetentionPolicy::DeleteResumptionOnly => {
                if let Some(path) = &self.resumption_file {
                    remove_quietly(path);
                }
            }
        }

        if self.delete_resumption {
            if let Some(path) = &self.resumption_file {
                remove_quietly(path);
            }
        }

        if let Some(dir) = &self.media_dir {
            remove_dir_if_empty(dir);
        }
        Ok(())
    }
}

fn remove_quietly(path: &Path) {
    if path.exists() {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("removed intermediary {}", path.display()),
            Err(e) => warn!("could not remove {}: {}", path.display(), e),
        }
    }
}

fn remove_dir_if_empty(dir: &Path) {
    if let Ok(mut entries) = std::fs::read_dir(dir) {
        if entries.next().is_none() {
            match std::fs::remove_dir(dir) {
                Ok(()) => debug!("removed empty media directory {}", dir.display()),
                Err(e) => warn!("could not remove {}: {}", dir.display(), e),
            }
        }
    }
}
