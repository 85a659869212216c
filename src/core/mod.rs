//! Core processing engine for sublingo.
//!
//! This module contains the load-bearing subsystems of the tool:
//! - `language` for language tags and filename-based guessing
//! - `subtitle` for cue documents, SRT/ASS parsing, and preprocessing
//! - `media` for the transmuxer/probe subprocess drivers and track selection
//! - `scanner` for subtitle candidate discovery and ranking
//! - `worker` for the ordered-concurrent per-cue pool and ETA estimation
//! - `pipeline` for the mode-gated task executor, output registry, and bulk
//!   routing

pub mod language;
pub mod media;
pub mod pipeline;
pub mod scanner;
pub mod subtitle;
pub mod worker;
