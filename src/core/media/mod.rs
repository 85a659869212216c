//! Media container access: probing, transmuxing, and track selection.

pub mod ffmpeg;
pub mod probe;
pub mod selection;

pub use ffmpeg::FfmpegDriver;
pub use probe::{AudioTrack, MediaInfo, MediaProbe, TextTrack};
