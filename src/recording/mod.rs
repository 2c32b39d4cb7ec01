mod audio;
mod backend;
mod encoder;
mod error;
mod frame;
#[cfg(test)]
mod media_check;
mod mux;
mod session;

pub use backend::{locate_ffmpeg, FfmpegBackend, MediaBackend};
pub use error::RecordError;
pub use session::{RecordingSession, SessionEvent};

use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;

/// Fixed names of the intermediate files written by audio sessions.
pub const TEMP_VIDEO_FILE: &str = "temp_video.avi";
pub const TEMP_AUDIO_FILE: &str = "temp_audio.wav";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
    Finalizing,
}

#[derive(Debug, Clone)]
pub struct RecordingSettings {
    pub fps: u32,
    pub max_duration: Option<Duration>,
    pub record_audio: bool,
    pub sample_rate: u32,
    pub channels: u16,
    pub queue_capacity: usize,
    pub intermediate_dir: PathBuf,
}

impl RecordingSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fps: config.recording.fps,
            max_duration: config.recording.max_duration_secs.map(Duration::from_secs),
            record_audio: config.audio.enabled,
            sample_rate: config.audio.sample_rate,
            channels: config.audio.channels,
            queue_capacity: config.audio.queue_capacity,
            intermediate_dir: config.audio.intermediate_dir.clone(),
        }
    }
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
