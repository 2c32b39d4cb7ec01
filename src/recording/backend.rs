use std::path::{Path, PathBuf};

use crate::config::EncoderPreset;

use super::audio::{AudioRecorder, AudioSettings, MicCapture};
use super::encoder::{EncodeRequest, EncoderCatalog, FfmpegEncoder, VideoCodec, VideoSink};
use super::error::RecordError;
use super::mux;

const FFMPEG: &str = "ffmpeg";

/// Locates the ffmpeg executable, preferring an explicitly configured path.
pub fn locate_ffmpeg(configured: Option<&Path>) -> Result<PathBuf, RecordError> {
    match configured {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => which::which(path)
            .map_err(|_| RecordError::MissingDependency(path.display().to_string())),
        None => which::which(FFMPEG).map_err(|_| RecordError::MissingDependency(FFMPEG.to_string())),
    }
}

/// The external pieces a session drives: the video encoder, the microphone
/// and the track merger.
pub trait MediaBackend: Send + Sync {
    /// Codecs to try, in order, for a file the user will open directly. The
    /// codec named by the extension of `output` comes first.
    fn output_codecs(&self, output: &Path) -> Vec<VideoCodec>;

    /// Codecs to try for the video-only intermediate of an audio session.
    fn intermediate_codecs(&self) -> Vec<VideoCodec>;

    fn open_encoder(&self, request: &EncodeRequest) -> Result<Box<dyn VideoSink>, RecordError>;

    fn start_audio(&self, settings: &AudioSettings) -> Result<Box<dyn AudioRecorder>, RecordError>;

    /// Produces the final artifact from the intermediates and returns its path.
    fn merge(
        &self,
        video: &Path,
        audio: Option<&Path>,
        output: &Path,
    ) -> Result<PathBuf, RecordError>;
}

/// ffmpeg for encoding and merging, cpal for the microphone.
pub struct FfmpegBackend {
    ffmpeg: PathBuf,
    catalog: EncoderCatalog,
    preset: EncoderPreset,
}

impl FfmpegBackend {
    pub fn new(ffmpeg: PathBuf, preset: EncoderPreset) -> Self {
        let catalog = EncoderCatalog::detect(&ffmpeg);
        tracing::debug!("Video encoder candidates: {:?}", catalog.candidates());
        Self {
            ffmpeg,
            catalog,
            preset,
        }
    }
}

impl MediaBackend for FfmpegBackend {
    fn output_codecs(&self, output: &Path) -> Vec<VideoCodec> {
        self.catalog.candidates_for(output)
    }

    fn intermediate_codecs(&self) -> Vec<VideoCodec> {
        // The intermediate is an AVI and gets re-encoded at merge time, so the
        // cheaper MPEG-4 encoder goes first.
        let mut codecs = self.catalog.candidates();
        codecs.sort_by_key(|c| *c != VideoCodec::Mpeg4);
        codecs
    }

    fn open_encoder(&self, request: &EncodeRequest) -> Result<Box<dyn VideoSink>, RecordError> {
        let encoder = FfmpegEncoder::open(&self.ffmpeg, request, self.preset)?;
        Ok(Box::new(encoder))
    }

    fn start_audio(&self, settings: &AudioSettings) -> Result<Box<dyn AudioRecorder>, RecordError> {
        let capture = MicCapture::start(settings)?;
        Ok(Box::new(capture))
    }

    fn merge(
        &self,
        video: &Path,
        audio: Option<&Path>,
        output: &Path,
    ) -> Result<PathBuf, RecordError> {
        mux::merge(
            &self.ffmpeg,
            video,
            audio,
            output,
            self.catalog.preferred_for(output),
            self.preset,
        )
    }
}
