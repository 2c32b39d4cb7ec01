use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::config::EncoderPreset;

use super::error::RecordError;
use super::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    Mpeg4,
}

impl VideoCodec {
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::Mpeg4 => "mpeg4",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "mp4",
            VideoCodec::Mpeg4 => "avi",
        }
    }

    /// The codec a file name asks for: `.avi` means MPEG-4, `.mp4` H.264.
    pub fn for_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        [VideoCodec::H264, VideoCodec::Mpeg4]
            .into_iter()
            .find(|c| ext.eq_ignore_ascii_case(c.extension()))
    }

    pub(super) fn codec_args(&self, preset: EncoderPreset) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.ffmpeg_name().to_string()];
        match self {
            VideoCodec::H264 => {
                args.extend(["-preset".to_string(), preset.as_str().to_string()]);
                args.extend(["-crf".to_string(), "23".to_string()]);
            }
            VideoCodec::Mpeg4 => {
                args.extend(["-q:v".to_string(), "5".to_string()]);
            }
        }
        args.extend(["-pix_fmt".to_string(), "yuv420p".to_string()]);
        args
    }
}

/// The encoders the local ffmpeg build offers, from `ffmpeg -encoders`.
#[derive(Debug, Clone, Default)]
pub struct EncoderCatalog {
    names: Vec<String>,
}

impl EncoderCatalog {
    pub fn detect(ffmpeg: &Path) -> Self {
        let output = Command::new(ffmpeg)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .output();

        match output {
            Ok(o) => Self::parse(&String::from_utf8_lossy(&o.stdout)),
            Err(e) => {
                tracing::warn!("Failed to list ffmpeg encoders: {}", e);
                Self::default()
            }
        }
    }

    /// Parses lines like ` V....D libx264   libx264 H.264 / AVC ...`.
    pub fn parse(listing: &str) -> Self {
        let names = listing
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let flags = parts.next()?;
                let name = parts.next()?;
                if flags.len() == 6 && flags.starts_with('V') {
                    Some(name.to_string())
                } else {
                    None
                }
            })
            .collect();
        Self { names }
    }

    pub fn supports(&self, codec: VideoCodec) -> bool {
        self.names.iter().any(|n| n == codec.ffmpeg_name())
    }

    /// Codecs to try in order: H.264 first, MPEG-4 as the single fallback.
    /// An empty catalog means detection failed, so both are attempted.
    pub fn candidates(&self) -> Vec<VideoCodec> {
        [VideoCodec::H264, VideoCodec::Mpeg4]
            .into_iter()
            .filter(|c| self.names.is_empty() || self.supports(*c))
            .collect()
    }

    /// Candidates for writing `path`, with the codec its extension names
    /// moved to the front when this build offers it.
    pub fn candidates_for(&self, path: &Path) -> Vec<VideoCodec> {
        prefer_for_path(self.candidates(), path)
    }

    /// Best codec for the final, merged output at `path`.
    pub fn preferred_for(&self, path: &Path) -> VideoCodec {
        self.candidates_for(path)
            .first()
            .copied()
            .unwrap_or(VideoCodec::Mpeg4)
    }
}

/// Reorders `codecs` so the one matching the extension of `path` comes first.
pub fn prefer_for_path(mut codecs: Vec<VideoCodec>, path: &Path) -> Vec<VideoCodec> {
    if let Some(wanted) = VideoCodec::for_path(path) {
        codecs.sort_by_key(|c| *c != wanted);
    }
    codecs
}

/// The file a codec is written to: `path` unchanged when its extension
/// already fits the codec, otherwise `path` with the codec's extension.
pub fn output_path(path: &Path, codec: VideoCodec) -> PathBuf {
    if VideoCodec::for_path(path) == Some(codec) {
        path.to_path_buf()
    } else {
        path.with_extension(codec.extension())
    }
}

/// Where and how the capture loop's frames should be encoded.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Codecs in preference order.
    pub codecs: Vec<VideoCodec>,
    /// When false, a file extension that does not fit the codec actually
    /// opened is switched to that codec's (`.mp4` or `.avi`).
    pub keep_extension: bool,
}

/// Receives converted frames for one session and owns the encoded file.
pub trait VideoSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), RecordError>;

    /// Flushes and closes the encoder, returning the path that was written.
    fn finish(self: Box<Self>) -> Result<PathBuf, RecordError>;

    /// Closes the encoder and removes whatever it wrote.
    fn discard(self: Box<Self>) {
        if let Ok(path) = self.finish() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Pipes raw BGR24 frames into an `ffmpeg` child process.
pub struct FfmpegEncoder {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    output_path: PathBuf,
    codec: VideoCodec,
    frames_written: u64,
}

impl FfmpegEncoder {
    /// Opens the first codec in `request.codecs` whose process starts.
    ///
    /// Which codecs are worth trying is decided by the `EncoderCatalog`; a
    /// codec that fails later surfaces from `write_frame` or `finish`.
    pub fn open(
        ffmpeg: &Path,
        request: &EncodeRequest,
        preset: EncoderPreset,
    ) -> Result<Self, RecordError> {
        if request.width == 0 || request.height == 0 {
            return Err(RecordError::EncoderInit(format!(
                "invalid dimensions {}x{}",
                request.width, request.height
            )));
        }
        if request.width % 2 != 0 || request.height % 2 != 0 {
            return Err(RecordError::EncoderInit(format!(
                "dimensions must be even, got {}x{}",
                request.width, request.height
            )));
        }

        let mut last_error = String::from("no codec candidates");
        for &codec in &request.codecs {
            let path = if request.keep_extension {
                request.path.clone()
            } else {
                output_path(&request.path, codec)
            };

            match Self::spawn(ffmpeg, &path, request, codec, preset) {
                Ok(encoder) => {
                    tracing::info!(
                        "Encoding {}x{} @ {} fps with {} to {}",
                        request.width,
                        request.height,
                        request.fps,
                        codec.ffmpeg_name(),
                        path.display()
                    );
                    return Ok(encoder);
                }
                Err(e) => {
                    tracing::warn!("Encoder {} unavailable: {}", codec.ffmpeg_name(), e);
                    last_error = e;
                }
            }
        }

        Err(RecordError::EncoderInit(last_error))
    }

    fn spawn(
        ffmpeg: &Path,
        path: &Path,
        request: &EncodeRequest,
        codec: VideoCodec,
        preset: EncoderPreset,
    ) -> Result<Self, String> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
        }

        let mut child = Command::new(ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pix_fmt", "bgr24"])
            .args(["-s", &format!("{}x{}", request.width, request.height)])
            .args(["-r", &request.fps.to_string()])
            .args(["-i", "-"])
            .args(codec.codec_args(preset))
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| e.to_string())?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| "ffmpeg stdin unavailable".to_string())?;

        Ok(Self {
            child,
            stdin: Some(BufWriter::new(stdin)),
            output_path: path.to_path_buf(),
            codec,
            frames_written: 0,
        })
    }
}

impl VideoSink for FfmpegEncoder {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), RecordError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| RecordError::Encoder("encoder already closed".to_string()))?;
        stdin
            .write_all(&frame.data)
            .map_err(|e| RecordError::Encoder(e.to_string()))?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<PathBuf, RecordError> {
        let mut this = *self;
        if let Some(mut stdin) = this.stdin.take() {
            let _ = stdin.flush();
        }

        let output = this
            .child
            .wait_with_output()
            .map_err(|e| RecordError::Encoder(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecordError::Encoder(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        tracing::info!(
            "{} encoder closed after {} frames: {}",
            this.codec.ffmpeg_name(),
            this.frames_written,
            this.output_path.display()
        );
        Ok(this.output_path)
    }

    fn discard(self: Box<Self>) {
        let mut this = *self;
        this.stdin.take();
        let _ = this.child.kill();
        let _ = this.child.wait();
        match std::fs::remove_file(&this.output_path) {
            Ok(()) => tracing::debug!("Discarded {}", this.output_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not remove {}: {}", this.output_path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::media_check;

    const LISTING: &str = "Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V....D mpeg4                MPEG-4 part 2
 A....D aac                  AAC (Advanced Audio Coding)
";

    #[test]
    fn test_parse_listing() {
        let catalog = EncoderCatalog::parse(LISTING);
        assert!(catalog.supports(VideoCodec::H264));
        assert!(catalog.supports(VideoCodec::Mpeg4));
        assert_eq!(catalog.candidates(), vec![VideoCodec::H264, VideoCodec::Mpeg4]);
    }

    #[test]
    fn test_legend_lines_ignored() {
        let catalog = EncoderCatalog::parse(" V..... = Video\n");
        assert!(catalog.names.is_empty());
    }

    #[test]
    fn test_fallback_without_h264() {
        let listing = LISTING.replace("libx264", "libfoo");
        let catalog = EncoderCatalog::parse(&listing);
        assert_eq!(catalog.candidates(), vec![VideoCodec::Mpeg4]);
        assert_eq!(catalog.preferred_for(Path::new("clip.mp4")), VideoCodec::Mpeg4);
    }

    #[test]
    fn test_extension_picks_codec() {
        let catalog = EncoderCatalog::parse(LISTING);
        assert_eq!(catalog.preferred_for(Path::new("clip.avi")), VideoCodec::Mpeg4);
        assert_eq!(catalog.preferred_for(Path::new("clip.mp4")), VideoCodec::H264);
        assert_eq!(catalog.preferred_for(Path::new("clip")), VideoCodec::H264);
    }

    #[test]
    fn test_output_path_only_changes_on_fallback() {
        let chosen = Path::new("/videos/Take.AVI");
        assert_eq!(output_path(chosen, VideoCodec::Mpeg4), chosen);
        assert_eq!(
            output_path(Path::new("/videos/take.mp4"), VideoCodec::Mpeg4),
            Path::new("/videos/take.avi")
        );
    }

    #[test]
    fn test_empty_catalog_tries_everything() {
        let catalog = EncoderCatalog::default();
        assert_eq!(catalog.candidates(), vec![VideoCodec::H264, VideoCodec::Mpeg4]);
    }

    #[test]
    fn test_odd_dimensions_rejected() {
        let request = EncodeRequest {
            path: PathBuf::from("out.mp4"),
            width: 1281,
            height: 720,
            fps: 20,
            codecs: vec![VideoCodec::H264],
            keep_extension: false,
        };
        let result = FfmpegEncoder::open(Path::new("ffmpeg"), &request, EncoderPreset::default());
        assert!(matches!(result, Err(RecordError::EncoderInit(_))));
    }

    #[test]
    fn test_missing_binary_fails_every_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let request = EncodeRequest {
            path: dir.path().join("out.mp4"),
            width: 64,
            height: 48,
            fps: 20,
            codecs: vec![VideoCodec::H264, VideoCodec::Mpeg4],
            keep_extension: false,
        };
        let missing = dir.path().join("no-such-ffmpeg");
        let result = FfmpegEncoder::open(&missing, &request, EncoderPreset::default());
        assert!(matches!(result, Err(RecordError::EncoderInit(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_encoder_exit_surfaces_on_finish() {
        let Ok(failing) = which::which("false") else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let request = EncodeRequest {
            path: dir.path().join("out.mp4"),
            width: 64,
            height: 48,
            fps: 20,
            codecs: vec![VideoCodec::H264],
            keep_extension: false,
        };
        let encoder = FfmpegEncoder::open(&failing, &request, EncoderPreset::default()).unwrap();
        let result = Box::new(encoder).finish();
        assert!(matches!(result, Err(RecordError::Encoder(_))));
    }

    #[test]
    fn test_real_encode_matches_rate_and_duration() {
        let Some(ffmpeg) = media_check::ffmpeg() else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let catalog = EncoderCatalog::detect(&ffmpeg);

        for codec in catalog.candidates() {
            let request = EncodeRequest {
                path: dir.path().join(format!("clip.{}", codec.extension())),
                width: 64,
                height: 48,
                fps: 10,
                codecs: vec![codec],
                keep_extension: false,
            };
            let path = media_check::encode_frames(&ffmpeg, &request, 20);
            assert_eq!(path, request.path);
            assert_eq!(media_check::decoded_video_frames(&ffmpeg, &path, 64, 48), 20);
            if let Some(secs) = media_check::probed_duration(&path) {
                assert!((secs - 2.0).abs() <= 0.1, "{:?}: {}s", codec, secs);
            }
        }
    }

    #[test]
    fn test_codec_args_include_pixel_format() {
        let args = VideoCodec::Mpeg4.codec_args(EncoderPreset::default());
        assert!(args.windows(2).any(|w| w[0] == "-pix_fmt" && w[1] == "yuv420p"));
        let args = VideoCodec::H264.codec_args(EncoderPreset::Ultrafast);
        assert!(args.windows(2).any(|w| w[0] == "-preset" && w[1] == "ultrafast"));
    }
}
