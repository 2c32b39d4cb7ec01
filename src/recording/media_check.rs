//! Helpers for tests that run the installed ffmpeg. Tests call `ffmpeg()`
//! first and return early when it is not on PATH.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use image::{Rgba, RgbaImage};

use crate::config::EncoderPreset;

use super::encoder::{EncodeRequest, FfmpegEncoder, VideoSink};
use super::frame::Frame;

pub fn ffmpeg() -> Option<PathBuf> {
    match which::which("ffmpeg") {
        Ok(path) => Some(path),
        Err(_) => {
            eprintln!("ffmpeg not on PATH, skipping");
            None
        }
    }
}

/// Encodes `count` frames through `FfmpegEncoder` and returns the written path.
pub fn encode_frames(ffmpeg: &Path, request: &EncodeRequest, count: u32) -> PathBuf {
    let mut encoder: Box<dyn VideoSink> =
        Box::new(FfmpegEncoder::open(ffmpeg, request, EncoderPreset::Ultrafast).unwrap());
    for i in 0..count {
        let shade = (i * 10 % 256) as u8;
        let image = RgbaImage::from_pixel(request.width, request.height, Rgba([shade, 64, 128, 255]));
        encoder
            .write_frame(&Frame::from_rgba(&image, request.width, request.height))
            .unwrap();
    }
    encoder.finish().unwrap()
}

/// Decodes the first video stream to 8-bit gray and counts the frames.
pub fn decoded_video_frames(ffmpeg: &Path, file: &Path, width: u32, height: u32) -> usize {
    let output = Command::new(ffmpeg)
        .args(["-hide_banner", "-loglevel", "error", "-i"])
        .arg(file)
        .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "gray", "-"])
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "decode failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output.stdout.len() / (width * height) as usize
}

/// Decodes the first audio stream to a WAV in `scratch` and returns its
/// length in seconds.
pub fn decoded_audio_secs(ffmpeg: &Path, file: &Path, scratch: &Path) -> f64 {
    let wav = scratch.join("decoded.wav");
    let status = Command::new(ffmpeg)
        .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
        .arg(file)
        .args(["-map", "0:a:0", "-c:a", "pcm_s16le"])
        .arg(&wav)
        .stdin(Stdio::null())
        .status()
        .unwrap();
    assert!(status.success());
    let reader = hound::WavReader::open(&wav).unwrap();
    reader.duration() as f64 / reader.spec().sample_rate as f64
}

/// Container duration reported by ffprobe, when ffprobe is installed.
pub fn probed_duration(file: &Path) -> Option<f64> {
    let ffprobe = which::which("ffprobe").ok()?;
    let output = Command::new(ffprobe)
        .args(["-v", "error", "-show_entries", "format=duration"])
        .args(["-of", "default=noprint_wrappers=1:nokey=1"])
        .arg(file)
        .stdin(Stdio::null())
        .output()
        .ok()?;
    String::from_utf8_lossy(&output.stdout).trim().parse().ok()
}

/// Writes `secs` of a quiet 440 Hz tone as a mono float WAV.
pub fn write_tone(path: &Path, sample_rate: u32, secs: f64) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let total = (sample_rate as f64 * secs) as u32;
    for n in 0..total {
        let t = n as f32 / sample_rate as f32;
        writer
            .write_sample((t * 440.0 * std::f32::consts::TAU).sin() * 0.2)
            .unwrap();
    }
    writer.finalize().unwrap();
}
