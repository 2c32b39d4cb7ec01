use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::EncoderPreset;

use super::encoder::{output_path, VideoCodec};
use super::error::RecordError;

/// Builds the ffmpeg arguments that combine `video` and an optional `audio`
/// track into `output`. Without audio the video is simply re-encoded.
///
/// The audio is padded with silence and cut at the end of the video, so the
/// output always runs the full video length.
pub fn merge_args(
    video: &Path,
    audio: Option<&Path>,
    output: &Path,
    codec: VideoCodec,
    preset: EncoderPreset,
) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-y", "-i"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.push(video.to_string_lossy().into_owned());

    if let Some(audio) = audio {
        args.push("-i".to_string());
        args.push(audio.to_string_lossy().into_owned());
        args.extend(["-map", "0:v:0", "-map", "1:a:0"].iter().map(|s| s.to_string()));
    }

    args.extend(codec.codec_args(preset));

    if audio.is_some() {
        let audio_codec = match codec {
            VideoCodec::H264 => "aac",
            VideoCodec::Mpeg4 => "pcm_s16le",
        };
        args.extend(["-c:a".to_string(), audio_codec.to_string()]);
        args.extend(["-af".to_string(), "apad".to_string()]);
        args.push("-shortest".to_string());
    }

    args.push(output.to_string_lossy().into_owned());
    args
}

/// Merges the intermediate tracks into the final file. `output` is kept as
/// given when its extension fits `codec`; an `.mp4` request becomes `.avi`
/// only when H.264 is not available. Returns the path actually written.
pub fn merge(
    ffmpeg: &Path,
    video: &Path,
    audio: Option<&Path>,
    output: &Path,
    codec: VideoCodec,
    preset: EncoderPreset,
) -> Result<PathBuf, RecordError> {
    let output = output_path(output, codec);
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    tracing::info!(
        "Merging {} + {} into {}",
        video.display(),
        audio.map(|a| a.display().to_string()).unwrap_or_else(|| "no audio".to_string()),
        output.display()
    );

    let result = Command::new(ffmpeg)
        .args(merge_args(video, audio, &output, codec, preset))
        .stdin(Stdio::null())
        .output()
        .map_err(|e| RecordError::Merge {
            path: output.clone(),
            reason: e.to_string(),
        })?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(RecordError::Merge {
            path: output,
            reason: format!("ffmpeg exited with {}: {}", result.status, stderr.trim()),
        });
    }

    Ok(output)
}

/// Deletes intermediate files, logging rather than failing on errors.
pub fn remove_intermediates(paths: &[&Path]) {
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not remove {}: {}", path.display(), e),
        }
    }
}
