use std::path::PathBuf;

use thiserror::Error;

/// Everything that can end or prevent a recording session.
///
/// Payloads are plain strings so the error can travel inside UI messages,
/// which must be `Clone`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("required program `{0}` was not found; install it and make sure it is on PATH")]
    MissingDependency(String),

    #[error("a recording is already in progress")]
    AlreadyActive,

    #[error("no output file was chosen")]
    NoOutputPath,

    #[error("screen capture is unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("frame capture failed: {0}")]
    FrameCapture(String),

    #[error("no usable video encoder: {0}")]
    EncoderInit(String),

    #[error("video encoder failed: {0}")]
    Encoder(String),

    #[error("microphone capture failed: {0}")]
    Audio(String),

    #[error("merging audio into {} failed: {reason}", path.display())]
    Merge { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("the recording worker stopped unexpectedly")]
    WorkerLost,
}

impl From<std::io::Error> for RecordError {
    fn from(err: std::io::Error) -> Self {
        RecordError::Io(err.to_string())
    }
}

impl From<hound::Error> for RecordError {
    fn from(err: hound::Error) -> Self {
        RecordError::Audio(err.to_string())
    }
}

impl RecordError {
    /// Title used for the modal dialog that reports this error.
    pub fn dialog_title(&self) -> &'static str {
        match self {
            RecordError::AlreadyActive => "Already Recording",
            RecordError::NoOutputPath => "Recording Cancelled",
            RecordError::CaptureUnavailable(_) => "Screen Capture Error",
            RecordError::FrameCapture(_) => "Recording Stopped",
            RecordError::EncoderInit(_) | RecordError::Encoder(_) => "Encoder Error",
            RecordError::Audio(_) => "Microphone Error",
            RecordError::Merge { .. } => "Merge Failed",
            RecordError::WorkerLost => "Recording Failed",
            RecordError::MissingDependency(_) | RecordError::Io(_) => "Error",
        }
    }

    /// Warnings leave any session untouched; everything else is an error.
    pub fn is_warning(&self) -> bool {
        matches!(self, RecordError::AlreadyActive | RecordError::NoOutputPath)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts() {
        let err: RecordError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, RecordError::Io(ref msg) if msg.contains("gone")));
    }

    #[test]
    fn test_merge_message_names_path() {
        let err = RecordError::Merge {
            path: PathBuf::from("out.mp4"),
            reason: "exit status 1".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("out.mp4"));
        assert!(msg.contains("exit status 1"));
    }

    #[test]
    fn test_warnings() {
        assert!(RecordError::AlreadyActive.is_warning());
        assert!(!RecordError::FrameCapture("x".into()).is_warning());
    }
}
