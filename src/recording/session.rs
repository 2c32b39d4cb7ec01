use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::capture::Capture;

use super::audio::{AudioRecorder, AudioSettings};
use super::backend::MediaBackend;
use super::encoder::{EncodeRequest, VideoSink};
use super::error::RecordError;
use super::frame::{even_dimensions, Frame};
use super::mux::remove_intermediates;
use super::{RecordingSettings, RecordingState, TEMP_AUDIO_FILE, TEMP_VIDEO_FILE};

/// Notifications from the worker thread, drained by the UI on its tick.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The capture loop hit an unrecoverable error. Finalize still runs, so a
    /// `Finished` or `Failed` event follows.
    CaptureFailed(RecordError),
    Finished {
        path: PathBuf,
        frames: u64,
        duration: Duration,
    },
    Failed(RecordError),
}

/// Owns at most one recording at a time: a worker thread that runs the
/// capture loop and then finalizes the output.
pub struct RecordingSession {
    backend: Arc<dyn MediaBackend>,
    state: Arc<Mutex<RecordingState>>,
    stop_flag: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    started_at: Option<Instant>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
    worker: Option<JoinHandle<()>>,
}

/// Where a session's files go.
struct OutputPlan {
    output: PathBuf,
    intermediates: Option<(PathBuf, PathBuf)>,
}

impl RecordingSession {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            backend,
            state: Arc::new(Mutex::new(RecordingState::Idle)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            frames: Arc::new(AtomicU64::new(0)),
            started_at: None,
            events_tx,
            events_rx,
            worker: None,
        }
    }

    /// Current state. A worker that exited without returning to `Idle` (it
    /// panicked) is detected here and the session is reset.
    pub fn state(&self) -> RecordingState {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != RecordingState::Idle
            && self.worker.as_ref().is_some_and(|w| w.is_finished())
        {
            tracing::error!("Recording worker exited while {:?}; resetting", *state);
            *state = RecordingState::Idle;
            let _ = self.events_tx.send(SessionEvent::Failed(RecordError::WorkerLost));
        }
        *state
    }

    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Option<Duration> {
        match self.state() {
            RecordingState::Recording => self.started_at.map(|t| t.elapsed()),
            _ => None,
        }
    }

    pub fn poll_events(&self) -> Vec<SessionEvent> {
        self.events_rx.try_iter().collect()
    }

    /// Starts a session writing to `output`.
    ///
    /// `output` is `None` when the user dismissed the save dialog. Nothing is
    /// opened or created unless the probe grab from `source` succeeds.
    pub fn start(
        &mut self,
        source: Box<dyn Capture>,
        output: Option<PathBuf>,
        settings: &RecordingSettings,
    ) -> Result<(), RecordError> {
        if self.state() != RecordingState::Idle {
            tracing::warn!("Start ignored: a recording is already in progress");
            return Err(RecordError::AlreadyActive);
        }
        self.join_worker();

        let output = output.ok_or(RecordError::NoOutputPath)?;

        let probe = source
            .capture()
            .map_err(|e| RecordError::CaptureUnavailable(e.to_string()))?;
        let (width, height) = even_dimensions(probe.width(), probe.height());
        if width == 0 || height == 0 {
            return Err(RecordError::CaptureUnavailable(format!(
                "screen area {}x{} is too small",
                probe.width(),
                probe.height()
            )));
        }

        let plan = if settings.record_audio {
            OutputPlan {
                output,
                intermediates: Some((
                    settings.intermediate_dir.join(TEMP_VIDEO_FILE),
                    settings.intermediate_dir.join(TEMP_AUDIO_FILE),
                )),
            }
        } else {
            OutputPlan {
                output,
                intermediates: None,
            }
        };

        let request = match &plan.intermediates {
            Some((video, _)) => EncodeRequest {
                path: video.clone(),
                width,
                height,
                fps: settings.fps,
                codecs: self.backend.intermediate_codecs(),
                keep_extension: true,
            },
            None => EncodeRequest {
                path: plan.output.clone(),
                width,
                height,
                fps: settings.fps,
                codecs: self.backend.output_codecs(&plan.output),
                keep_extension: false,
            },
        };
        let sink = self.backend.open_encoder(&request)?;

        let audio = match &plan.intermediates {
            Some((_, wav_path)) => {
                let audio_settings = AudioSettings {
                    sample_rate: settings.sample_rate,
                    channels: settings.channels,
                    queue_capacity: settings.queue_capacity,
                    wav_path: wav_path.clone(),
                };
                match self.backend.start_audio(&audio_settings) {
                    Ok(recorder) => Some(recorder),
                    Err(e) => {
                        sink.discard();
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        self.stop_flag = Arc::new(AtomicBool::new(false));
        self.frames.store(0, Ordering::Relaxed);
        self.set_state(RecordingState::Recording);
        self.started_at = Some(Instant::now());

        let worker = Worker {
            source,
            sink,
            audio,
            backend: Arc::clone(&self.backend),
            plan,
            pacing: Pacing {
                width,
                height,
                fps: settings.fps.max(1),
                max_duration: settings.max_duration,
            },
            stop_flag: Arc::clone(&self.stop_flag),
            frames: Arc::clone(&self.frames),
            state: Arc::clone(&self.state),
            events: self.events_tx.clone(),
        };

        let spawned = thread::Builder::new()
            .name("recscr-capture".to_string())
            .spawn(move || worker.run());

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                tracing::info!("Recording started at {}x{}, {} fps", width, height, settings.fps);
                Ok(())
            }
            Err(e) => {
                self.set_state(RecordingState::Idle);
                self.started_at = None;
                Err(e.into())
            }
        }
    }

    /// Requests the capture loop to stop and returns without waiting for it.
    /// Returns false when no recording was running.
    pub fn stop(&mut self) -> bool {
        {
            // Checked and flipped under one lock so a worker that is just
            // finishing cannot be overwritten back to `Finalizing`.
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != RecordingState::Recording {
                return false;
            }
            *state = RecordingState::Finalizing;
        }
        self.stop_flag.store(true, Ordering::SeqCst);
        self.started_at = None;
        tracing::info!("Stop requested after {} frames", self.frame_count());
        true
    }

    fn set_state(&self, state: RecordingState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("Recording worker panicked");
                self.set_state(RecordingState::Idle);
            }
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.join_worker();
    }
}

#[derive(Debug, Clone, Copy)]
struct Pacing {
    width: u32,
    height: u32,
    fps: u32,
    max_duration: Option<Duration>,
}

struct Worker {
    source: Box<dyn Capture>,
    sink: Box<dyn VideoSink>,
    audio: Option<Box<dyn AudioRecorder>>,
    backend: Arc<dyn MediaBackend>,
    plan: OutputPlan,
    pacing: Pacing,
    stop_flag: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    state: Arc<Mutex<RecordingState>>,
    events: Sender<SessionEvent>,
}

impl Worker {
    fn run(mut self) {
        let started = Instant::now();
        let outcome = run_capture_loop(
            self.source.as_ref(),
            self.sink.as_mut(),
            &self.stop_flag,
            self.pacing,
            &self.frames,
        );

        self.stop_flag.store(true, Ordering::SeqCst);
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = RecordingState::Finalizing;
        let duration = started.elapsed();

        if let Err(e) = outcome {
            tracing::error!("Capture loop ended: {}", e);
            let _ = self.events.send(SessionEvent::CaptureFailed(e));
        }

        let result = finalize(self.sink, self.audio, self.backend.as_ref(), &self.plan);
        let frames = self.frames.load(Ordering::Relaxed);

        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = RecordingState::Idle;

        let event = match result {
            Ok(path) => {
                tracing::info!(
                    "Recording saved to {} ({} frames, {:.1}s)",
                    path.display(),
                    frames,
                    duration.as_secs_f64()
                );
                SessionEvent::Finished {
                    path,
                    frames,
                    duration,
                }
            }
            Err(e) => {
                tracing::error!("Finalize failed: {}", e);
                SessionEvent::Failed(e)
            }
        };
        let _ = self.events.send(event);
    }
}

/// Grabs, converts and encodes frames until `stop_flag` is set.
///
/// Frame deadlines are measured from the loop start. When a grab overruns
/// one or more whole intervals, the last frame is repeated so the encoded
/// duration keeps up with wall-clock time.
fn run_capture_loop(
    source: &dyn Capture,
    sink: &mut dyn VideoSink,
    stop_flag: &AtomicBool,
    pacing: Pacing,
    frames: &AtomicU64,
) -> Result<(), RecordError> {
    let interval = Duration::from_secs_f64(1.0 / pacing.fps as f64);
    let start = Instant::now();
    let mut next_deadline = start;
    let mut repeated: u64 = 0;

    while !stop_flag.load(Ordering::SeqCst) {
        if let Some(max) = pacing.max_duration {
            if start.elapsed() >= max {
                tracing::info!("Maximum duration of {:?} reached", max);
                break;
            }
        }

        let image = source
            .capture()
            .map_err(|e| RecordError::FrameCapture(e.to_string()))?;
        let frame = Frame::from_rgba(&image, pacing.width, pacing.height);

        sink.write_frame(&frame)?;
        frames.fetch_add(1, Ordering::Relaxed);
        next_deadline += interval;

        let mut now = Instant::now();
        while now >= next_deadline + interval {
            sink.write_frame(&frame)?;
            frames.fetch_add(1, Ordering::Relaxed);
            next_deadline += interval;
            repeated += 1;
            now = Instant::now();
        }

        if next_deadline > now {
            thread::sleep(next_deadline - now);
        }
    }

    if repeated > 0 {
        tracing::debug!("Repeated {} frames to keep pace", repeated);
    }
    Ok(())
}

/// Closes the encoder and, for audio sessions, merges the tracks into the
/// final file. Intermediates are removed only after a successful merge.
fn finalize(
    sink: Box<dyn VideoSink>,
    audio: Option<Box<dyn AudioRecorder>>,
    backend: &dyn MediaBackend,
    plan: &OutputPlan,
) -> Result<PathBuf, RecordError> {
    let video = sink.finish();

    let Some((_, wav_path)) = &plan.intermediates else {
        return video;
    };

    let audio_summary = audio.map(|recorder| recorder.finish());
    let video = video?;

    let audio_track: Option<&Path> = match &audio_summary {
        Some(Ok(summary)) if !summary.is_empty() => {
            tracing::info!(
                "Captured {:.2}s of audio ({} batches dropped, {} frames of silence)",
                summary.duration_secs(),
                summary.dropped_batches,
                summary.silence_frames
            );
            Some(summary.wav_path.as_path())
        }
        Some(Ok(_)) => {
            tracing::warn!("No audio samples were captured; saving video only");
            None
        }
        Some(Err(e)) => {
            tracing::warn!("Audio capture failed, saving video only: {}", e);
            None
        }
        None => None,
    };

    let merged = backend.merge(&video, audio_track, &plan.output)?;
    remove_intermediates(&[video.as_path(), wav_path.as_path()]);
    Ok(merged)
}
