use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use hound::{SampleFormat, WavSpec, WavWriter};

use super::error::RecordError;

#[derive(Debug, Clone)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub channels: u16,
    /// Number of callback batches the queue holds before new ones are dropped.
    pub queue_capacity: usize,
    pub wav_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSummary {
    pub wav_path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    /// Sample frames (one sample per channel) written to the file.
    pub frames: u64,
    pub dropped_batches: u64,
    /// Sample frames of silence written in place of dropped batches.
    pub silence_frames: u64,
}

impl AudioSummary {
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }
}

/// A running microphone capture. Finishing it stops the device and closes
/// the WAV file.
pub trait AudioRecorder: Send {
    fn finish(self: Box<Self>) -> Result<AudioSummary, RecordError>;
}

/// Interleaved samples from one device callback, preceded by `gap` samples
/// that were dropped since the previous batch got through.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub gap: u64,
    pub samples: Vec<f32>,
}

/// Batches moving from the device callback to the WAV writer. The queue is
/// bounded; a full queue drops the newest batch rather than blocking the
/// audio thread, and the dropped length travels with the next batch so the
/// writer can fill it with silence.
#[derive(Clone)]
pub struct BatchQueue {
    tx: Sender<Batch>,
    dropped: Arc<AtomicU64>,
    pending_gap: Arc<AtomicU64>,
}

impl BatchQueue {
    pub fn new(capacity: usize) -> (Self, Receiver<Batch>) {
        let (tx, rx) = bounded(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
                pending_gap: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    pub fn push(&self, samples: Vec<f32>) {
        let gap = self.pending_gap.swap(0, Ordering::AcqRel);
        match self.tx.try_send(Batch { gap, samples }) {
            Ok(()) => {}
            Err(TrySendError::Full(batch)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                self.pending_gap
                    .fetch_add(batch.gap + batch.samples.len() as u64, Ordering::AcqRel);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Takes the length of batches dropped after the last one that got through.
    pub fn take_pending_gap(&self) -> u64 {
        self.pending_gap.swap(0, Ordering::AcqRel)
    }
}

/// Streams queued batches into a 32-bit float WAV file.
pub struct WavSink {
    writer: WavWriter<std::io::BufWriter<std::fs::File>>,
    path: PathBuf,
    sample_rate: u32,
    channels: u16,
    samples: u64,
    silence: u64,
}

impl WavSink {
    pub fn create(path: &Path, sample_rate: u32, channels: u16) -> Result<Self, RecordError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = WavWriter::create(path, spec)?;
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            sample_rate,
            channels,
            samples: 0,
            silence: 0,
        })
    }

    pub fn write_batch(&mut self, batch: &[f32]) -> Result<(), RecordError> {
        for &sample in batch {
            self.writer.write_sample(sample)?;
        }
        self.samples += batch.len() as u64;
        Ok(())
    }

    /// Writes `count` zero samples.
    pub fn write_silence(&mut self, count: u64) -> Result<(), RecordError> {
        for _ in 0..count {
            self.writer.write_sample(0.0f32)?;
        }
        self.samples += count;
        self.silence += count;
        Ok(())
    }

    pub fn write(&mut self, batch: &Batch) -> Result<(), RecordError> {
        self.write_silence(batch.gap)?;
        self.write_batch(&batch.samples)
    }

    pub fn finalize(self, dropped_batches: u64) -> Result<AudioSummary, RecordError> {
        self.writer.finalize()?;
        let channels = self.channels.max(1) as u64;
        Ok(AudioSummary {
            wav_path: self.path,
            sample_rate: self.sample_rate,
            channels: self.channels,
            frames: self.samples / channels,
            dropped_batches,
            silence_frames: self.silence / channels,
        })
    }
}

/// Microphone capture through cpal.
///
/// `cpal::Stream` is not `Send`, so the stream lives on a dedicated thread
/// that also drains the queue into the WAV file until told to stop.
pub struct MicCapture {
    stop_tx: Sender<()>,
    handle: JoinHandle<Result<AudioSummary, RecordError>>,
}

impl MicCapture {
    pub fn start(settings: &AudioSettings) -> Result<Self, RecordError> {
        let (ready_tx, ready_rx) = bounded::<Result<(), RecordError>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let settings = settings.clone();

        let handle = thread::Builder::new()
            .name("recscr-audio".to_string())
            .spawn(move || run_audio_thread(settings, ready_tx, stop_rx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { stop_tx, handle }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(RecordError::Audio("audio thread exited during startup".to_string()))
            }
        }
    }
}

impl AudioRecorder for MicCapture {
    fn finish(self: Box<Self>) -> Result<AudioSummary, RecordError> {
        let _ = self.stop_tx.send(());
        self.handle
            .join()
            .map_err(|_| RecordError::Audio("audio thread panicked".to_string()))?
    }
}

fn run_audio_thread(
    settings: AudioSettings,
    ready_tx: Sender<Result<(), RecordError>>,
    stop_rx: Receiver<()>,
) -> Result<AudioSummary, RecordError> {
    let (queue, batches) = BatchQueue::new(settings.queue_capacity);

    let (stream, sample_rate, channels) = match open_input_stream(&settings, queue.clone()) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready_tx.send(Err(e.clone()));
            return Err(e);
        }
    };

    let mut sink = match WavSink::create(&settings.wav_path, sample_rate, channels) {
        Ok(sink) => sink,
        Err(e) => {
            let _ = ready_tx.send(Err(e.clone()));
            return Err(e);
        }
    };

    if let Err(e) = stream.play() {
        let err = RecordError::Audio(e.to_string());
        let _ = ready_tx.send(Err(err.clone()));
        return Err(err);
    }
    let _ = ready_tx.send(Ok(()));

    tracing::info!("Microphone capture started: {} Hz, {} channels", sample_rate, channels);

    let mut write_error = None;
    loop {
        select! {
            recv(batches) -> batch => match batch {
                Ok(batch) => {
                    if write_error.is_none() {
                        if let Err(e) = sink.write(&batch) {
                            tracing::error!("Failed to write audio: {}", e);
                            write_error = Some(e);
                        }
                    }
                }
                Err(_) => break,
            },
            recv(stop_rx) -> _ => break,
        }
    }

    drop(stream);
    for batch in batches.try_iter() {
        if write_error.is_none() {
            if let Err(e) = sink.write(&batch) {
                write_error = Some(e);
            }
        }
    }
    if write_error.is_none() {
        if let Err(e) = sink.write_silence(queue.take_pending_gap()) {
            write_error = Some(e);
        }
    }

    if let Some(e) = write_error {
        return Err(e);
    }

    let dropped = queue.dropped();
    if dropped > 0 {
        tracing::warn!(
            "Dropped {} audio batches because the queue was full; filled with silence",
            dropped
        );
    }
    sink.finalize(dropped)
}

fn open_input_stream(
    settings: &AudioSettings,
    queue: BatchQueue,
) -> Result<(cpal::Stream, u32, u16), RecordError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| RecordError::Audio("no input device available".to_string()))?;

    tracing::info!(
        "Microphone device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let default_config = device
        .default_input_config()
        .map_err(|e| RecordError::Audio(e.to_string()))?;
    let sample_format = default_config.sample_format();

    let requested = cpal::StreamConfig {
        channels: settings.channels,
        sample_rate: cpal::SampleRate(settings.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    match build_stream(&device, &requested, sample_format, queue.clone()) {
        Ok(stream) => Ok((stream, settings.sample_rate, settings.channels)),
        Err(e) => {
            tracing::warn!(
                "Requested {} Hz / {} channels unsupported ({}), using device default",
                settings.sample_rate,
                settings.channels,
                e
            );
            let config: cpal::StreamConfig = default_config.into();
            let stream = build_stream(&device, &config, sample_format, queue)?;
            Ok((stream, config.sample_rate.0, config.channels))
        }
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    format: cpal::SampleFormat,
    queue: BatchQueue,
) -> Result<cpal::Stream, RecordError> {
    match format {
        cpal::SampleFormat::F32 => build_typed_stream::<f32>(device, config, queue),
        cpal::SampleFormat::I16 => build_typed_stream::<i16>(device, config, queue),
        cpal::SampleFormat::U16 => build_typed_stream::<u16>(device, config, queue),
        cpal::SampleFormat::I32 => build_typed_stream::<i32>(device, config, queue),
        other => Err(RecordError::Audio(format!("unsupported sample format {:?}", other))),
    }
}

fn build_typed_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: BatchQueue,
) -> Result<cpal::Stream, RecordError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let err_fn = |err| tracing::error!("Microphone stream error: {}", err);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                queue.push(data.iter().map(|&s| s.to_sample::<f32>()).collect());
            },
            err_fn,
            None,
        )
        .map_err(|e| RecordError::Audio(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_drops_when_full() {
        let (queue, rx) = BatchQueue::new(2);
        queue.push(vec![0.0; 4]);
        queue.push(vec![0.0; 4]);
        queue.push(vec![0.0; 4]);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn test_dropped_batch_becomes_gap_on_next() {
        let (queue, rx) = BatchQueue::new(1);
        queue.push(vec![0.5; 4]);
        queue.push(vec![0.5; 6]);
        queue.push(vec![0.5; 8]);
        assert_eq!(queue.dropped(), 2);

        assert_eq!(rx.try_recv().unwrap().gap, 0);
        queue.push(vec![0.25; 2]);
        let next = rx.try_recv().unwrap();
        assert_eq!(next.gap, 14);
        assert_eq!(next.samples, vec![0.25; 2]);
        assert_eq!(queue.take_pending_gap(), 0);
    }

    #[test]
    fn test_gap_keeps_wav_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp_audio.wav");
        let mut sink = WavSink::create(&path, 8000, 2).unwrap();
        sink.write(&Batch {
            gap: 0,
            samples: vec![0.5; 4],
        })
        .unwrap();
        sink.write(&Batch {
            gap: 6,
            samples: vec![0.5; 4],
        })
        .unwrap();
        let summary = sink.finalize(1).unwrap();
        assert_eq!(summary.frames, 7);
        assert_eq!(summary.silence_frames, 3);

        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 14);
        assert!(samples[4..10].iter().all(|&s| s == 0.0));
        assert_eq!(samples[10], 0.5);
    }

    #[test]
    fn test_queue_after_consumer_gone() {
        let (queue, rx) = BatchQueue::new(1);
        drop(rx);
        queue.push(vec![1.0]);
        assert_eq!(queue.dropped(), 0);
    }

    #[test]
    fn test_wav_sink_counts_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp_audio.wav");
        let mut sink = WavSink::create(&path, 44100, 2).unwrap();
        sink.write_batch(&[0.1; 882]).unwrap();
        sink.write_batch(&[0.2; 882]).unwrap();
        let summary = sink.finalize(3).unwrap();

        assert_eq!(summary.frames, 882);
        assert_eq!(summary.dropped_batches, 3);
        assert!((summary.duration_secs() - 0.02).abs() < 1e-9);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 44100);
        assert_eq!(reader.len(), 1764);
    }

    #[test]
    fn test_empty_summary() {
        let summary = AudioSummary {
            wav_path: PathBuf::from("a.wav"),
            sample_rate: 0,
            channels: 2,
            frames: 0,
            dropped_batches: 0,
            silence_frames: 0,
        };
        assert!(summary.is_empty());
        assert_eq!(summary.duration_secs(), 0.0);
    }
}
