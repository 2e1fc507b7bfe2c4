// Microphone capture for spoken answers
//
// The adapter acquires the microphone once per session and keeps the stream
// alive. A pump task drains the backend channel for the whole session;
// frames are kept only while a segment is open. Closing a segment encodes the
// buffered samples as one in-memory WAV artifact.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};

/// Capture failures the session reacts to
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("microphone has not been acquired")]
    NotAcquired,
    #[error("a recording segment is already open")]
    SegmentOpen,
}

/// One recorded answer, encoded as WAV
#[derive(Debug, Clone, Serialize)]
pub struct AudioArtifact {
    #[serde(skip)]
    pub data: Vec<u8>,
    pub mime_type: &'static str,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_count: usize,
    pub recorded_at: DateTime<Utc>,
}

impl AudioArtifact {
    /// Encode PCM samples as a WAV artifact
    pub fn from_samples(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Self> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .context("Failed to create WAV writer")?;
            for &sample in samples {
                writer.write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            writer.finalize()
                .context("Failed to finalize WAV data")?;
        }

        Ok(Self {
            data: cursor.into_inner(),
            mime_type: "audio/wav",
            sample_rate,
            channels,
            sample_count: samples.len(),
            recorded_at: Utc::now(),
        })
    }

    pub fn duration(&self) -> Duration {
        let per_second = self.sample_rate as u64 * self.channels.max(1) as u64;
        if per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.sample_count as u64 * 1000 / per_second)
    }
}

/// Lifecycle of recording segments, as seen by the session state machine
#[async_trait::async_trait]
pub trait SegmentRecorder: Send {
    /// Acquire the microphone once; later calls are no-ops
    async fn acquire(&mut self) -> Result<()>;

    /// Open a segment. Fails if one is already open or capture is unavailable.
    fn start_segment(&mut self) -> Result<(), CaptureError>;

    /// Close the open segment. Returns `None` when no segment is open.
    fn stop_segment(&mut self) -> Option<AudioArtifact>;

    fn is_recording(&self) -> bool;
}

/// Samples accumulated for the open segment
struct SegmentBuffer {
    samples: Vec<i16>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the session's microphone stream and its recording segments
pub struct CaptureAdapter {
    backend: Box<dyn AudioBackend>,
    config: AudioBackendConfig,
    segment: Arc<Mutex<Option<SegmentBuffer>>>,
    pump: Option<JoinHandle<()>>,
}

impl CaptureAdapter {
    pub fn new(backend: Box<dyn AudioBackend>, config: AudioBackendConfig) -> Self {
        Self {
            backend,
            config,
            segment: Arc::new(Mutex::new(None)),
            pump: None,
        }
    }

    pub fn is_acquired(&self) -> bool {
        self.pump.is_some()
    }

    /// Stop the microphone stream (end of process; a restart keeps it)
    pub async fn release(&mut self) -> Result<()> {
        self.stop_segment();

        if let Err(e) = self.backend.stop().await {
            error!("Failed to stop audio backend: {}", e);
        }

        if let Some(pump) = self.pump.take() {
            pump.abort();
        }

        info!("Microphone released");
        Ok(())
    }
}

impl Drop for CaptureAdapter {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

#[async_trait::async_trait]
impl SegmentRecorder for CaptureAdapter {
    /// Acquire the microphone for the rest of the session.
    ///
    /// Calling it again after success is a no-op.
    async fn acquire(&mut self) -> Result<()> {
        if self.is_acquired() {
            return Ok(());
        }

        info!("Acquiring microphone via {}", self.backend.name());

        let mut audio_rx = self
            .backend
            .start()
            .await
            .context("Failed to start microphone capture")?;

        let segment = Arc::clone(&self.segment);
        let sample_rate = self.config.target_sample_rate;
        let channels = self.config.target_channels;

        let pump = tokio::spawn(async move {
            info!("Capture pump started");

            while let Some(frame) = audio_rx.recv().await {
                let mut open = lock(&segment);
                if let Some(buffer) = open.as_mut() {
                    let processed = process_frame(frame, sample_rate, channels);
                    buffer.samples.extend_from_slice(&processed.samples);
                }
            }

            info!("Capture pump stopped");
        });

        self.pump = Some(pump);
        info!("Microphone acquired");

        Ok(())
    }

    fn start_segment(&mut self) -> Result<(), CaptureError> {
        if !self.is_acquired() {
            return Err(CaptureError::NotAcquired);
        }

        let mut open = lock(&self.segment);
        if open.is_some() {
            return Err(CaptureError::SegmentOpen);
        }

        *open = Some(SegmentBuffer {
            samples: Vec::new(),
        });
        info!("Recording segment started");

        Ok(())
    }

    fn stop_segment(&mut self) -> Option<AudioArtifact> {
        let buffer = lock(&self.segment).take()?;

        match AudioArtifact::from_samples(
            &buffer.samples,
            self.config.target_sample_rate,
            self.config.target_channels,
        ) {
            Ok(artifact) => {
                info!(
                    "Recording segment finalized: {} samples ({:.1}s)",
                    artifact.sample_count,
                    artifact.duration().as_secs_f64()
                );
                Some(artifact)
            }
            Err(e) => {
                warn!("Failed to encode recording segment: {:#}", e);
                None
            }
        }
    }

    fn is_recording(&self) -> bool {
        lock(&self.segment).is_some()
    }
}

/// Bring a frame to the target format: downsample, then mix down to mono
pub fn process_frame(frame: AudioFrame, target_sample_rate: u32, target_channels: u16) -> AudioFrame {
    let mut processed = frame;

    if processed.sample_rate != target_sample_rate {
        processed = downsample_frame(processed, target_sample_rate);
    }

    if processed.channels != target_channels && target_channels == 1 {
        processed = stereo_to_mono(processed);
    }

    processed
}

/// Downsample audio frame by decimation
fn downsample_frame(frame: AudioFrame, target_rate: u32) -> AudioFrame {
    if frame.sample_rate == target_rate || target_rate == 0 {
        return frame;
    }

    let ratio = frame.sample_rate / target_rate;
    if ratio <= 1 {
        return frame; // Can't upsample
    }

    // Keep every Nth sample frame so interleaved channels stay aligned
    let channels = frame.channels.max(1) as usize;
    let downsampled: Vec<i16> = frame
        .samples
        .chunks_exact(channels)
        .step_by(ratio as usize)
        .flatten()
        .copied()
        .collect();

    AudioFrame {
        samples: downsampled,
        sample_rate: target_rate,
        channels: frame.channels,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Convert stereo to mono by summing channels
fn stereo_to_mono(frame: AudioFrame) -> AudioFrame {
    if frame.channels != 2 {
        return frame; // Only support stereo -> mono
    }

    let mono_samples = frame
        .samples
        .chunks_exact(2)
        .map(|pair| (pair[0] as i32 + pair[1] as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16)
        .collect();

    AudioFrame {
        samples: mono_samples,
        sample_rate: frame.sample_rate,
        channels: 1,
        timestamp_ms: frame.timestamp_ms,
    }
}
