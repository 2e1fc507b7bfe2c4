use anyhow::{Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        Ok(Self::from_samples(path.display().to_string(), spec.sample_rate, spec.channels, samples))
    }

    /// Decode an in-memory WAV (e.g. a recorded answer)
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self> {
        let reader = WavReader::new(std::io::Cursor::new(bytes))
            .context("Failed to parse WAV data")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        Ok(Self::from_samples("<memory>".to_string(), spec.sample_rate, spec.channels, samples))
    }

    fn from_samples(path: String, sample_rate: u32, channels: u16, samples: Vec<i16>) -> Self {
        let duration_seconds = samples.len() as f64 /
            (sample_rate as f64 * channels.max(1) as f64);

        info!(
            "Audio loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            sample_rate,
            channels,
            samples.len()
        );

        Self {
            path,
            duration_seconds,
            sample_rate,
            channels,
            samples,
        }
    }
}

/// Simulated microphone: replays a WAV file in real time, looping forever
pub struct FileBackend {
    path: PathBuf,
    config: AudioBackendConfig,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>, config: AudioBackendConfig) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            anyhow::bail!("Simulated microphone file not found: {}", path.display());
        }

        Ok(Self {
            path,
            config,
            task: None,
        })
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let audio = AudioFile::open(&self.path)?;
        if audio.samples.is_empty() {
            anyhow::bail!("Simulated microphone file is empty: {}", self.path.display());
        }

        let frame_ms = self.config.buffer_duration_ms.max(10);
        let per_frame = (audio.sample_rate as u64 * audio.channels as u64 * frame_ms / 1000).max(1) as usize;
        let (tx, rx) = mpsc::channel(100);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(frame_ms));
            let mut timestamp_ms = 0u64;

            for chunk in audio.samples.chunks(per_frame).cycle() {
                ticker.tick().await;

                let frame = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate: audio.sample_rate,
                    channels: audio.channels,
                    timestamp_ms,
                };

                if tx.send(frame).await.is_err() {
                    break;
                }
                timestamp_ms += frame_ms;
            }

            info!("File microphone replay stopped");
        });

        self.task = Some(task);
        info!("File microphone started: {}", self.path.display());

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("File microphone task failed: {}", e);
                }
            }
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "file-replay"
    }
}
