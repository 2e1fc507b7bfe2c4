// Push-based microphone backend
//
// The browser owns the physical microphone. It reports the outcome of its
// permission prompt and then uploads PCM frames, which this backend forwards
// into the capture pipeline.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use super::capture::CaptureError;

/// State of the microphone permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MicrophoneAccess {
    Pending,
    Granted,
    Denied,
}

#[derive(Debug)]
struct Shared {
    access: Mutex<MicrophoneAccess>,
    sender: Mutex<Option<mpsc::Sender<AudioFrame>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Producer side of a [`PushBackend`]
///
/// The handle outlives individual backends: a backend built for a newly
/// loaded exam keeps the permission already reported by the browser.
#[derive(Debug, Clone)]
pub struct PushHandle {
    shared: Arc<Shared>,
}

impl Default for PushHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PushHandle {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                access: Mutex::new(MicrophoneAccess::Pending),
                sender: Mutex::new(None),
            }),
        }
    }

    /// Record the browser's permission decision
    pub fn set_access(&self, granted: bool) {
        let access = if granted {
            MicrophoneAccess::Granted
        } else {
            MicrophoneAccess::Denied
        };
        info!("Microphone access reported: {:?}", access);
        *lock(&self.shared.access) = access;
    }

    pub fn access(&self) -> MicrophoneAccess {
        *lock(&self.shared.access)
    }

    /// Whether a backend is currently accepting frames
    pub fn is_capturing(&self) -> bool {
        lock(&self.shared.sender).is_some()
    }

    /// Forward one frame into the capture pipeline
    pub async fn push(&self, frame: AudioFrame) -> Result<()> {
        let sender = lock(&self.shared.sender).clone();

        match sender {
            Some(tx) => {
                tx.send(frame)
                    .await
                    .map_err(|_| anyhow::anyhow!("Capture pipeline closed"))?;
                Ok(())
            }
            None => {
                debug!("Dropping frame: microphone not capturing");
                anyhow::bail!("Microphone is not capturing")
            }
        }
    }
}

/// Backend fed by a [`PushHandle`]
pub struct PushBackend {
    shared: Arc<Shared>,
    config: AudioBackendConfig,
    capturing: bool,
}

impl PushBackend {
    pub fn new(handle: PushHandle, config: AudioBackendConfig) -> Self {
        Self {
            shared: handle.shared,
            config,
            capturing: false,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for PushBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let access = *lock(&self.shared.access);
        if access != MicrophoneAccess::Granted {
            warn!("Microphone start refused: access is {:?}", access);
            return Err(CaptureError::PermissionDenied.into());
        }

        // Ten seconds of buffering before the uploader feels backpressure
        let capacity = (10_000 / self.config.buffer_duration_ms.max(1)).max(16) as usize;
        let (tx, rx) = mpsc::channel(capacity);
        *lock(&self.shared.sender) = Some(tx);
        self.capturing = true;

        info!("Push microphone started (buffer {} frames)", capacity);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        lock(&self.shared.sender).take();
        self.capturing = false;
        info!("Push microphone stopped");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "browser-push"
    }
}
