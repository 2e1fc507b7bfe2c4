pub mod backend;
pub mod capture;
pub mod file;
pub mod push;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource};
pub use capture::{AudioArtifact, CaptureAdapter, CaptureError, SegmentRecorder};
pub use file::{AudioFile, FileBackend};
pub use push::{MicrophoneAccess, PushBackend, PushHandle};
