pub mod audio;
pub mod config;
pub mod content;
pub mod grading;
pub mod http;
pub mod report;
pub mod session;
pub mod settings;

pub use audio::{
    AudioArtifact, AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource,
    CaptureAdapter, CaptureError, PushHandle, SegmentRecorder,
};
pub use config::Config;
pub use content::{load_exam, ContentSource, ExamContent, Question, Section};
pub use grading::{GeminiGrader, GradeError, GradeResult, Grader, GradingOrchestrator};
pub use http::{create_router, AppState};
pub use report::ExamReport;
pub use session::{ExamHandle, ExamRunner, ExamSession, Phase, SessionConfig, SessionError};
pub use settings::{Settings, SettingsStore};
