//! AI grading of recorded answers
//!
//! - `sections`: per-section grading instructions
//! - `client`: the grading model client (`Grader`, `GeminiGrader`)
//! - `orchestrator`: result bookkeeping, single and batch grading

pub mod client;
pub mod orchestrator;
pub mod sections;

pub use client::{
    filter_models, parse_assessment, Assessment, GeminiGrader, Grader, GradingError, GradingRequest, MediaPart,
    DEFAULT_API_BASE,
};
pub use orchestrator::{GradeError, GradeResult, GradingOrchestrator, CREDENTIAL_FEEDBACK, RETRY_FEEDBACK};
pub use sections::SectionKind;
