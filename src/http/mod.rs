//! HTTP API driving the exam from the browser
//!
//! This module provides a REST API for the exam front-end:
//! - GET /exams, POST /exams/:id/load - Pick and load a practice exam
//! - GET /session - Current phase, countdown and pending playback
//! - POST /session/{start,start-now,stop-recording,jump,finish,restart} - Controls
//! - POST /session/media/:id/{ended,failed} - Playback completion
//! - POST /microphone, /microphone/frames - Browser microphone
//! - POST /grading, /grading/:id, GET /grading - AI grading
//! - GET|PUT /settings, GET /report - Settings and the score report
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::{AppState, LoadedExam};
