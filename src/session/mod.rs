//! Exam session management
//!
//! This module provides the `ExamSession` state machine that manages:
//! - Phase transitions from the first direction video to completion
//! - The single active countdown (preparation, answer, saving, section break)
//! - Recording segments and the per-question recording map
//! - Media playback requests and their completion messages
//! - The background runner that drives a session from a tokio task

mod config;
mod machine;
mod phase;
mod player;
mod runner;
mod timer;

pub use config::{CueConfig, SessionConfig};
pub use machine::{ExamSession, JumpOutcome, RecordingMap, SessionError, SessionSnapshot};
pub use phase::{Phase, Position};
pub use player::{MediaPlayer, PlaybackId, PlaybackKind, PlaybackRequest, RemotePlayer};
pub use runner::{CommandOutcome, ExamHandle, ExamRunner, RunnerError, SessionCommand};
pub use timer::{Countdown, CountdownState, TimerKind};
