//! The exam session state machine
//!
//! `ExamSession` owns the phase, the position, the countdown and the recording
//! map. Every trigger is a method call: user controls (`start`, `jump`,
//! `start_now`, `stop_recording`, `finish_early`, `restart`), media completion
//! messages (`media_ended`, `media_failed`), content generation
//! (`content_ready`) and the 1-second `tick`. Nothing here blocks or awaits
//! except microphone acquisition.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::SessionConfig;
use super::phase::{Phase, Position};
use super::player::{MediaPlayer, PlaybackId, PlaybackKind, PlaybackRequest};
use super::timer::{Countdown, CountdownState, TimerKind};
use crate::audio::{AudioArtifact, CaptureError, SegmentRecorder};
use crate::content::{Question, Section};

/// Recorded answers keyed by question id
pub type RecordingMap = HashMap<String, Arc<AudioArtifact>>;

/// Rejected session commands
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no exam content loaded")]
    NoContent,
    #[error("microphone unavailable: {0}")]
    MicrophoneUnavailable(String),
    #[error("exam already started")]
    AlreadyStarted,
    #[error("exam has not started")]
    NotStarted,
    #[error("exam is completed")]
    Completed,
    #[error("section {0} does not exist")]
    SectionOutOfRange(usize),
    #[error("question {question} does not exist in section {section}")]
    QuestionOutOfRange { section: usize, question: usize },
    #[error("unknown section id {0}")]
    UnknownSection(String),
}

/// Result of a jump request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JumpOutcome {
    /// The target question was entered
    Entered,
    /// The target section is still being generated; the jump happens once it is ready
    Deferred,
}

/// Point-in-time view of the session, published to clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub phase: Phase,
    pub position: Position,
    pub media_index: usize,
    pub countdown: Option<CountdownState>,
    pub now_playing: Option<PlaybackRequest>,
    pub awaited_playback: Option<PlaybackId>,
    pub awaiting_content: bool,
    pub pending_jump: Option<Position>,
    pub is_recording: bool,
    /// Question ids with a recording, in exam order
    pub recorded: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

pub struct ExamSession {
    id: Uuid,
    config: SessionConfig,
    sections: Vec<Section>,
    phase: Phase,
    position: Position,
    media_index: usize,
    countdown: Countdown,
    recordings: RecordingMap,
    recorder: Box<dyn SegmentRecorder>,
    player: Box<dyn MediaPlayer>,
    microphone_ready: bool,
    next_playback: u64,
    /// Playback whose end the current phase is waiting for
    awaited: Option<PlaybackId>,
    now_playing: Option<PlaybackRequest>,
    /// The current section's questions are still being generated
    awaiting_content: bool,
    pending_jump: Option<Position>,
}

impl ExamSession {
    pub fn new(
        sections: Vec<Section>,
        config: SessionConfig,
        recorder: Box<dyn SegmentRecorder>,
        player: Box<dyn MediaPlayer>,
    ) -> Self {
        let id = Uuid::new_v4();
        info!("Creating exam session {} ({} sections)", id, sections.len());

        Self {
            id,
            config,
            sections,
            phase: Phase::Idle,
            position: Position::default(),
            media_index: 0,
            countdown: Countdown::new(),
            recordings: HashMap::new(),
            recorder,
            player,
            microphone_ready: false,
            next_playback: 0,
            awaited: None,
            now_playing: None,
            awaiting_content: false,
            pending_jump: None,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn media_index(&self) -> usize {
        self.media_index
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn recordings(&self) -> &RecordingMap {
        &self.recordings
    }

    pub fn now_playing(&self) -> Option<&PlaybackRequest> {
        self.now_playing.as_ref()
    }

    pub fn awaited_playback(&self) -> Option<PlaybackId> {
        self.awaited
    }

    pub fn is_awaiting_content(&self) -> bool {
        self.awaiting_content
    }

    pub fn pending_jump(&self) -> Option<Position> {
        self.pending_jump
    }

    pub fn is_microphone_ready(&self) -> bool {
        self.microphone_ready
    }

    pub fn current_section(&self) -> Option<&Section> {
        self.sections.get(self.position.section_index)
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.current_section()?
            .questions
            .get(self.position.question_index)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let recorded = self
            .sections
            .iter()
            .flat_map(|s| s.questions.iter())
            .filter(|q| self.recordings.contains_key(&q.id))
            .map(|q| q.id.clone())
            .collect();

        SessionSnapshot {
            session_id: self.id,
            phase: self.phase,
            position: self.position,
            media_index: self.media_index,
            countdown: self.countdown.state(),
            now_playing: self.now_playing.clone(),
            awaited_playback: self.awaited,
            awaiting_content: self.awaiting_content,
            pending_jump: self.pending_jump,
            is_recording: self.recorder.is_recording(),
            recorded,
            updated_at: Utc::now(),
        }
    }

    // ------------------------------------------------------------------
    // User controls
    // ------------------------------------------------------------------

    /// Acquire the microphone. Required once before `start`; a restart keeps it.
    pub async fn acquire_microphone(&mut self) -> Result<(), SessionError> {
        if self.microphone_ready {
            return Ok(());
        }

        match self.recorder.acquire().await {
            Ok(()) => {
                self.microphone_ready = true;
                Ok(())
            }
            Err(e) => {
                error!("Microphone acquisition failed: {:#}", e);
                Err(SessionError::MicrophoneUnavailable(format!("{:#}", e)))
            }
        }
    }

    /// Start the exam from the first section
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.phase != Phase::Idle {
            return Err(SessionError::AlreadyStarted);
        }
        if self.sections.is_empty() {
            return Err(SessionError::NoContent);
        }
        if !self.microphone_ready {
            return Err(SessionError::MicrophoneUnavailable(
                "microphone has not been acquired".to_string(),
            ));
        }

        info!("Session {} starting", self.id);
        self.enter_section(0);
        Ok(())
    }

    /// Jump to any question (sidebar navigation)
    pub fn jump(&mut self, section_index: usize, question_index: usize) -> Result<JumpOutcome, SessionError> {
        if self.phase == Phase::Completed {
            return Err(SessionError::Completed);
        }
        // Jumping from IDLE starts the exam, so it needs the microphone like `start`
        if self.phase == Phase::Idle && !self.microphone_ready {
            return Err(SessionError::MicrophoneUnavailable(
                "microphone has not been acquired".to_string(),
            ));
        }

        let section = self
            .sections
            .get(section_index)
            .ok_or(SessionError::SectionOutOfRange(section_index))?;

        if section.is_pending() {
            info!(
                "Jump to {} deferred: content for {} is still being generated",
                Position::new(section_index, question_index),
                section.id
            );
            self.pending_jump = Some(Position::new(section_index, question_index));
            return Ok(JumpOutcome::Deferred);
        }

        if question_index >= section.questions.len() {
            return Err(SessionError::QuestionOutOfRange {
                section: section_index,
                question: question_index,
            });
        }

        info!("Jumping from {} to {}", self.position, Position::new(section_index, question_index));
        self.interrupt();
        self.pending_jump = None;
        self.enter_question(section_index, question_index);

        Ok(JumpOutcome::Entered)
    }

    /// Skip the rest of the preparation time. Returns false outside PREPARATION.
    pub fn start_now(&mut self) -> bool {
        if self.phase != Phase::Preparation {
            debug!("Start-now ignored in {}", self.phase);
            return false;
        }

        self.countdown.cancel();
        self.begin_starting_beep();
        true
    }

    /// Stop recording early. Returns false (and does nothing) outside RECORDING.
    pub fn stop_recording(&mut self) -> bool {
        self.finish_recording()
    }

    /// End the exam immediately (after the user confirmed)
    pub fn finish_early(&mut self) -> Result<(), SessionError> {
        match self.phase {
            Phase::Idle => Err(SessionError::NotStarted),
            Phase::Completed => Err(SessionError::Completed),
            _ => {
                info!("Finishing exam early from {} at {}", self.phase, self.position);
                self.interrupt();
                self.pending_jump = None;
                self.set_phase(Phase::Completed);
                Ok(())
            }
        }
    }

    /// Back to IDLE at (0, 0) with no recordings. The microphone stays acquired.
    pub fn restart(&mut self) {
        info!("Restarting session {}", self.id);

        self.interrupt();
        self.recordings.clear();
        self.position = Position::default();
        self.media_index = 0;
        self.pending_jump = None;
        self.now_playing = None;
        self.set_phase(Phase::Idle);
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// One second elapsed. Returns the countdown that completed, if any.
    pub fn tick(&mut self) -> Option<TimerKind> {
        let fired = self.countdown.tick()?;
        debug!("{:?} countdown reached zero in {}", fired, self.phase);

        match (fired, self.phase) {
            (TimerKind::Preparation, Phase::Preparation) => self.begin_starting_beep(),
            (TimerKind::Answer, Phase::Recording) => {
                self.finish_recording();
            }
            (TimerKind::Finishing, Phase::Finishing) => self.advance(),
            (TimerKind::SectionBreak, Phase::SectionBreak) => {
                let next = self.position.section_index + 1;
                self.enter_section(next);
            }
            (kind, phase) => warn!("Ignoring {:?} countdown completion in {}", kind, phase),
        }

        Some(fired)
    }

    /// The playback `id` finished. Stale ids are ignored; returns whether it was acted on.
    pub fn media_ended(&mut self, id: PlaybackId) -> bool {
        if self.awaited != Some(id) {
            // Cues nobody waits for still stop being advertised
            if self.now_playing.as_ref().is_some_and(|p| p.id == id && !p.awaited) {
                self.now_playing = None;
            }
            debug!("Ignoring stale media end {} (awaiting {:?})", id, self.awaited);
            return false;
        }

        self.awaited = None;
        if self.now_playing.as_ref().is_some_and(|p| p.id == id) {
            self.now_playing = None;
        }
        self.on_playback_finished();
        true
    }

    /// The playback `id` could not be played; treated exactly like it ended
    pub fn media_failed(&mut self, id: PlaybackId) -> bool {
        if self.awaited == Some(id) {
            warn!("Playback {} failed in {}, continuing", id, self.phase);
        }
        self.media_ended(id)
    }

    /// Questions for a lazily generated section arrived.
    ///
    /// A section's questions are filled at most once; later deliveries are ignored.
    pub fn content_ready(&mut self, section_id: &str, questions: Vec<Question>) -> Result<(), SessionError> {
        let index = self
            .sections
            .iter()
            .position(|s| s.id == section_id)
            .ok_or_else(|| SessionError::UnknownSection(section_id.to_string()))?;

        if !self.sections[index].is_pending() {
            warn!("Content for {} already present, ignoring update", section_id);
            return Ok(());
        }
        if questions.is_empty() {
            warn!("Empty content delivered for {}, still waiting", section_id);
            return Ok(());
        }

        info!("Content ready for {} ({} questions)", section_id, questions.len());
        let count = questions.len();
        self.sections[index].questions = questions;

        if self.phase == Phase::Completed {
            return Ok(());
        }

        if let Some(target) = self.pending_jump.filter(|p| p.section_index == index) {
            let question = if target.question_index < count {
                target.question_index
            } else {
                0
            };
            info!("Performing deferred jump to {}", Position::new(index, question));
            self.pending_jump = None;
            self.interrupt();
            self.enter_question(index, question);
            return Ok(());
        }

        if self.awaiting_content && self.phase == Phase::Direction && self.position.section_index == index {
            self.awaiting_content = false;
            self.enter_question(index, 0);
        }

        Ok(())
    }

    /// Generation for a section failed. The session keeps waiting; the user can
    /// jump elsewhere or finish early.
    pub fn content_failed(&mut self, section_id: &str, reason: &str) {
        error!("Content generation for {} failed: {}", section_id, reason);

        let failed_index = self.sections.iter().position(|s| s.id == section_id);
        if failed_index.is_some() && self.pending_jump.map(|p| p.section_index) == failed_index {
            self.pending_jump = None;
        }
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            info!("Phase {} -> {} at {}", self.phase, phase, self.position);
        }
        self.phase = phase;
    }

    /// Cancel the countdown, close any open segment (attached to the question
    /// active right now) and abandon the awaited playback. Must run before any
    /// position change.
    fn interrupt(&mut self) {
        if let Some(kind) = self.countdown.cancel() {
            debug!("Cancelled {:?} countdown", kind);
        }
        self.save_segment();
        if self.awaited.take().is_some() {
            self.player.stop();
            self.now_playing = None;
        }
        self.awaiting_content = false;
    }

    /// Request playback. Returns false when the player rejected it.
    fn play(&mut self, kind: PlaybackKind, url: String, awaited: bool) -> bool {
        self.next_playback += 1;
        let request = PlaybackRequest {
            id: PlaybackId(self.next_playback),
            kind,
            url,
            awaited,
        };

        if awaited {
            self.awaited = Some(request.id);
        }

        let result = self.player.play(&request);
        self.now_playing = Some(request);

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Playback of {:?} rejected: {:#}", kind, e);
                if awaited {
                    self.awaited = None;
                }
                false
            }
        }
    }

    fn enter_section(&mut self, index: usize) {
        self.position = Position::new(index, 0);
        self.media_index = 0;

        match self.sections[index].direction_video_url.clone() {
            Some(url) => {
                self.set_phase(Phase::Direction);
                if !self.play(PlaybackKind::Direction, url, true) {
                    self.on_playback_finished();
                }
            }
            None => self.enter_question(index, 0),
        }
    }

    fn enter_question(&mut self, section_index: usize, question_index: usize) {
        self.position = Position::new(section_index, question_index);
        self.media_index = 0;

        let has_media = match self.current_question() {
            Some(question) => question.has_playable_media(),
            None => {
                info!(
                    "Waiting for content of {} before entering {}",
                    self.sections[section_index].id, self.position
                );
                self.awaiting_content = true;
                self.set_phase(Phase::Direction);
                return;
            }
        };

        self.awaiting_content = false;

        if has_media {
            self.set_phase(Phase::QuestionMedia);
            self.play_question_media();
        } else {
            self.begin_preparation();
        }
    }

    /// Play media at `media_index`, skipping rejected items; preparation
    /// begins once nothing is left to play.
    fn play_question_media(&mut self) {
        loop {
            let url = self
                .current_question()
                .and_then(|q| q.media_at(self.media_index))
                .map(str::to_string);

            match url {
                Some(url) => {
                    if self.play(PlaybackKind::QuestionMedia, url, true) {
                        return;
                    }
                    self.media_index += 1;
                }
                None => {
                    self.begin_preparation();
                    return;
                }
            }
        }
    }

    fn on_playback_finished(&mut self) {
        match self.phase {
            Phase::Direction => {
                let index = self.position.section_index;
                if self.sections[index].is_pending() {
                    info!("Direction finished; waiting for {} content", self.sections[index].id);
                    self.awaiting_content = true;
                } else {
                    self.enter_question(index, 0);
                }
            }
            Phase::QuestionMedia => {
                self.media_index += 1;
                self.play_question_media();
            }
            Phase::StartingBeep => self.begin_recording(),
            phase => debug!("Playback finished in {}, nothing to do", phase),
        }
    }

    fn begin_preparation(&mut self) {
        let prep = self.current_question().map(|q| q.prep_duration).unwrap_or(0);

        if prep > 0 {
            self.set_phase(Phase::Preparation);
            self.countdown.start(TimerKind::Preparation, prep);
        } else {
            self.begin_starting_beep();
        }
    }

    fn begin_starting_beep(&mut self) {
        self.set_phase(Phase::StartingBeep);

        let url = self.config.cues.start.clone();
        if !self.play(PlaybackKind::StartCue, url, true) {
            self.begin_recording();
        }
    }

    fn begin_recording(&mut self) {
        let duration = self.current_question().map(|q| q.answer_duration).unwrap_or(0);

        self.set_phase(Phase::Recording);
        self.countdown.start(TimerKind::Answer, duration);

        match self.recorder.start_segment() {
            Ok(()) => {}
            Err(CaptureError::SegmentOpen) => {
                error!("Recording segment was left open; closing it before recording {}", self.position);
                self.save_segment();
                if let Err(e) = self.recorder.start_segment() {
                    error!("Failed to start recording: {}", e);
                }
            }
            Err(e) => error!("Failed to start recording: {}", e),
        }
    }

    /// RECORDING -> FINISHING. Idempotent: false outside RECORDING.
    fn finish_recording(&mut self) -> bool {
        if self.phase != Phase::Recording {
            debug!("Stop recording ignored in {}", self.phase);
            return false;
        }

        self.countdown.cancel();
        self.save_segment();

        let url = self.config.cues.stop.clone();
        self.play(PlaybackKind::StopCue, url, false);

        self.set_phase(Phase::Finishing);
        self.countdown.start(TimerKind::Finishing, self.config.finishing_secs);
        true
    }

    /// Attach the open segment (if any) to the question active right now
    fn save_segment(&mut self) {
        let Some(artifact) = self.recorder.stop_segment() else {
            return;
        };

        match self.current_question().map(|q| q.id.clone()) {
            Some(question_id) => {
                info!("Saved recording for {} ({} bytes)", question_id, artifact.data.len());
                self.recordings.insert(question_id, Arc::new(artifact));
            }
            None => warn!("Discarding recording with no active question at {}", self.position),
        }
    }

    fn advance(&mut self) {
        let Position {
            section_index,
            question_index,
        } = self.position;
        let question_count = self.sections[section_index].questions.len();

        if question_index + 1 < question_count {
            self.enter_question(section_index, question_index + 1);
        } else if section_index + 1 < self.sections.len() {
            self.set_phase(Phase::SectionBreak);
            self.countdown.start(TimerKind::SectionBreak, self.config.section_break_secs);

            let url = self.config.cues.section_break.clone();
            self.play(PlaybackKind::BreakCue, url, false);
        } else {
            info!("Last question answered, exam completed");
            self.set_phase(Phase::Completed);
        }
    }
}
