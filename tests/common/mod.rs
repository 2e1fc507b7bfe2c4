// Shared fakes for integration tests: a scripted recorder and media player,
// plus builders for small exams.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use oral_exam::audio::{AudioArtifact, CaptureError, SegmentRecorder};
use oral_exam::content::{AnswerType, MediaType, Question, Section};
use oral_exam::session::{MediaPlayer, PlaybackKind, PlaybackRequest};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct RecorderLog {
    pub acquired: usize,
    pub open: bool,
    pub started: usize,
    pub finalized: usize,
}

/// Recorder that produces a short silent artifact per segment
#[derive(Clone, Default)]
pub struct FakeRecorder {
    pub log: Arc<Mutex<RecorderLog>>,
    pub deny: bool,
}

impl FakeRecorder {
    pub fn denied() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    pub fn finalized(&self) -> usize {
        self.log.lock().unwrap().finalized
    }

    pub fn acquired(&self) -> usize {
        self.log.lock().unwrap().acquired
    }
}

#[async_trait]
impl SegmentRecorder for FakeRecorder {
    async fn acquire(&mut self) -> Result<()> {
        if self.deny {
            return Err(CaptureError::PermissionDenied.into());
        }
        self.log.lock().unwrap().acquired += 1;
        Ok(())
    }

    fn start_segment(&mut self) -> Result<(), CaptureError> {
        let mut log = self.log.lock().unwrap();
        if log.open {
            return Err(CaptureError::SegmentOpen);
        }
        log.open = true;
        log.started += 1;
        Ok(())
    }

    fn stop_segment(&mut self) -> Option<AudioArtifact> {
        let mut log = self.log.lock().unwrap();
        if !log.open {
            return None;
        }
        log.open = false;
        log.finalized += 1;
        AudioArtifact::from_samples(&[0i16; 1600], 16000, 1).ok()
    }

    fn is_recording(&self) -> bool {
        self.log.lock().unwrap().open
    }
}

/// Player that logs requests and rejects the kinds it was told to
#[derive(Clone, Default)]
pub struct FakePlayer {
    pub played: Arc<Mutex<Vec<PlaybackRequest>>>,
    pub reject: Vec<PlaybackKind>,
}

impl FakePlayer {
    /// Rejects everything, as if no audio output were available
    pub fn silent() -> Self {
        Self {
            played: Arc::default(),
            reject: vec![
                PlaybackKind::Direction,
                PlaybackKind::QuestionMedia,
                PlaybackKind::StartCue,
                PlaybackKind::StopCue,
                PlaybackKind::BreakCue,
            ],
        }
    }

    pub fn rejecting(kinds: &[PlaybackKind]) -> Self {
        Self {
            played: Arc::default(),
            reject: kinds.to_vec(),
        }
    }

    pub fn requests(&self) -> Vec<PlaybackRequest> {
        self.played.lock().unwrap().clone()
    }

    pub fn last(&self) -> PlaybackRequest {
        self.played.lock().unwrap().last().cloned().expect("nothing played")
    }
}

impl MediaPlayer for FakePlayer {
    fn play(&mut self, request: &PlaybackRequest) -> Result<()> {
        self.played.lock().unwrap().push(request.clone());
        if self.reject.contains(&request.kind) {
            anyhow::bail!("playback of {:?} rejected", request.kind);
        }
        Ok(())
    }
}

pub fn question(id: &str, prep: u32, answer: u32) -> Question {
    Question {
        id: id.to_string(),
        label: id.to_string(),
        prompt_text: format!("Prompt for {}", id),
        media_urls: vec![],
        media_type: MediaType::None,
        prep_duration: prep,
        answer_duration: answer,
        answer_type: AnswerType::Text,
        answer_content: String::new(),
        grading_context: None,
    }
}

pub fn audio_question(id: &str, prep: u32, answer: u32, urls: &[&str]) -> Question {
    Question {
        media_urls: urls.iter().map(|u| u.to_string()).collect(),
        media_type: MediaType::Audio,
        ..question(id, prep, answer)
    }
}

pub fn section(id: &str, direction: Option<&str>, questions: Vec<Question>) -> Section {
    Section {
        id: id.to_string(),
        title: id.to_string(),
        description: String::new(),
        direction_video_url: direction.map(str::to_string),
        questions,
    }
}

pub fn artifact() -> Arc<AudioArtifact> {
    Arc::new(AudioArtifact::from_samples(&[0i16; 1600], 16000, 1).unwrap())
}
