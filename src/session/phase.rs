use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of the exam session. Exactly one holds at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Content loaded (or not), exam not started
    Idle,
    /// Section direction video playing, or waiting for the section's content
    Direction,
    /// Question prompt media playing
    QuestionMedia,
    /// Countdown before recording
    Preparation,
    /// Start cue playing; recording begins when it ends
    StartingBeep,
    /// Answer being recorded
    Recording,
    /// Short "Saving" pause after a recording
    Finishing,
    /// Rest between sections
    SectionBreak,
    /// Exam finished (all sections done or ended early)
    Completed,
}

impl Phase {
    /// Phases between start and completion
    pub fn is_active(self) -> bool {
        !matches!(self, Phase::Idle | Phase::Completed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "IDLE",
            Phase::Direction => "DIRECTION",
            Phase::QuestionMedia => "QUESTION_MEDIA",
            Phase::Preparation => "PREPARATION",
            Phase::StartingBeep => "STARTING_BEEP",
            Phase::Recording => "RECORDING",
            Phase::Finishing => "FINISHING",
            Phase::SectionBreak => "SECTION_BREAK",
            Phase::Completed => "COMPLETED",
        };
        f.write_str(name)
    }
}

/// Current (section, question) pointer into the exam
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub section_index: usize,
    pub question_index: usize,
}

impl Position {
    pub fn new(section_index: usize, question_index: usize) -> Self {
        Self {
            section_index,
            question_index,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.section_index, self.question_index)
    }
}
