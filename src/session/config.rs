use serde::{Deserialize, Serialize};

/// Timing and cue configuration for an exam session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds the "Saving" cue stays up after a recording ends
    /// Default: 2 seconds
    pub finishing_secs: u32,

    /// Seconds of rest between two sections
    /// Default: 10 seconds
    pub section_break_secs: u32,

    /// Audio cues played by the browser
    pub cues: CueConfig,
}

/// URLs of the cue sounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CueConfig {
    /// Played before every recording; recording starts when it ends
    pub start: String,

    /// Played when a recording stops
    pub stop: String,

    /// Played when a section break begins
    #[serde(rename = "break")]
    pub section_break: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            finishing_secs: 2,
            section_break_secs: 10,
            cues: CueConfig::default(),
        }
    }
}

impl Default for CueConfig {
    fn default() -> Self {
        Self {
            start: "/assets/template/start.mp3".to_string(),
            stop: "/assets/template/stop.mp3".to_string(),
            section_break: "/assets/template/break.mp3".to_string(),
        }
    }
}

impl CueConfig {
    pub fn urls(&self) -> [&str; 3] {
        [&self.start, &self.stop, &self.section_break]
    }
}
