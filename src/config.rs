use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::audio::AudioBackendConfig;
use crate::grading::DEFAULT_API_BASE;
use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub content: ContentConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub grading: GradingConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct ContentConfig {
    /// Directory holding `<exam_id>/<part>/content2.json` bundles and `template/` cues
    pub root: String,
    /// Optional directory with the browser front-end
    #[serde(default)]
    pub static_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_ms: u64,
    /// WAV file replayed as the microphone instead of browser capture
    pub simulated_input: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            buffer_ms: 100,
            simulated_input: None,
        }
    }
}

impl AudioConfig {
    pub fn backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: self.sample_rate,
            target_channels: self.channels,
            buffer_duration_ms: self.buffer_ms,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GradingConfig {
    pub api_base: String,
    /// Delay between two calls of a batch
    pub pacing_ms: u64,
    pub settings_path: String,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            pacing_ms: 1000,
            settings_path: "data/settings.json".to_string(),
        }
    }
}

impl GradingConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("ORAL_EXAM").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
