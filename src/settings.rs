//! Persisted user settings: the grading API key and the selected model

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
        }
    }
}

impl Settings {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Key with all but the last four characters hidden
    pub fn masked_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() <= 4 {
            return "*".repeat(chars.len());
        }
        let visible: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{}", "*".repeat(chars.len() - 4), visible)
    }
}

/// Settings backed by a JSON file. Without a path they live in memory only.
#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    current: RwLock<Settings>,
}

impl SettingsStore {
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            path: None,
            current: RwLock::new(settings),
        }
    }

    /// Load settings from `path`. A missing file yields the defaults.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let settings = match tokio::fs::read_to_string(&path).await {
            Ok(json) => serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse settings file: {:?}", path))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No settings file at {:?}, using defaults", path);
                Settings::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read settings file: {:?}", path))
            }
        };

        Ok(Self {
            path: Some(path),
            current: RwLock::new(settings),
        })
    }

    pub async fn get(&self) -> Settings {
        self.current.read().await.clone()
    }

    /// Replace and persist the settings. An empty key is rejected.
    pub async fn save(&self, settings: Settings) -> Result<()> {
        if !settings.has_api_key() {
            bail!("Please enter a valid API Key");
        }

        let settings = Settings {
            api_key: settings.api_key.trim().to_string(),
            model: if settings.model.trim().is_empty() {
                default_model()
            } else {
                settings.model
            },
        };

        if let Some(path) = &self.path {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create settings directory: {:?}", parent))?;
            }

            let json = serde_json::to_string_pretty(&settings).context("Failed to serialize settings")?;
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("Failed to write settings file: {:?}", path))?;
        } else {
            warn!("Settings are not persisted (no settings path)");
        }

        info!("Settings saved (model: {})", settings.model);
        *self.current.write().await = settings;

        Ok(())
    }
}
