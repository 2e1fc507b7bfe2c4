//! Client for the external grading model
//!
//! `GeminiGrader` calls the Generative Language REST API with the grading
//! instructions, the recorded answer and an optional picture, and asks for a
//! structured `{score, feedback}` reply.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Inline binary attachment
#[derive(Debug, Clone)]
pub struct MediaPart {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// One grading call
#[derive(Debug, Clone)]
pub struct GradingRequest {
    pub model: String,
    pub api_key: String,
    pub instructions: String,
    pub audio: MediaPart,
    pub image: Option<MediaPart>,
}

/// Structured reply of the grading model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub score: f64,
    pub feedback: String,
}

#[derive(Error, Debug)]
pub enum GradingError {
    #[error("no API key configured")]
    MissingCredential,
    #[error("grading request rejected with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("grading service failed with HTTP {status}: {message}")]
    Server { status: u16, message: String },
    #[error("grading request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid grading response: {0}")]
    InvalidResponse(String),
}

impl GradingError {
    /// Rejections (HTTP 4xx) mean a bad key or an exhausted quota
    pub fn is_credential_error(&self) -> bool {
        matches!(self, Self::MissingCredential | Self::Rejected { .. })
    }

    fn from_status(status: StatusCode, message: String) -> Self {
        if status.is_client_error() {
            Self::Rejected {
                status: status.as_u16(),
                message,
            }
        } else {
            Self::Server {
                status: status.as_u16(),
                message,
            }
        }
    }
}

/// The grading collaborator
#[async_trait]
pub trait Grader: Send + Sync {
    async fn grade(&self, request: GradingRequest) -> Result<Assessment, GradingError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    #[serde(rename_all = "camelCase")]
    Inline {
        inline_data: InlineData<'a>,
    },
}

impl<'a> Part<'a> {
    fn inline(media: &'a MediaPart) -> Self {
        Part::Inline {
            inline_data: InlineData {
                mime_type: &media.mime_type,
                data: STANDARD.encode(&media.data),
            },
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    name: String,
}

#[derive(Clone)]
pub struct GeminiGrader {
    client: Client,
    api_base: String,
}

impl GeminiGrader {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Models usable for grading, without the `models/` prefix
    pub async fn list_models(&self, api_key: &str) -> Result<Vec<String>, GradingError> {
        if api_key.is_empty() {
            return Err(GradingError::MissingCredential);
        }

        let response = self
            .client
            .get(format!("{}/models", self.api_base))
            .query(&[("key", api_key)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!("Model listing failed: HTTP {}", status);
            return Err(GradingError::from_status(status, message));
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| GradingError::InvalidResponse(e.to_string()))?;

        Ok(filter_models(list.models.into_iter().map(|m| m.name)))
    }
}

/// Strip the `models/` prefix and keep only the Gemini family
pub fn filter_models(names: impl IntoIterator<Item = String>) -> Vec<String> {
    names
        .into_iter()
        .map(|name| name.trim_start_matches("models/").to_string())
        .filter(|name| name.contains("gemini") || name.contains("flash") || name.contains("pro"))
        .collect()
}

/// Parse the model's JSON text into an assessment
pub fn parse_assessment(text: &str) -> Result<Assessment, GradingError> {
    serde_json::from_str(text.trim()).map_err(|e| GradingError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl Grader for GeminiGrader {
    async fn grade(&self, request: GradingRequest) -> Result<Assessment, GradingError> {
        if request.api_key.is_empty() {
            return Err(GradingError::MissingCredential);
        }

        let mut parts = Vec::with_capacity(3);
        if let Some(image) = &request.image {
            parts.push(Part::inline(image));
        }
        parts.push(Part::Text {
            text: &request.instructions,
        });
        parts.push(Part::inline(&request.audio));

        let body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "score": { "type": "NUMBER" },
                        "feedback": { "type": "STRING" }
                    }
                }
            }
        });

        info!(
            "Sending grading request to {} ({} bytes audio, image: {})",
            request.model,
            request.audio.data.len(),
            request.image.is_some()
        );

        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.api_base, request.model))
            .query(&[("key", request.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!("Grading API error: HTTP {}", status);
            return Err(GradingError::from_status(status, message));
        }

        let reply: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GradingError::InvalidResponse(e.to_string()))?;

        let text: String = reply
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect();

        if text.is_empty() {
            return Err(GradingError::InvalidResponse("no response text".to_string()));
        }

        debug!("Grading response: {}", text);
        parse_assessment(&text)
    }
}
