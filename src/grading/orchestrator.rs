//! Grading orchestration
//!
//! Holds the per-question grading results and turns "grade this answer" into
//! a call to the grading model: credential check, section instructions, media
//! attachments, and mapping failures to the feedback shown to the student.

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::client::{Grader, GradingRequest, MediaPart};
use super::sections::SectionKind;
use crate::audio::AudioArtifact;
use crate::content::{ContentSource, Question, Section};
use crate::report::max_score;
use crate::session::RecordingMap;
use crate::settings::SettingsStore;

pub const CREDENTIAL_FEEDBACK: &str = "API Key Error or Quota Exceeded";
pub const RETRY_FEEDBACK: &str = "评分失败，请稍后重试";

/// Grading state of one question
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeResult {
    pub score: f64,
    pub feedback: String,
    /// A grading call for this question is in flight
    pub loading: bool,
}

impl GradeResult {
    fn pending() -> Self {
        Self {
            score: 0.0,
            feedback: String::new(),
            loading: true,
        }
    }
}

/// Requests the orchestrator refuses before calling the grader
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GradeError {
    #[error("an API key is required for grading")]
    NeedsCredential,
    #[error("question {0} has no recording")]
    NoRecording(String),
    #[error("question {0} is already being graded")]
    InFlight(String),
    #[error("section {0} cannot be graded")]
    UnknownSection(String),
    #[error("batch grading is already running")]
    BatchRunning,
    #[error("grading results for {0} were cleared while it was being graded")]
    Cleared(String),
}

/// Clears the batch flag however the batch ends
struct BatchGuard<'a>(&'a AtomicBool);

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct GradingOrchestrator {
    grader: Arc<dyn Grader>,
    settings: Arc<SettingsStore>,
    content: Option<ContentSource>,
    http: reqwest::Client,
    pacing: Duration,
    results: RwLock<HashMap<String, GradeResult>>,
    /// Bumped by `clear`; results from calls started in an older epoch are dropped
    epoch: AtomicU64,
    needs_credential: AtomicBool,
    batch_grading: AtomicBool,
}

impl GradingOrchestrator {
    pub fn new(grader: Arc<dyn Grader>, settings: Arc<SettingsStore>, pacing: Duration) -> Self {
        Self {
            grader,
            settings,
            content: None,
            http: reqwest::Client::new(),
            pacing,
            results: RwLock::new(HashMap::new()),
            epoch: AtomicU64::new(0),
            needs_credential: AtomicBool::new(false),
            batch_grading: AtomicBool::new(false),
        }
    }

    /// Resolve picture URLs from this content bundle instead of over HTTP
    pub fn with_content_source(mut self, content: ContentSource) -> Self {
        self.content = Some(content);
        self
    }

    pub async fn results(&self) -> HashMap<String, GradeResult> {
        self.results.read().await.clone()
    }

    pub async fn result(&self, question_id: &str) -> Option<GradeResult> {
        self.results.read().await.get(question_id).cloned()
    }

    /// Drop every result. Calls still in flight will not store theirs and a
    /// running batch stops before its next question.
    pub async fn clear(&self) {
        let mut results = self.results.write().await;
        results.clear();
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Whether the user should be asked for an API key
    pub fn needs_credential(&self) -> bool {
        self.needs_credential.load(Ordering::SeqCst)
    }

    pub fn dismiss_credential_prompt(&self) {
        self.needs_credential.store(false, Ordering::SeqCst);
    }

    pub fn is_batch_grading(&self) -> bool {
        self.batch_grading.load(Ordering::SeqCst)
    }

    /// Grade one recorded answer and store the result.
    ///
    /// Refusals (`GradeError`) leave the result map untouched. Once the grader
    /// is called, every outcome ends up in the map: the model's assessment, or
    /// a zero score with fallback feedback. The exception is a `clear` while
    /// the call was in flight, which drops the outcome (`GradeError::Cleared`).
    pub async fn grade_one(
        &self,
        section_id: &str,
        question: &Question,
        recording: Option<Arc<AudioArtifact>>,
    ) -> Result<GradeResult, GradeError> {
        let settings = self.settings.get().await;
        if !settings.has_api_key() {
            warn!("Grading {} refused: no API key", question.id);
            self.needs_credential.store(true, Ordering::SeqCst);
            return Err(GradeError::NeedsCredential);
        }

        let recording = recording.ok_or_else(|| GradeError::NoRecording(question.id.clone()))?;
        let kind = SectionKind::from_section_id(section_id)
            .ok_or_else(|| GradeError::UnknownSection(section_id.to_string()))?;

        let epoch = {
            let mut results = self.results.write().await;
            if results.get(&question.id).is_some_and(|r| r.loading) {
                return Err(GradeError::InFlight(question.id.clone()));
            }
            results.insert(question.id.clone(), GradeResult::pending());
            self.epoch.load(Ordering::SeqCst)
        };

        let max = max_score(&question.id);
        info!("Grading {} ({:?}, max {})", question.id, kind, max);

        let request = self
            .build_request(kind, question, max, &recording, settings.api_key, settings.model)
            .await;
        let outcome = match request {
            Ok(request) => self.grader.grade(request).await.map_err(|e| {
                let credential = e.is_credential_error();
                (anyhow::Error::new(e), credential)
            }),
            Err(e) => Err((e, false)),
        };

        let result = match outcome {
            Ok(assessment) => {
                info!("Graded {}: {}/{}", question.id, assessment.score, max);
                GradeResult {
                    score: assessment.score,
                    feedback: assessment.feedback,
                    loading: false,
                }
            }
            Err((e, credential)) => {
                error!("Grading {} failed: {:#}", question.id, e);
                if credential {
                    self.needs_credential.store(true, Ordering::SeqCst);
                }
                GradeResult {
                    score: 0.0,
                    feedback: (if credential { CREDENTIAL_FEEDBACK } else { RETRY_FEEDBACK }).to_string(),
                    loading: false,
                }
            }
        };

        let mut results = self.results.write().await;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            info!("Discarding grade for {}: results were cleared", question.id);
            return Err(GradeError::Cleared(question.id.clone()));
        }
        results.insert(question.id.clone(), result.clone());
        Ok(result)
    }

    /// Grade every recorded, ungraded question in exam order, one at a time.
    ///
    /// Consecutive calls are spaced by the pacing delay. Individual failures
    /// are stored as results and never stop the batch. Returns how many
    /// questions were graded.
    pub async fn grade_all(&self, sections: &[Section], recordings: &RecordingMap) -> Result<usize, GradeError> {
        if !self.settings.get().await.has_api_key() {
            self.needs_credential.store(true, Ordering::SeqCst);
            return Err(GradeError::NeedsCredential);
        }

        if self.batch_grading.swap(true, Ordering::SeqCst) {
            return Err(GradeError::BatchRunning);
        }
        let _guard = BatchGuard(&self.batch_grading);

        info!("Batch grading started ({} recordings)", recordings.len());
        let epoch = self.epoch.load(Ordering::SeqCst);

        let mut graded = 0;
        for section in sections {
            for question in &section.questions {
                let Some(recording) = recordings.get(&question.id) else {
                    continue;
                };
                if self.results.read().await.contains_key(&question.id) {
                    continue;
                }

                if graded > 0 {
                    tokio::time::sleep(self.pacing).await;
                }
                if self.epoch.load(Ordering::SeqCst) != epoch {
                    info!("Batch grading stopped: results were cleared");
                    return Ok(graded);
                }

                match self.grade_one(&section.id, question, Some(Arc::clone(recording))).await {
                    Ok(_) => graded += 1,
                    Err(GradeError::NeedsCredential) => return Err(GradeError::NeedsCredential),
                    Err(GradeError::Cleared(_)) => {
                        info!("Batch grading stopped: results were cleared");
                        return Ok(graded);
                    }
                    Err(e) => warn!("Skipping {} in batch: {}", question.id, e),
                }
            }
        }

        info!("Batch grading finished: {} questions graded", graded);
        Ok(graded)
    }

    async fn build_request(
        &self,
        kind: SectionKind,
        question: &Question,
        max: f64,
        recording: &AudioArtifact,
        api_key: String,
        model: String,
    ) -> Result<GradingRequest> {
        let image = match question.media_urls.first() {
            Some(url) if kind.attaches_image() => Some(MediaPart {
                mime_type: "image/jpeg".to_string(),
                data: self.load_image(url).await?,
            }),
            _ => None,
        };

        Ok(GradingRequest {
            model,
            api_key,
            instructions: kind.instructions(question, max),
            audio: MediaPart {
                mime_type: recording.mime_type.to_string(),
                data: recording.data.clone(),
            },
            image,
        })
    }

    /// Fetch picture bytes from a `data:` URL, an HTTP URL or the content bundle
    async fn load_image(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(rest) = url.strip_prefix("data:") {
            let (_, encoded) = rest
                .split_once(";base64,")
                .ok_or_else(|| anyhow!("Unsupported data URL"))?;
            return STANDARD.decode(encoded).context("Invalid base64 in data URL");
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self
                .http
                .get(url)
                .send()
                .await
                .with_context(|| format!("Failed to fetch image {}", url))?
                .error_for_status()
                .with_context(|| format!("Failed to fetch image {}", url))?;
            let bytes = response.bytes().await.context("Failed to read image body")?;
            return Ok(bytes.to_vec());
        }

        let Some(path) = self.content.as_ref().and_then(|c| c.resolve_url(url)) else {
            bail!("Cannot resolve image URL {}", url);
        };
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read image {:?}", path))
    }
}
