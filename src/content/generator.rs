//! Section-by-section content generation
//!
//! Generated exams start from [`lazy_outline`](super::loader::lazy_outline):
//! every section has an empty question list that is filled exactly once when
//! its generation finishes. Completion is reported as a [`GenerationEvent`] on
//! a channel, which the session runner turns into a `content_ready` message.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::model::Question;

/// Gate for the expensive image-generation step of the picture section
#[async_trait]
pub trait ImageConfirmation: Send + Sync {
    async fn confirm_image_generation(&self) -> bool;
}

/// Answers every confirmation with the same value
#[derive(Debug, Clone, Copy)]
pub struct FixedConfirmation(pub bool);

#[async_trait]
impl ImageConfirmation for FixedConfirmation {
    async fn confirm_image_generation(&self) -> bool {
        self.0
    }
}

/// Produces the questions of one section
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate_section(
        &self,
        section_id: &str,
        confirm: Arc<dyn ImageConfirmation>,
    ) -> Result<Vec<Question>>;
}

/// Outcome of generating one section
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    Ready {
        section_id: String,
        questions: Vec<Question>,
    },
    Failed {
        section_id: String,
        error: String,
    },
}

/// Runs a generator over pending sections in exam order
pub struct GenerationCoordinator {
    generator: Arc<dyn ContentGenerator>,
    confirm: Arc<dyn ImageConfirmation>,
}

impl GenerationCoordinator {
    pub fn new(generator: Arc<dyn ContentGenerator>, confirm: Arc<dyn ImageConfirmation>) -> Self {
        Self { generator, confirm }
    }

    /// Generate `section_ids` one after another in the background.
    ///
    /// Sections are generated sequentially so the first section is ready
    /// first. Each result is sent as soon as it is available; the task stops
    /// early if the receiver is gone.
    pub fn spawn(
        &self,
        section_ids: Vec<String>,
        events: mpsc::Sender<GenerationEvent>,
    ) -> JoinHandle<()> {
        let generator = Arc::clone(&self.generator);
        let confirm = Arc::clone(&self.confirm);

        tokio::spawn(async move {
            for section_id in section_ids {
                info!("Generating content for {}", section_id);

                let event = match generator
                    .generate_section(&section_id, Arc::clone(&confirm))
                    .await
                {
                    Ok(questions) if questions.is_empty() => {
                        error!("Generator returned no questions for {}", section_id);
                        GenerationEvent::Failed {
                            section_id,
                            error: "no questions generated".to_string(),
                        }
                    }
                    Ok(questions) => {
                        info!("Generated {} questions for {}", questions.len(), section_id);
                        GenerationEvent::Ready {
                            section_id,
                            questions,
                        }
                    }
                    Err(e) => {
                        error!("Content generation failed for {}: {:#}", section_id, e);
                        GenerationEvent::Failed {
                            section_id,
                            error: e.to_string(),
                        }
                    }
                };

                if events.send(event).await.is_err() {
                    info!("Generation receiver closed, stopping");
                    break;
                }
            }
        })
    }
}
