use crate::audio::{AudioBackendConfig, AudioBackendFactory, AudioSource, CaptureAdapter, PushHandle};
use crate::content::{lazy_outline, load_exam, ContentSource, ExamContent, GenerationCoordinator, GenerationEvent};
use crate::grading::{GeminiGrader, GradingOrchestrator};
use crate::session::{ExamHandle, ExamRunner, ExamSession, RemotePlayer, SessionConfig};
use crate::settings::SettingsStore;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

/// The exam currently loaded in the browser
pub struct LoadedExam {
    pub exam_id: String,
    pub name: String,
    pub handle: ExamHandle,
    task: JoinHandle<()>,
    generation: Option<JoinHandle<()>>,
}

impl Drop for LoadedExam {
    fn drop(&mut self) {
        self.task.abort();
        if let Some(generation) = &self.generation {
            generation.abort();
        }
    }
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub content: ContentSource,
    pub session_config: SessionConfig,
    pub audio_config: AudioBackendConfig,
    /// Replay this WAV file instead of browser capture
    pub simulated_input: Option<PathBuf>,
    /// Browser microphone, shared by every loaded exam
    pub microphone: PushHandle,
    pub exam: Arc<RwLock<Option<LoadedExam>>>,
    pub grading: Arc<GradingOrchestrator>,
    pub settings: Arc<SettingsStore>,
    pub grader: Arc<GeminiGrader>,
    /// Generates sections of AI exams on the server. Without one, sections are
    /// delivered through `POST /session/content/:section_id`.
    pub generator: Option<Arc<GenerationCoordinator>>,
}

impl AppState {
    pub fn new(
        content: ContentSource,
        session_config: SessionConfig,
        audio_config: AudioBackendConfig,
        grading: Arc<GradingOrchestrator>,
        settings: Arc<SettingsStore>,
        grader: Arc<GeminiGrader>,
    ) -> Self {
        Self {
            content,
            session_config,
            audio_config,
            simulated_input: None,
            microphone: PushHandle::new(),
            exam: Arc::new(RwLock::new(None)),
            grading,
            settings,
            grader,
            generator: None,
        }
    }

    pub fn with_simulated_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.simulated_input = Some(path.into());
        self
    }

    pub fn with_generator(mut self, generator: Arc<GenerationCoordinator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Load `exam_id` from disk and start a fresh session for it, replacing
    /// the previous exam. Grading results of the previous exam are dropped.
    pub async fn load(&self, exam_id: &str) -> Result<ExamContent> {
        let content = load_exam(&self.content, exam_id).await?;
        self.install(content.clone()).await?;
        Ok(content)
    }

    /// Start a session over an empty six-section outline whose questions are
    /// generated section by section while the exam runs.
    pub async fn load_generated(&self, exam_id: &str) -> Result<ExamContent> {
        let content = lazy_outline(exam_id);

        let (generation, events) = match &self.generator {
            Some(generator) => {
                let (tx, rx) = mpsc::channel(8);
                let section_ids = content.sections.iter().map(|s| s.id.clone()).collect();
                (Some(generator.spawn(section_ids, tx)), Some(rx))
            }
            None => (None, None),
        };

        self.start_session(content.clone(), events, generation).await?;
        Ok(content)
    }

    /// Start a session over already assembled content
    pub async fn install(&self, content: ExamContent) -> Result<ExamHandle> {
        self.start_session(content, None, None).await
    }

    async fn start_session(
        &self,
        content: ExamContent,
        events: Option<mpsc::Receiver<GenerationEvent>>,
        generation: Option<JoinHandle<()>>,
    ) -> Result<ExamHandle> {
        let source = match &self.simulated_input {
            Some(path) => AudioSource::File(path.clone()),
            None => AudioSource::Browser(self.microphone.clone()),
        };
        let backend = match AudioBackendFactory::create(source, self.audio_config.clone()) {
            Ok(backend) => backend,
            Err(e) => {
                if let Some(generation) = &generation {
                    generation.abort();
                }
                return Err(e);
            }
        };
        let recorder = CaptureAdapter::new(backend, self.audio_config.clone());

        let session = ExamSession::new(
            content.sections,
            self.session_config.clone(),
            Box::new(recorder),
            Box::new(RemotePlayer),
        );
        let (handle, task) = ExamRunner::spawn(session, events);

        let loaded = LoadedExam {
            exam_id: content.exam_id.clone(),
            name: content.name.clone(),
            handle: handle.clone(),
            task,
            generation,
        };

        *self.exam.write().await = Some(loaded);
        self.grading.clear().await;

        info!("Exam {} loaded", content.exam_id);
        Ok(handle)
    }

    /// Handle and id of the loaded exam
    pub async fn current(&self) -> Option<(String, ExamHandle)> {
        self.exam
            .read()
            .await
            .as_ref()
            .map(|exam| (exam.exam_id.clone(), exam.handle.clone()))
    }
}
