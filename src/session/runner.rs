//! Task that owns a running exam session
//!
//! The session state machine is synchronous and single-owner. `ExamRunner`
//! moves it into one tokio task and feeds it, in order, with client commands,
//! the 1-second ticker and generation events. After every message the new
//! snapshot is published on a watch channel.

use std::future::pending;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::machine::{ExamSession, JumpOutcome, RecordingMap, SessionError, SessionSnapshot};
use super::phase::Phase;
use super::player::PlaybackId;
use crate::content::{GenerationEvent, Question, Section};

const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Errors returned to runner clients
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("exam session is no longer running")]
    Stopped,
}

/// Commands accepted by the session task
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Start,
    StartNow,
    StopRecording,
    Jump {
        section_index: usize,
        question_index: usize,
    },
    FinishEarly,
    Restart,
    MediaEnded(PlaybackId),
    MediaFailed(PlaybackId),
    ContentReady {
        section_id: String,
        questions: Vec<Question>,
    },
    ContentFailed {
        section_id: String,
        error: String,
    },
}

/// What a command did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied,
    /// Valid but had no effect (stale media event, stop outside RECORDING)
    Ignored,
    Jump(JumpOutcome),
}

type Reply<T> = oneshot::Sender<T>;

enum Request {
    Command(SessionCommand, Reply<Result<CommandOutcome, SessionError>>),
    Recordings(Reply<RecordingMap>),
    Sections(Reply<Vec<Section>>),
}

/// Client side of a running session. Cheap to clone.
#[derive(Clone)]
pub struct ExamHandle {
    requests: mpsc::Sender<Request>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

pub struct ExamRunner {
    session: ExamSession,
    requests: mpsc::Receiver<Request>,
    generation: Option<mpsc::Receiver<GenerationEvent>>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl ExamRunner {
    /// Move `session` into a background task.
    ///
    /// `generation` delivers lazily generated section content. The task ends
    /// once every handle has been dropped.
    pub fn spawn(
        session: ExamSession,
        generation: Option<mpsc::Receiver<GenerationEvent>>,
    ) -> (ExamHandle, JoinHandle<()>) {
        let (request_tx, request_rx) = mpsc::channel(32);
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());

        let runner = Self {
            session,
            requests: request_rx,
            generation,
            snapshot: snapshot_tx,
        };

        let task = tokio::spawn(runner.run());

        let handle = ExamHandle {
            requests: request_tx,
            snapshot: snapshot_rx,
        };

        (handle, task)
    }

    async fn run(mut self) {
        info!("Exam session {} running", self.session.id());

        let mut ticker = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut countdown_generation = self.session.countdown().generation();

        loop {
            tokio::select! {
                request = self.requests.recv() => {
                    let Some(request) = request else {
                        break;
                    };
                    self.handle_request(request).await;
                }
                _ = ticker.tick() => {
                    if self.session.tick().is_some() {
                        debug!("Countdown completed, phase now {}", self.session.phase());
                    }
                }
                event = next_event(&mut self.generation) => {
                    match event {
                        Some(event) => self.handle_generation(event),
                        None => {
                            debug!("Content generation channel closed");
                            self.generation = None;
                        }
                    }
                }
            }

            // A countdown that just started gets a full first second
            let generation = self.session.countdown().generation();
            if generation != countdown_generation {
                countdown_generation = generation;
                ticker.reset();
            }

            self.snapshot.send_replace(self.session.snapshot());
        }

        info!("Exam session {} stopped", self.session.id());
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Command(command, reply) => {
                let result = self.apply(command).await;
                let _ = reply.send(result);
            }
            Request::Recordings(reply) => {
                let _ = reply.send(self.session.recordings().clone());
            }
            Request::Sections(reply) => {
                let _ = reply.send(self.session.sections().to_vec());
            }
        }
    }

    async fn apply(&mut self, command: SessionCommand) -> Result<CommandOutcome, SessionError> {
        debug!("Applying {:?} in {}", command, self.session.phase());

        let applied = |done: bool| {
            if done {
                CommandOutcome::Applied
            } else {
                CommandOutcome::Ignored
            }
        };

        match command {
            SessionCommand::Start => {
                self.session.acquire_microphone().await?;
                self.session.start()?;
                Ok(CommandOutcome::Applied)
            }
            SessionCommand::StartNow => Ok(applied(self.session.start_now())),
            SessionCommand::StopRecording => Ok(applied(self.session.stop_recording())),
            SessionCommand::Jump {
                section_index,
                question_index,
            } => {
                if self.session.phase() == Phase::Idle {
                    self.session.acquire_microphone().await?;
                }
                self.session
                    .jump(section_index, question_index)
                    .map(CommandOutcome::Jump)
            }
            SessionCommand::FinishEarly => {
                self.session.finish_early()?;
                Ok(CommandOutcome::Applied)
            }
            SessionCommand::Restart => {
                self.session.restart();
                Ok(CommandOutcome::Applied)
            }
            SessionCommand::MediaEnded(id) => Ok(applied(self.session.media_ended(id))),
            SessionCommand::MediaFailed(id) => Ok(applied(self.session.media_failed(id))),
            SessionCommand::ContentReady {
                section_id,
                questions,
            } => {
                self.session.content_ready(&section_id, questions)?;
                Ok(CommandOutcome::Applied)
            }
            SessionCommand::ContentFailed { section_id, error } => {
                self.session.content_failed(&section_id, &error);
                Ok(CommandOutcome::Applied)
            }
        }
    }

    fn handle_generation(&mut self, event: GenerationEvent) {
        match event {
            GenerationEvent::Ready {
                section_id,
                questions,
            } => {
                if let Err(e) = self.session.content_ready(&section_id, questions) {
                    warn!("Dropping generated content: {}", e);
                }
            }
            GenerationEvent::Failed { section_id, error } => {
                self.session.content_failed(&section_id, &error);
            }
        }
    }
}

async fn next_event(generation: &mut Option<mpsc::Receiver<GenerationEvent>>) -> Option<GenerationEvent> {
    match generation.as_mut() {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

impl ExamHandle {
    /// Send a command and wait for the session's answer
    pub async fn send(&self, command: SessionCommand) -> Result<CommandOutcome, RunnerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(Request::Command(command, reply_tx))
            .await
            .map_err(|_| RunnerError::Stopped)?;

        let outcome = reply_rx.await.map_err(|_| RunnerError::Stopped)??;
        Ok(outcome)
    }

    pub async fn start(&self) -> Result<CommandOutcome, RunnerError> {
        self.send(SessionCommand::Start).await
    }

    pub async fn start_now(&self) -> Result<CommandOutcome, RunnerError> {
        self.send(SessionCommand::StartNow).await
    }

    pub async fn stop_recording(&self) -> Result<CommandOutcome, RunnerError> {
        self.send(SessionCommand::StopRecording).await
    }

    pub async fn jump(&self, section_index: usize, question_index: usize) -> Result<CommandOutcome, RunnerError> {
        self.send(SessionCommand::Jump {
            section_index,
            question_index,
        })
        .await
    }

    pub async fn finish_early(&self) -> Result<CommandOutcome, RunnerError> {
        self.send(SessionCommand::FinishEarly).await
    }

    pub async fn restart(&self) -> Result<CommandOutcome, RunnerError> {
        self.send(SessionCommand::Restart).await
    }

    pub async fn media_ended(&self, id: PlaybackId) -> Result<CommandOutcome, RunnerError> {
        self.send(SessionCommand::MediaEnded(id)).await
    }

    pub async fn media_failed(&self, id: PlaybackId) -> Result<CommandOutcome, RunnerError> {
        self.send(SessionCommand::MediaFailed(id)).await
    }

    /// Copy of the recording map
    pub async fn recordings(&self) -> Result<RecordingMap, RunnerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(Request::Recordings(reply_tx))
            .await
            .map_err(|_| RunnerError::Stopped)?;
        reply_rx.await.map_err(|_| RunnerError::Stopped)
    }

    /// Current sections, including content generated since load
    pub async fn sections(&self) -> Result<Vec<Section>, RunnerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(Request::Sections(reply_tx))
            .await
            .map_err(|_| RunnerError::Stopped)?;
        reply_rx.await.map_err(|_| RunnerError::Stopped)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that observes every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }
}
