use super::state::AppState;
use crate::audio::{AudioFrame, MicrophoneAccess};
use crate::content::{ExamContent, ExamSet, Question, EXAM_SETS};
use crate::grading::{GradeError, GradeResult};
use crate::report::{export_recordings, total_score, ExamReport};
use crate::session::{CommandOutcome, ExamHandle, JumpOutcome, PlaybackId, RunnerError, SessionCommand, SessionError};
use crate::settings::Settings;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::try_join;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JumpRequest {
    pub section_index: usize,
    pub question_index: usize,
}

#[derive(Debug, Deserialize)]
pub struct FinishRequest {
    /// The user confirmed ending the exam
    #[serde(default)]
    pub confirm: bool,
}

/// Questions of a generated section
#[derive(Debug, Deserialize)]
pub struct SectionContent {
    pub questions: Vec<Question>,
}

#[derive(Debug, Deserialize)]
pub struct GenerationFailure {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct MicrophoneRequest {
    pub granted: bool,
}

/// PCM frame uploaded by the browser
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameUpload {
    /// Base64 of interleaved little-endian i16 samples
    pub samples: String,
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default)]
    pub timestamp_ms: u64,
}

fn default_channels() -> u16 {
    1
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub dir: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jump: Option<JumpOutcome>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingStatus {
    pub results: HashMap<String, GradeResult>,
    pub is_batch_grading: bool,
    pub needs_credential: bool,
    pub total_score: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsView {
    pub has_api_key: bool,
    pub api_key: String,
    pub model: String,
}

// ============================================================================
// Error mapping
// ============================================================================

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn no_exam() -> Response {
    error_response(StatusCode::CONFLICT, "No exam loaded")
}

fn runner_error(e: RunnerError) -> Response {
    let status = match &e {
        RunnerError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
        RunnerError::Session(session) => match session {
            SessionError::MicrophoneUnavailable(_) => StatusCode::FORBIDDEN,
            SessionError::SectionOutOfRange(_)
            | SessionError::QuestionOutOfRange { .. }
            | SessionError::UnknownSection(_) => StatusCode::BAD_REQUEST,
            SessionError::NoContent
            | SessionError::AlreadyStarted
            | SessionError::NotStarted
            | SessionError::Completed => StatusCode::CONFLICT,
        },
    };
    error_response(status, e.to_string())
}

fn grade_error(e: GradeError) -> Response {
    let status = match &e {
        GradeError::NeedsCredential => StatusCode::UNAUTHORIZED,
        GradeError::NoRecording(_) | GradeError::UnknownSection(_) => StatusCode::BAD_REQUEST,
        GradeError::InFlight(_) | GradeError::BatchRunning | GradeError::Cleared(_) => StatusCode::CONFLICT,
    };
    error_response(status, e.to_string())
}

fn command_response(result: Result<CommandOutcome, RunnerError>) -> Response {
    match result {
        Ok(outcome) => {
            let (status, jump) = match outcome {
                CommandOutcome::Applied => ("applied", None),
                CommandOutcome::Ignored => ("ignored", None),
                CommandOutcome::Jump(jump) => ("applied", Some(jump)),
            };
            Json(CommandResponse { status, jump }).into_response()
        }
        Err(e) => runner_error(e),
    }
}

async fn with_exam(state: &AppState) -> Result<(String, ExamHandle), Response> {
    state.current().await.ok_or_else(no_exam)
}

async fn send(state: &AppState, command: SessionCommand) -> Response {
    match with_exam(state).await {
        Ok((_, handle)) => command_response(handle.send(command).await),
        Err(response) => response,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "oral-exam"
    }))
}

/// GET /exams
pub async fn list_exams() -> Json<&'static [ExamSet]> {
    Json(EXAM_SETS)
}

/// POST /exams/:exam_id/load
pub async fn load_exam(State(state): State<AppState>, Path(exam_id): Path<String>) -> Response {
    info!("Loading exam: {}", exam_id);

    match state.load(&exam_id).await {
        Ok(content) => Json(content).into_response(),
        Err(e) => {
            error!("Failed to load exam {}: {:#}", exam_id, e);
            error_response(StatusCode::NOT_FOUND, format!("Failed to load exam data: {:#}", e))
        }
    }
}

/// POST /exams/:exam_id/generate
///
/// Loads an exam whose sections start empty and are filled as they are generated.
pub async fn generate_exam(State(state): State<AppState>, Path(exam_id): Path<String>) -> Response {
    info!("Loading generated exam: {}", exam_id);

    match state.load_generated(&exam_id).await {
        Ok(content) => Json(content).into_response(),
        Err(e) => {
            error!("Failed to start generated exam {}: {:#}", exam_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
        }
    }
}

/// GET /exam
pub async fn get_exam(State(state): State<AppState>) -> Response {
    let exam = state.exam.read().await;
    let Some(loaded) = exam.as_ref() else {
        return no_exam();
    };

    match loaded.handle.sections().await {
        Ok(sections) => Json(ExamContent::new(loaded.exam_id.clone(), loaded.name.clone(), sections)).into_response(),
        Err(e) => runner_error(e),
    }
}

/// GET /exam/assets
pub async fn get_assets(State(state): State<AppState>) -> Response {
    let (exam_id, handle) = match with_exam(&state).await {
        Ok(exam) => exam,
        Err(response) => return response,
    };

    match handle.sections().await {
        Ok(sections) => {
            let content = ExamContent::new(exam_id, String::new(), sections);
            Json(content.asset_urls(&state.session_config.cues.urls())).into_response()
        }
        Err(e) => runner_error(e),
    }
}

/// GET /session
pub async fn get_session(State(state): State<AppState>) -> Response {
    match with_exam(&state).await {
        Ok((_, handle)) => Json(handle.snapshot()).into_response(),
        Err(response) => response,
    }
}

/// POST /session/start
pub async fn start_session(State(state): State<AppState>) -> Response {
    send(&state, SessionCommand::Start).await
}

/// POST /session/start-now
pub async fn start_now(State(state): State<AppState>) -> Response {
    send(&state, SessionCommand::StartNow).await
}

/// POST /session/stop-recording
pub async fn stop_recording(State(state): State<AppState>) -> Response {
    send(&state, SessionCommand::StopRecording).await
}

/// POST /session/restart
///
/// Clears recordings and grading results; the microphone stays acquired.
pub async fn restart_session(State(state): State<AppState>) -> Response {
    let response = send(&state, SessionCommand::Restart).await;
    if response.status().is_success() {
        state.grading.clear().await;
    }
    response
}

/// POST /session/jump
pub async fn jump(State(state): State<AppState>, Json(req): Json<JumpRequest>) -> Response {
    send(
        &state,
        SessionCommand::Jump {
            section_index: req.section_index,
            question_index: req.question_index,
        },
    )
    .await
}

/// POST /session/finish
pub async fn finish_session(State(state): State<AppState>, Json(req): Json<FinishRequest>) -> Response {
    if !req.confirm {
        return error_response(StatusCode::BAD_REQUEST, "Finishing the exam early requires confirmation");
    }
    send(&state, SessionCommand::FinishEarly).await
}

/// POST /session/media/:playback_id/ended
pub async fn media_ended(State(state): State<AppState>, Path(playback_id): Path<u64>) -> Response {
    send(&state, SessionCommand::MediaEnded(PlaybackId(playback_id))).await
}

/// POST /session/media/:playback_id/failed
pub async fn media_failed(State(state): State<AppState>, Path(playback_id): Path<u64>) -> Response {
    send(&state, SessionCommand::MediaFailed(PlaybackId(playback_id))).await
}

/// POST /session/content/:section_id
pub async fn content_ready(
    State(state): State<AppState>,
    Path(section_id): Path<String>,
    Json(req): Json<SectionContent>,
) -> Response {
    info!("Received {} questions for {}", req.questions.len(), section_id);
    send(
        &state,
        SessionCommand::ContentReady {
            section_id,
            questions: req.questions,
        },
    )
    .await
}

/// POST /session/content/:section_id/failed
pub async fn content_failed(
    State(state): State<AppState>,
    Path(section_id): Path<String>,
    Json(req): Json<GenerationFailure>,
) -> Response {
    send(
        &state,
        SessionCommand::ContentFailed {
            section_id,
            error: req.error,
        },
    )
    .await
}

/// POST /session/export
///
/// Writes `<question_id>.wav` for every recording plus `report.json`.
pub async fn export_session(State(state): State<AppState>, Json(req): Json<ExportRequest>) -> Response {
    let (exam_id, handle) = match with_exam(&state).await {
        Ok(exam) => exam,
        Err(response) => return response,
    };

    let (recordings, sections) = match try_join(handle.recordings(), handle.sections()).await {
        Ok(both) => both,
        Err(e) => return runner_error(e),
    };
    let results = state.grading.results().await;
    let dir = std::path::PathBuf::from(&req.dir);

    let exported = export_recordings(&recordings, &dir).and_then(|files| {
        let report = ExamReport::build(&exam_id, &sections, &recordings, &results);
        report.write_json(&dir.join("report.json"))?;
        Ok(files)
    });

    match exported {
        Ok(files) => Json(serde_json::json!({
            "dir": req.dir,
            "recordings": files.len(),
        }))
        .into_response(),
        Err(e) => {
            error!("Export failed: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
        }
    }
}

/// POST /microphone
pub async fn set_microphone(State(state): State<AppState>, Json(req): Json<MicrophoneRequest>) -> impl IntoResponse {
    state.microphone.set_access(req.granted);
    Json(serde_json::json!({ "access": state.microphone.access() }))
}

/// GET /microphone
pub async fn get_microphone(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "access": state.microphone.access(),
        "capturing": state.microphone.is_capturing(),
    }))
}

/// POST /microphone/frames
pub async fn push_frames(State(state): State<AppState>, Json(frame): Json<FrameUpload>) -> Response {
    if state.microphone.access() != MicrophoneAccess::Granted {
        return error_response(StatusCode::FORBIDDEN, "Microphone access has not been granted");
    }

    let bytes = match STANDARD.decode(&frame.samples) {
        Ok(bytes) => bytes,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Invalid sample data: {}", e)),
    };

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    let frame = AudioFrame {
        samples,
        sample_rate: frame.sample_rate,
        channels: frame.channels,
        timestamp_ms: frame.timestamp_ms,
    };

    match state.microphone.push(frame).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(StatusCode::CONFLICT, e.to_string()),
    }
}

/// POST /grading/:question_id
pub async fn grade_question(State(state): State<AppState>, Path(question_id): Path<String>) -> Response {
    let (exam_id, handle) = match with_exam(&state).await {
        Ok(exam) => exam,
        Err(response) => return response,
    };

    let (recordings, sections) = match try_join(handle.recordings(), handle.sections()).await {
        Ok(both) => both,
        Err(e) => return runner_error(e),
    };

    let content = ExamContent::new(exam_id, String::new(), sections);
    let Some((section, question)) = content.find_question(&question_id) else {
        return error_response(StatusCode::NOT_FOUND, format!("Unknown question {}", question_id));
    };

    let recording = recordings.get(&question_id).cloned();
    match state.grading.grade_one(&section.id, question, recording).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            warn!("Grading {} refused: {}", question_id, e);
            grade_error(e)
        }
    }
}

/// POST /grading
pub async fn grade_all(State(state): State<AppState>) -> Response {
    let (_, handle) = match with_exam(&state).await {
        Ok(exam) => exam,
        Err(response) => return response,
    };

    let (recordings, sections) = match try_join(handle.recordings(), handle.sections()).await {
        Ok(both) => both,
        Err(e) => return runner_error(e),
    };

    match state.grading.grade_all(&sections, &recordings).await {
        Ok(graded) => Json(serde_json::json!({ "graded": graded })).into_response(),
        Err(e) => grade_error(e),
    }
}

/// GET /grading
pub async fn get_grading(State(state): State<AppState>) -> Json<GradingStatus> {
    let results = state.grading.results().await;
    let total = total_score(&results);

    Json(GradingStatus {
        results,
        is_batch_grading: state.grading.is_batch_grading(),
        needs_credential: state.grading.needs_credential(),
        total_score: total,
    })
}

/// GET /settings
pub async fn get_settings(State(state): State<AppState>) -> Json<SettingsView> {
    let settings = state.settings.get().await;
    Json(SettingsView {
        has_api_key: settings.has_api_key(),
        api_key: settings.masked_key(),
        model: settings.model,
    })
}

/// PUT /settings
pub async fn put_settings(State(state): State<AppState>, Json(settings): Json<Settings>) -> Response {
    match state.settings.save(settings).await {
        Ok(()) => {
            state.grading.dismiss_credential_prompt();
            get_settings(State(state)).await.into_response()
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// GET /models
pub async fn list_models(State(state): State<AppState>) -> Response {
    let settings = state.settings.get().await;
    match state.grader.list_models(&settings.api_key).await {
        Ok(models) => Json(models).into_response(),
        Err(e) if e.is_credential_error() => error_response(StatusCode::UNAUTHORIZED, e.to_string()),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

/// GET /report
pub async fn get_report(State(state): State<AppState>) -> Response {
    let (exam_id, handle) = match with_exam(&state).await {
        Ok(exam) => exam,
        Err(response) => return response,
    };

    let (recordings, sections) = match try_join(handle.recordings(), handle.sections()).await {
        Ok(both) => both,
        Err(e) => return runner_error(e),
    };
    let results = state.grading.results().await;

    Json(ExamReport::build(&exam_id, &sections, &recordings, &results)).into_response()
}
