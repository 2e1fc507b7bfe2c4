use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::path::Path;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

/// Create the HTTP router with all routes
///
/// Exam media is served under `/assets` from the content root; `static_dir`,
/// when given, serves the browser front-end for every other path.
pub fn create_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let assets = ServeDir::new(&state.content.root);

    let router = Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Exam catalog and content
        .route("/exams", get(handlers::list_exams))
        .route("/exams/:exam_id/load", post(handlers::load_exam))
        .route("/exams/:exam_id/generate", post(handlers::generate_exam))
        .route("/exam", get(handlers::get_exam))
        .route("/exam/assets", get(handlers::get_assets))
        // Session control
        .route("/session", get(handlers::get_session))
        .route("/session/start", post(handlers::start_session))
        .route("/session/start-now", post(handlers::start_now))
        .route("/session/stop-recording", post(handlers::stop_recording))
        .route("/session/restart", post(handlers::restart_session))
        .route("/session/jump", post(handlers::jump))
        .route("/session/finish", post(handlers::finish_session))
        .route("/session/export", post(handlers::export_session))
        // Media completion reported by the browser
        .route("/session/media/:playback_id/ended", post(handlers::media_ended))
        .route("/session/media/:playback_id/failed", post(handlers::media_failed))
        // Lazily generated content
        .route("/session/content/:section_id", post(handlers::content_ready))
        .route("/session/content/:section_id/failed", post(handlers::content_failed))
        // Browser microphone
        .route(
            "/microphone",
            get(handlers::get_microphone).post(handlers::set_microphone),
        )
        .route("/microphone/frames", post(handlers::push_frames))
        // Grading
        .route("/grading", get(handlers::get_grading).post(handlers::grade_all))
        .route("/grading/:question_id", post(handlers::grade_question))
        .route("/models", get(handlers::list_models))
        .route(
            "/settings",
            get(handlers::get_settings).put(handlers::put_settings),
        )
        .route("/report", get(handlers::get_report))
        .nest_service("/assets", assets);

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(
            ServiceBuilder::new()
                // Add tracing middleware for request logging
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
