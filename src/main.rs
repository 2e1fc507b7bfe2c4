use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use oral_exam::content::{load_exam, ContentSource};
use oral_exam::grading::{GeminiGrader, GradingOrchestrator};
use oral_exam::report::max_score;
use oral_exam::settings::SettingsStore;
use oral_exam::{create_router, AppState, Config};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "oral-exam")]
#[command(about = "Oral English exam engine with AI grading")]
struct Args {
    /// Config file (without extension)
    #[arg(short, long, default_value = "config/oral-exam")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Print the outline of an exam with the maximum score of every question
    Inspect {
        /// Exam id, e.g. test_1
        exam_id: String,
    },
    /// List the grading models available for the stored API key
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config))?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg).await,
        Command::Inspect { exam_id } => inspect(&cfg, &exam_id).await,
        Command::Models => models(&cfg).await,
    }
}

fn content_source(cfg: &Config) -> ContentSource {
    ContentSource::new(&cfg.content.root, "/assets")
}

async fn serve(cfg: Config) -> Result<()> {
    info!("Oral Exam v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Content root: {}", cfg.content.root);

    let settings = Arc::new(SettingsStore::load(&cfg.grading.settings_path).await?);
    let grader = Arc::new(GeminiGrader::new(&cfg.grading.api_base));
    let grading = Arc::new(
        GradingOrchestrator::new(grader.clone(), Arc::clone(&settings), cfg.grading.pacing())
            .with_content_source(content_source(&cfg)),
    );

    let mut state = AppState::new(
        content_source(&cfg),
        cfg.session.clone(),
        cfg.audio.backend_config(),
        grading,
        settings,
        grader,
    );
    if let Some(path) = &cfg.audio.simulated_input {
        info!("Using simulated microphone: {}", path);
        state = state.with_simulated_input(path);
    }

    let app = create_router(state, cfg.content.static_dir.as_deref().map(Path::new));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}

async fn inspect(cfg: &Config, exam_id: &str) -> Result<()> {
    let content = load_exam(&content_source(cfg), exam_id).await?;

    println!("{} ({})", content.name, content.exam_id);
    for section in &content.sections {
        println!("{} {}", section.id, section.title);
        for question in &section.questions {
            println!(
                "  {:<5} {:<8} prep {:>3}s  answer {:>3}s  max {:.1}  media {}",
                question.id,
                question.label,
                question.prep_duration,
                question.answer_duration,
                max_score(&question.id),
                question.media_urls.len()
            );
        }
    }

    Ok(())
}

async fn models(cfg: &Config) -> Result<()> {
    let settings = SettingsStore::load(&cfg.grading.settings_path).await?.get().await;
    let grader = GeminiGrader::new(&cfg.grading.api_base);

    for model in grader.list_models(&settings.api_key).await? {
        let marker = if model == settings.model { "*" } else { " " };
        println!("{} {}", marker, model);
    }

    Ok(())
}
