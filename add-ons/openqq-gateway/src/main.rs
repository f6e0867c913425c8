//! Axum-based API Gateway for OpenQQ. Config-driven via CoreConfig.

mod handlers;

use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use openqq_core::{open_store, CacheStore, CoreConfig, KnowledgeStore, Orchestrator};
use openqq_skills::{ClipScorer, ClipTagger, ModelRouter};
use std::sync::Arc;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pre-flight check: config loads, the store opens with both trees readable, port is free.
fn run_verify() -> Result<(), String> {
    let config = CoreConfig::load().map_err(|e| format!("Config load failed: {}", e))?;
    let store_path = config.store_path();

    print!("Checking {}... ", store_path.display());
    let (cache, knowledge) = open_store(&store_path)
        .map_err(|e| format!("store LOCKED or inaccessible: {}", e))?;
    let cached = cache.len().map_err(|e| format!("cache tree failed: {}", e))?;
    let records = knowledge
        .records()
        .map_err(|e| format!("knowledge tree failed: {}", e))?;
    drop((cache, knowledge));
    println!("OK ({} cached prompts, {} knowledge records)", cached, records.len());

    print!("Checking {}:{}... ", config.host, config.port);
    match std::net::TcpListener::bind((config.host.as_str(), config.port)) {
        Ok(listener) => {
            drop(listener);
            println!("OK (available)");
        }
        Err(e) => return Err(format!("Port {} BLOCKED: {}", config.port, e)),
    }

    println!("\nAll checks passed. Ready to start gateway.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[openqq-gateway] .env not loaded: {} (using system environment)", e);
    }

    if std::env::args().any(|a| a == "--verify") {
        match run_verify() {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("PRE-FLIGHT FAILED: {}", e);
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(CoreConfig::load()?);
    let (cache, knowledge) = open_store(config.store_path())?;

    match knowledge.seed_defaults() {
        Ok(true) => tracing::info!(target: "openqq::knowledge", "healthcare tech catalogue seeded"),
        Ok(false) => tracing::debug!(target: "openqq::knowledge", "knowledge base already populated"),
        Err(e) => tracing::warn!(target: "openqq::knowledge", error = %e, "failed to seed knowledge base"),
    }

    let generator = Arc::new(ModelRouter::from_config(&config));
    let scorer = Arc::new(ClipScorer::from_model_dir(config.clip_model_dir.as_deref()));
    if config.preload_classifier {
        let scorer = Arc::clone(&scorer);
        tokio::spawn(async move {
            if let Err(e) = scorer.preload().await {
                tracing::warn!(target: "openqq::autotag", error = %e, "classifier preload failed; will retry on first request");
            }
        });
    }
    let tagger = Arc::new(ClipTagger::new(scorer));

    let orchestrator = Arc::new(
        Orchestrator::new(
            Arc::new(cache.clone()),
            Arc::new(knowledge.clone()),
            generator,
            tagger,
        )
        .with_degraded_caching(config.cache_degraded_responses),
    );

    let app = build_app(AppState {
        config: Arc::clone(&config),
        orchestrator,
        cache,
        knowledge,
    });

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!(
        target: "openqq::gateway",
        "{} listening on {}",
        config.app_name,
        listener.local_addr()?
    );
    axum::serve(listener, app).await?;
    Ok(())
}

fn frontend_root_dir() -> std::path::PathBuf {
    // Working-directory relative first (run from workspace root), then relative to this crate.
    let cwd = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
    let from_cwd = cwd.join("frontend");
    if from_cwd.exists() {
        return from_cwd;
    }

    std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("frontend")
}

fn build_app(state: AppState) -> Router {
    let frontend_enabled = state.config.frontend_enabled;
    let body_limit = state.config.max_upload_bytes;

    let mut app = Router::new()
        .route("/api/ask", post(handlers::ask::ask))
        .route("/api/autotag", post(handlers::autotag::autotag))
        .route("/api/v1/health", get(health))
        .route("/api/v1/status", get(status))
        .with_state(state);

    if frontend_enabled {
        app = app.route_service("/", ServeFile::new(frontend_root_dir().join("index.html")));
    }

    app.layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<CoreConfig>,
    pub(crate) orchestrator: Arc<Orchestrator>,
    pub(crate) cache: CacheStore,
    pub(crate) knowledge: KnowledgeStore,
}

/// GET /api/v1/health – liveness check for UI and scripts.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/v1/status – app identity, fallback backend, table sizes and tagger labels.
async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cache_entries = state.cache.len().ok();
    let knowledge_records = state.knowledge.len().ok();
    Json(serde_json::json!({
        "app_name": state.config.app_name,
        "llm_mode": state.config.llm_mode,
        "llm_model": state.config.llm_model,
        "generator": state.orchestrator.generator_name(),
        "cache_entries": cache_entries,
        "knowledge_records": knowledge_records,
        "labels": state.orchestrator.labels(),
    }))
}
