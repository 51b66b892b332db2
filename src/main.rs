// HTTP service entry point for the page translation pipeline

use reader_translation::{
    core::{Config, LanguageCode, TranslationResult, TranslationSettings},
    orchestration::TranslationPipeline,
};

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    pipeline: Arc<TranslationPipeline>,
}

#[derive(Serialize)]
struct TranslateResponse {
    result: Option<TranslationResult>,
    font_size: f32,
}

#[derive(Serialize)]
struct ModelStatus {
    lang: LanguageCode,
    downloaded: bool,
}

type ApiError = (StatusCode, String);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::new().context("Failed to load configuration")?;

    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "reader_translation={},hyper=off,reqwest=off",
        level_name(config.log_level())
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== READER TRANSLATION SERVICE ===");
    info!(
        "Languages: {} -> {} | LibreTranslate: {} | Cache: {}",
        config.translation.source_lang,
        config.translation.target_lang,
        config.engines.libretranslate_url,
        if config.cache.enabled { "ON" } else { "OFF" }
    );

    let pipeline = Arc::new(TranslationPipeline::from_config(&config).await?);
    let state = AppState {
        pipeline: Arc::clone(&pipeline),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route("/settings", get(get_settings).post(update_settings))
        .route("/translate", post(translate_page))
        .route("/models/:lang", get(model_status).post(download_model))
        .with_state(state)
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024))
        .layer(cors);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /              - Root endpoint");
    info!("  GET  /health        - Health check");
    info!("  GET  /metrics       - Prometheus metrics");
    info!("  GET  /stats         - Detailed statistics");
    info!("  GET  /settings      - Current translation settings");
    info!("  POST /settings      - Replace translation settings (JSON)");
    info!("  POST /translate     - Translate a page (multipart field 'image')");
    info!("  GET  /models/:lang  - Model availability");
    info!("  POST /models/:lang  - Download a model (unmetered networks only)");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pipeline.shutdown().await;
    info!("Server stopped");

    Ok(())
}

fn level_name(level: tracing::Level) -> &'static str {
    match level {
        tracing::Level::TRACE => "trace",
        tracing::Level::DEBUG => "debug",
        tracing::Level::INFO => "info",
        tracing::Level::WARN => "warn",
        tracing::Level::ERROR => "error",
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

async fn root() -> &'static str {
    "Reader Translation Service - OCR fan-out and batched translation"
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let settings = state.pipeline.settings();
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "translation_enabled": settings.enabled,
        "primary_translator": state.pipeline.translator().has_primary(),
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    state.pipeline.metrics().record_endpoint_request("/metrics");
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.pipeline.metrics().to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state.pipeline.metrics().record_endpoint_request("/stats");
    let snapshot = state.pipeline.metrics().snapshot();
    serde_json::to_value(snapshot).map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serialize metrics: {}", e),
        )
    })
}

async fn get_settings(State(state): State<AppState>) -> Json<TranslationSettings> {
    Json(state.pipeline.settings())
}

async fn update_settings(
    State(state): State<AppState>,
    Json(settings): Json<TranslationSettings>,
) -> Result<Json<TranslationSettings>, ApiError> {
    state.pipeline.metrics().record_endpoint_request("/settings");
    state
        .pipeline
        .update_settings(settings)
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(Json(state.pipeline.settings()))
}

/// Translate one page
///
/// # Request Format:
/// - multipart/form-data
/// - Field "image": the page image (PNG/JPEG/WebP/BMP)
///
/// # Response:
/// - `result` is null when translation is disabled or no text was found
async fn translate_page(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<TranslateResponse>, ApiError> {
    let start_time = std::time::Instant::now();
    state.pipeline.metrics().record_endpoint_request("/translate");

    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("image") {
            let data = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, format!("Read error: {}", e)))?;
            image = Some(data.to_vec());
        }
    }

    let bytes = image.ok_or_else(|| (StatusCode::BAD_REQUEST, "No image provided".to_string()))?;

    let result = state.pipeline.process_bytes(bytes).await.map_err(|e| {
        warn!("Rejected page: {}", e);
        (StatusCode::BAD_REQUEST, format!("Invalid image: {}", e))
    })?;

    info!(
        "Request completed in {:.2}s: {}",
        start_time.elapsed().as_secs_f64(),
        match &result {
            Some(r) => format!("{} blocks", r.blocks().len()),
            None => "no text".to_string(),
        }
    );

    Ok(Json(TranslateResponse {
        result,
        font_size: state.pipeline.settings().font_size,
    }))
}

fn parse_lang(raw: &str) -> Result<LanguageCode, ApiError> {
    raw.parse::<LanguageCode>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

async fn model_status(
    State(state): State<AppState>,
    Path(lang): Path<String>,
) -> Result<Json<ModelStatus>, ApiError> {
    let lang = parse_lang(&lang)?;
    let downloaded = state.pipeline.is_model_downloaded(lang).await;
    Ok(Json(ModelStatus { lang, downloaded }))
}

async fn download_model(
    State(state): State<AppState>,
    Path(lang): Path<String>,
) -> Result<Json<ModelStatus>, ApiError> {
    state.pipeline.metrics().record_endpoint_request("/models");
    let lang = parse_lang(&lang)?;
    let downloaded = state.pipeline.download_model(lang).await;
    Ok(Json(ModelStatus { lang, downloaded }))
}
