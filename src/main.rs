//! Bilingual OCR - upload an image, extract English/Hindi text, search it.

mod config;
mod extractor;
mod highlight;
mod ocr;
mod page;
mod preprocess;
mod upload;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use config::AppConfig;
use extractor::{Extraction, TextExtractor};
use ocr::{EngineInfo, OcrEngine, TesseractEngine};
use page::{PageView, ResultView};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    extractor: TextExtractor,
    config: Arc<AppConfig>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "bilingual_ocr=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;
    info!(
        "Using {} (lang={}, oem={}, psm={}), preprocess by default: {}",
        config.tesseract.command.display(),
        config.tesseract.languages,
        config.tesseract.oem,
        config.tesseract.psm,
        config.preprocess
    );

    let engine = TesseractEngine::new(&config.tesseract);
    check_engine(&engine, &config.tesseract.languages).await;

    let state = AppState {
        extractor: TextExtractor::new(Arc::new(engine)),
        config: Arc::new(config),
    };
    let bind_addr = state.config.bind_addr.clone();
    let app = build_router(state);

    // Run server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Log whether the engine is usable. Problems are reported, not fatal:
/// every request surfaces them again as an OCR error message.
async fn check_engine(engine: &dyn OcrEngine, languages: &str) {
    match engine.info().await {
        Ok(info) => {
            let missing = info.missing_languages(languages);
            if missing.is_empty() {
                info!("OCR engine ready: {}", info.version);
            } else {
                warn!(
                    "OCR engine {} is missing language packs {:?} (installed: {:?})",
                    info.version, missing, info.languages
                );
            }
        }
        Err(e) => warn!("OCR engine unavailable: {}", e),
    }
}

fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(index).post(submit_page))
        .route("/health", get(health))
        .route("/api/ocr", post(ocr_upload))
        .route("/api/highlight", post(highlight_text))
        .route("/api/engine", get(engine_info))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Empty upload page.
async fn index(State(state): State<AppState>) -> Html<String> {
    Html(page::render(&PageView {
        preprocess_default: state.config.preprocess,
        ..PageView::default()
    }))
}

/// Form submission: run OCR and render the results page.
async fn submit_page(State(state): State<AppState>, multipart: Multipart) -> Response {
    let upload = match upload::read_upload(multipart).await {
        Ok(upload) => upload,
        Err((status, message)) => {
            warn!("Rejected upload: {}", message);
            let html = page::render(&PageView {
                preprocess_default: state.config.preprocess,
                result: None,
                error: Some(message.as_str()),
            });
            return (status, Html(html)).into_response();
        }
    };

    let preprocess = upload.preprocess.unwrap_or(state.config.preprocess);
    info!(
        "Received file: {} ({} bytes), preprocess={}",
        upload.filename,
        upload.data.len(),
        preprocess
    );

    let extraction = state.extractor.extract(upload.data.clone(), preprocess).await;

    Html(page::render(&PageView {
        preprocess_default: preprocess,
        result: Some(ResultView {
            filename: &upload.filename,
            mime_type: upload.mime_type(),
            image: &upload.data,
            extraction: &extraction,
            keyword: upload.keyword.as_deref(),
        }),
        error: None,
    }))
    .into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OcrResponse {
    #[serde(flatten)]
    extraction: Extraction,
    keyword: Option<String>,
    highlighted: Option<String>,
    matches: usize,
}

impl OcrResponse {
    fn new(extraction: Extraction, keyword: Option<String>) -> Self {
        let (highlighted, matches) = match keyword.as_deref() {
            Some(k) => (
                Some(highlight::highlight(&extraction.text, k)),
                highlight::count_matches(&extraction.text, k),
            ),
            None => (None, 0),
        };
        Self {
            extraction,
            keyword,
            highlighted,
            matches,
        }
    }
}

/// Upload an image and get the extracted text as JSON.
async fn ocr_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<OcrResponse>, (StatusCode, String)> {
    let upload = upload::read_upload(multipart).await?;
    let preprocess = upload.preprocess.unwrap_or(state.config.preprocess);

    info!(
        "Received file: {} ({} bytes), preprocess={}",
        upload.filename,
        upload.data.len(),
        preprocess
    );

    let extraction = state.extractor.extract(upload.data, preprocess).await;
    Ok(Json(OcrResponse::new(extraction, upload.keyword)))
}

#[derive(Debug, Deserialize)]
struct HighlightRequest {
    text: String,
    #[serde(default)]
    keyword: String,
}

#[derive(Debug, Serialize)]
struct HighlightResponse {
    highlighted: String,
    matches: usize,
}

/// Highlight a keyword in text the client already has.
async fn highlight_text(Json(request): Json<HighlightRequest>) -> Json<HighlightResponse> {
    Json(HighlightResponse {
        highlighted: highlight::highlight(&request.text, &request.keyword),
        matches: highlight::count_matches(&request.text, &request.keyword),
    })
}

/// Report the OCR engine version and installed language packs.
async fn engine_info(
    State(state): State<AppState>,
) -> Result<Json<EngineInfo>, (StatusCode, String)> {
    state.extractor.engine().info().await.map(Json).map_err(|e| {
        error!("Engine info failed: {}", e);
        (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("OCR engine unavailable: {}", e),
        )
    })
}
