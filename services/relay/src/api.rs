use crate::config::ApiConfig;
use crate::error::RelayError;
use crate::frame_store::{content_type_for, FrameStore};
use crate::ingest::{FrameIngestor, ImagePayload, UploadReceipt};
use crate::latest::LatestRegister;
use crate::naming::Clock;
use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Request, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

const VIEWER_PAGE: &str = include_str!("../static/index.html");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn FrameStore>,
    pub latest: Arc<LatestRegister>,
    pub ingestor: Arc<FrameIngestor>,
}

impl AppState {
    /// Wire a fresh, empty latest pointer to the given store and clock.
    pub fn new(store: Arc<dyn FrameStore>, clock: Arc<dyn Clock>) -> Self {
        let latest = Arc::new(LatestRegister::new());
        let ingestor = Arc::new(FrameIngestor::new(store.clone(), latest.clone(), clock));

        Self {
            store,
            latest,
            ingestor,
        }
    }
}

/// Retrieval descriptor for the latest frame
#[derive(Debug, Serialize)]
pub struct LatestResponse {
    pub filename: String,
    pub timestamp: String,
    pub url: String,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/upload", post(upload_image))
        .route("/latest", get(latest_image))
        .route("/images/:filename", get(get_image))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Viewer page
async fn index() -> Html<&'static str> {
    Html(VIEWER_PAGE)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "frame-relay"
    }))
}

/// Accept one frame, as a multipart file or a base64 form field
#[instrument(skip(state, request))]
async fn upload_image(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<UploadReceipt>, RelayError> {
    let payload = read_payload(request).await.map_err(|e| {
        warn!(error = %e, "Rejected upload");
        metrics::counter!("relay.upload.rejected").increment(1);
        e
    })?;

    let receipt = state.ingestor.ingest(payload).await?;

    Ok(Json(receipt))
}

/// Current latest-frame descriptor
#[instrument(skip(state))]
async fn latest_image(State(state): State<AppState>) -> Result<Json<LatestResponse>, RelayError> {
    let frame = state
        .latest
        .get()
        .ok_or_else(|| RelayError::NotFound("No image uploaded yet".to_string()))?;

    Ok(Json(LatestResponse {
        url: format!("/images/{}", frame.filename),
        filename: frame.filename,
        timestamp: frame.timestamp,
    }))
}

/// Raw bytes of a stored frame
#[instrument(skip(state))]
async fn get_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, RelayError> {
    let bytes = state.store.get(&filename).await?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(&filename)),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        bytes,
    )
        .into_response())
}

/// Pull the `image` payload out of a multipart or urlencoded body.
async fn read_payload(request: Request) -> Result<ImagePayload, RelayError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| body_error(e.status(), e.body_text()))?;
        read_multipart(multipart).await
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(mut fields) = Form::<HashMap<String, String>>::from_request(request, &())
            .await
            .map_err(|e| body_error(e.status(), e.body_text()))?;
        ImagePayload::select(None, fields.remove("image"))
    } else {
        ImagePayload::select(None, None)
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<ImagePayload, RelayError> {
    let mut file = None;
    let mut field_text = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| body_error(e.status(), e.body_text()))?
    {
        if field.name() != Some("image") {
            continue;
        }

        // Parts with a filename are files, the rest are plain form fields
        match field.file_name().map(str::to_owned) {
            Some(filename) if file.is_none() => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| body_error(e.status(), e.body_text()))?;
                file = Some((filename, bytes.to_vec()));
            }
            None if field_text.is_none() => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| body_error(e.status(), e.body_text()))?;
                field_text = Some(text);
            }
            _ => {}
        }
    }

    ImagePayload::select(file, field_text)
}

fn body_error(status: StatusCode, message: String) -> RelayError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        RelayError::TooLarge(message)
    } else {
        RelayError::Decode(message)
    }
}

/// Start the relay API server, returning once `shutdown` resolves
pub async fn start_api_server<F>(state: AppState, config: &ApiConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting frame relay API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
