//! HTTP server for the image and speech endpoints
//!
//! Provides `/` and `/demo` for OpenGraph images, `/tts/...` for speech and
//! `/health` for cache statistics.

use crate::error::{Result, ServiceError};
use crate::opengraph::{demo_request, ImageService};
use crate::tts::SpeechService;
use crate::types::{HealthResponse, OpenGraphRequest};
use artifact_cache::{Encoding, LookupResult};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

const X_STATUS: HeaderName = HeaderName::from_static("x-status");

const CACHE_POLICY: &str = "public, max-age=86400";

const HOME_TEXT: &str = "Possible Routes: /generate, /demo ; /tts";

const TTS_USAGE: &str = "Please give plain text (separated by _ instead of spaces) \
or base64 (with '+' replaced with '.', '/' replaced with '_' and '=' replaced with '-') \
or base58 to this endpoint. Example: /tts/hi, /tts/b64/aGk-, /tts/b58/8wr";

/// Shared state for the HTTP server
pub struct ServerState {
    pub images: ImageService,
    pub speech: SpeechService,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(images: ImageService, speech: SpeechService) -> Self {
        Self {
            images,
            speech,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(home).post(generate_image))
        .route("/demo", get(demo))
        .route("/health", get(health))
        .route("/tts", get(tts_usage).post(tts_usage))
        .route("/tts/", get(tts_missing).post(tts_missing))
        .route("/tts/{text}", get(tts_raw).post(tts_raw))
        .route("/tts/{encoding}/{text}", get(tts_encoded).post(tts_encoded))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server, returning once `shutdown` resolves
pub async fn start_server(
    state: SharedState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn home() -> &'static str {
    HOME_TEXT
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        images: state.images.cache().stats().await,
        audio: state.speech.cache().stats().await,
    })
}

async fn generate_image(
    State(state): State<SharedState>,
    Json(request): Json<OpenGraphRequest>,
) -> Result<Response> {
    let result = state.images.generate(request).await?;
    image_response(result)
}

async fn demo(State(state): State<SharedState>) -> Result<Response> {
    let result = state.images.generate(demo_request()).await?;
    image_response(result)
}

async fn tts_usage() -> (StatusCode, &'static str) {
    (StatusCode::BAD_REQUEST, TTS_USAGE)
}

async fn tts_missing() -> ServiceError {
    ServiceError::MissingPayload
}

async fn tts_raw(State(state): State<SharedState>, Path(text): Path<String>) -> Result<Response> {
    speak(&state, &text, Encoding::Raw).await
}

/// `/tts/b64/...` and `/tts/b58/...`; unknown tags are rejected before decoding
async fn tts_encoded(
    State(state): State<SharedState>,
    Path((encoding, text)): Path<(String, String)>,
) -> Result<Response> {
    let encoding: Encoding = encoding.parse()?;
    speak(&state, &text, encoding).await
}

async fn speak(state: &ServerState, payload: &str, encoding: Encoding) -> Result<Response> {
    let result = state.speech.speak(payload, encoding).await?;
    audio_response(result)
}

fn image_response(result: LookupResult) -> Result<Response> {
    let status = result.status();
    let data = result.into_artifact().ok_or(ServiceError::EmptyInput)?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, CACHE_POLICY),
            (X_STATUS, status),
        ],
        Body::from(data),
    )
        .into_response())
}

fn audio_response(result: LookupResult) -> Result<Response> {
    let status = result.status();
    let data = result.into_artifact().ok_or(ServiceError::EmptyInput)?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/mp3"),
            (header::ACCEPT_RANGES, "bytes"),
            (header::CONTENT_RANGE, "bytes 0-"),
            (header::CONTENT_DISPOSITION, "inline; filename=tts.mp3"),
            (header::CACHE_CONTROL, CACHE_POLICY),
            (X_STATUS, status),
        ],
        Body::from(data),
    )
        .into_response())
}
