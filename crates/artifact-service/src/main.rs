//! Artifact service - cached OpenGraph images and text-to-speech
//!
//! Renders social preview images and synthesizes speech on demand, keeping
//! every generated artifact in a content-addressed disk cache.

mod error;
mod opengraph;
mod render;
mod server;
mod speech;
mod tts;
mod types;

use crate::error::{Result, ServiceError};
use crate::opengraph::ImageService;
use crate::render::WkhtmlRenderer;
use crate::server::{start_server, ServerState, SharedState};
use crate::speech::GoogleSynthesizer;
use crate::tts::SpeechService;
use crate::types::{ServiceConfig, SpeechConfig};
use artifact_cache::{ArtifactCache, FileStore, KeyDeriver, SqliteStore};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("artifact_service=info".parse()?)
        .add_directive("artifact_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting artifact service...");

    let config = load_config()?;
    info!("Port: {}", config.port);
    info!("Image cache dir: {:?}", config.image_cache_dir);
    info!("Audio cache path: {:?}", config.audio_cache_path);
    info!("Cache retention: {} seconds", config.cache_retention_secs);

    let options = config.cache_options();
    let keys = KeyDeriver::with_namespace(config.cache_version.as_str());
    info!("Cache key namespace: {}", keys.namespace().unwrap_or("none"));

    // Images are stored as one PNG file per key
    let image_store = FileStore::new(&config.image_cache_dir, "png");
    image_store.init().await?;
    let image_cache = ArtifactCache::open(Arc::new(image_store), options.clone()).await?;

    // Audio lives in an embedded key-value index
    let audio_store = SqliteStore::open(&config.audio_cache_path).await?;
    let audio_cache = ArtifactCache::open(Arc::new(audio_store), options).await?;

    // Entries that expired while the service was down
    for cache in [&image_cache, &audio_cache] {
        if let Err(e) = cache.sweep_now().await {
            tracing::warn!(store = cache.store().kind(), error = %e, "Startup sweep failed");
        }
    }

    let images = ImageService::new(
        image_cache,
        keys.clone(),
        Arc::new(WkhtmlRenderer::new(config.wkhtmltoimage_bin.as_str())),
        config.template_dir.clone(),
        config.default_template.clone(),
    );
    let speech = SpeechService::new(
        audio_cache,
        keys,
        Arc::new(GoogleSynthesizer::new(config.tts.clone())?),
    );

    let state: SharedState = Arc::new(ServerState::new(images, speech));

    // Start HTTP server (blocking until shutdown)
    start_server(Arc::clone(&state), config.port, shutdown_signal()).await?;

    state.images.cache().close().await;
    state.speech.cache().close().await;
    info!("Artifact service stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse::<T>().ok())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn load_config() -> Result<ServiceConfig> {
    let defaults = ServiceConfig::default();
    let speech_defaults = SpeechConfig::default();

    let port = env_parse::<u16>("PORT").unwrap_or(defaults.port);

    let cache_retention_secs = env_parse::<u64>("CACHE_RETENTION_SECS")
        .unwrap_or(defaults.cache_retention_secs);
    if cache_retention_secs == 0 {
        return Err(ServiceError::Config(
            "CACHE_RETENTION_SECS must be positive".to_string(),
        ));
    }

    let compute_timeout_secs =
        env_parse::<u64>("COMPUTE_TIMEOUT_SECS").unwrap_or(defaults.compute_timeout_secs);
    if compute_timeout_secs == 0 {
        return Err(ServiceError::Config(
            "COMPUTE_TIMEOUT_SECS must be positive".to_string(),
        ));
    }

    let tts = SpeechConfig {
        endpoint: env_string("TTS_ENDPOINT").unwrap_or(speech_defaults.endpoint),
        language_code: env_string("TTS_LANGUAGE_CODE").unwrap_or(speech_defaults.language_code),
        voice_name: env_string("TTS_VOICE_NAME").unwrap_or(speech_defaults.voice_name),
        voice_gender: env_string("TTS_VOICE_GENDER").unwrap_or(speech_defaults.voice_gender),
        api_key: env_string("GOOGLE_TTS_API_KEY"),
        access_token: env_string("GOOGLE_TTS_ACCESS_TOKEN"),
    };

    Ok(ServiceConfig {
        port,
        image_cache_dir: env_string("IMAGE_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.image_cache_dir),
        audio_cache_path: env_string("AUDIO_CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.audio_cache_path),
        template_dir: env_string("TEMPLATE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.template_dir),
        default_template: env_string("DEFAULT_TEMPLATE").unwrap_or(defaults.default_template),
        wkhtmltoimage_bin: env_string("WKHTMLTOIMAGE_BIN").unwrap_or(defaults.wkhtmltoimage_bin),
        cache_retention_secs,
        compute_timeout_secs,
        purge_on_start: env_parse::<bool>("PURGE_ON_START").unwrap_or(defaults.purge_on_start),
        cache_version: env_string("CACHE_VERSION").unwrap_or(defaults.cache_version),
        tts,
    })
}
