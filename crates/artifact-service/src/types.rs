//! Core types for the artifact service

use artifact_cache::{CacheOptions, CacheStats};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TTS_ENDPOINT: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

/// Configuration for the artifact service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub image_cache_dir: PathBuf,
    pub audio_cache_path: PathBuf,
    pub template_dir: PathBuf,
    pub default_template: String,
    pub wkhtmltoimage_bin: String,
    pub cache_retention_secs: u64,
    pub compute_timeout_secs: u64,
    pub purge_on_start: bool,
    /// Folded into every cache key; bump it when templates or voices change
    pub cache_version: String,
    pub tts: SpeechConfig,
}

impl ServiceConfig {
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            retention: Duration::from_secs(self.cache_retention_secs),
            compute_timeout: Duration::from_secs(self.compute_timeout_secs),
            purge_on_start: self.purge_on_start,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 3005,
            image_cache_dir: PathBuf::from("./cache/images"),
            audio_cache_path: PathBuf::from("./cache/tts.db"),
            template_dir: PathBuf::from("./templates"),
            default_template: "template.html".to_string(),
            wkhtmltoimage_bin: "wkhtmltoimage".to_string(),
            cache_retention_secs: 24 * 60 * 60, // 24 hours
            compute_timeout_secs: 60,
            purge_on_start: false,
            cache_version: env!("CARGO_PKG_VERSION").to_string(),
            tts: SpeechConfig::default(),
        }
    }
}

/// Voice and credentials for the speech backend
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub endpoint: String,
    pub language_code: String,
    pub voice_name: String,
    pub voice_gender: String,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_TTS_ENDPOINT.to_string(),
            language_code: "nl-NL".to_string(),
            voice_name: "nl-NL-Wavenet-D".to_string(),
            voice_gender: "FEMALE".to_string(),
            api_key: None,
            access_token: None,
        }
    }
}

/// Body of an image generation request.
///
/// Unknown string fields are kept; they reach the template and the cache key.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenGraphRequest {
    pub icon: String,
    pub title: String,
    pub img: String,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub images: CacheStats,
    pub audio: CacheStats,
}
