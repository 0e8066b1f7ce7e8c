//! Google Cloud Text-to-Speech client

use crate::types::SpeechConfig;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug)]
pub enum SynthesisError {
    Http(Box<reqwest::Error>),
    Api { status: u16, message: String },
    InvalidAudio(base64::DecodeError),
}

impl fmt::Display for SynthesisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthesisError::Http(err) => write!(f, "HTTP error: {}", err),
            SynthesisError::Api { status, message } => {
                write!(f, "Speech API returned status {}: {}", status, message)
            }
            SynthesisError::InvalidAudio(err) => write!(f, "Invalid audio content: {}", err),
        }
    }
}

impl std::error::Error for SynthesisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SynthesisError::Http(err) => Some(err.as_ref()),
            SynthesisError::InvalidAudio(err) => Some(err),
            SynthesisError::Api { .. } => None,
        }
    }
}

impl From<reqwest::Error> for SynthesisError {
    fn from(err: reqwest::Error) -> Self {
        SynthesisError::Http(Box::new(err.without_url()))
    }
}

/// Turns text (or SSML) into MP3 bytes
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError>;
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisInput<'a> {
    Text(&'a str),
    Ssml(&'a str),
}

impl<'a> SynthesisInput<'a> {
    /// Input starting with `<speak>` is SSML, anything else is plain text
    pub fn detect(text: &'a str) -> Self {
        if text.starts_with("<speak>") {
            SynthesisInput::Ssml(text)
        } else {
            SynthesisInput::Text(text)
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
    ssml_gender: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Synthesizer backed by the Cloud TTS `text:synthesize` REST endpoint
pub struct GoogleSynthesizer {
    client: Client,
    config: SpeechConfig,
}

impl GoogleSynthesizer {
    pub fn new(config: SpeechConfig) -> Result<Self, SynthesisError> {
        Self::with_timeout(config, Duration::from_secs(30))
    }

    pub fn with_timeout(config: SpeechConfig, timeout: Duration) -> Result<Self, SynthesisError> {
        if config.api_key.is_none() && config.access_token.is_none() {
            warn!("No speech API credentials configured, synthesis requests will be rejected");
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }

    fn request_body<'a>(&'a self, text: &'a str) -> SynthesizeRequest<'a> {
        SynthesizeRequest {
            input: SynthesisInput::detect(text),
            voice: VoiceSelection {
                language_code: &self.config.language_code,
                name: &self.config.voice_name,
                ssml_gender: &self.config.voice_gender,
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
            },
        }
    }
}

#[async_trait]
impl Synthesizer for GoogleSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .json(&self.request_body(text));
        if let Some(key) = &self.config.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        debug!(
            chars = text.chars().count(),
            voice = %self.config.voice_name,
            "Requesting speech synthesis"
        );
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            warn!(status, "Speech synthesis failed");
            return Err(SynthesisError::Api { status, message });
        }

        let body: SynthesizeResponse = response.json().await?;
        let audio = STANDARD
            .decode(body.audio_content)
            .map_err(SynthesisError::InvalidAudio)?;

        debug!(size = audio.len(), "Synthesized speech");
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_ssml() {
        assert_eq!(
            SynthesisInput::detect("<speak>hoi</speak>"),
            SynthesisInput::Ssml("<speak>hoi</speak>")
        );
        assert_eq!(SynthesisInput::detect("hi there"), SynthesisInput::Text("hi there"));
    }

    #[test]
    fn test_request_body_serialization() {
        let synthesizer = GoogleSynthesizer::new(SpeechConfig::default()).unwrap();
        let json = serde_json::to_value(synthesizer.request_body("hi there")).unwrap();

        assert_eq!(json["input"]["text"], "hi there");
        assert_eq!(json["voice"]["languageCode"], "nl-NL");
        assert_eq!(json["voice"]["name"], "nl-NL-Wavenet-D");
        assert_eq!(json["voice"]["ssmlGender"], "FEMALE");
        assert_eq!(json["audioConfig"]["audioEncoding"], "MP3");
    }

    #[test]
    fn test_ssml_request_body() {
        let synthesizer = GoogleSynthesizer::new(SpeechConfig::default()).unwrap();
        let json = serde_json::to_value(synthesizer.request_body("<speak>hoi</speak>")).unwrap();

        assert_eq!(json["input"]["ssml"], "<speak>hoi</speak>");
        assert!(json["input"].get("text").is_none());
    }

    #[test]
    fn test_response_deserialization() {
        let response: SynthesizeResponse =
            serde_json::from_str(r#"{"audioContent": "SUQz"}"#).unwrap();
        assert_eq!(STANDARD.decode(response.audio_content).unwrap(), b"ID3");
    }

    #[test]
    fn test_api_error_display() {
        let err = SynthesisError::Api {
            status: 403,
            message: "quota exceeded".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Speech API returned status 403: quota exceeded"
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let config = SpeechConfig {
            endpoint: "http://127.0.0.1:9/v1/text:synthesize".to_string(),
            api_key: Some("test".to_string()),
            ..SpeechConfig::default()
        };
        let synthesizer = GoogleSynthesizer::with_timeout(config, Duration::from_secs(2)).unwrap();

        let result = synthesizer.synthesize("hi there").await;
        assert!(matches!(result, Err(SynthesisError::Http(_))));
    }

    #[tokio::test]
    async fn test_http_error_omits_credentials() {
        let config = SpeechConfig {
            endpoint: "http://127.0.0.1:9/v1/text:synthesize".to_string(),
            api_key: Some("SECRETKEY".to_string()),
            ..SpeechConfig::default()
        };
        let synthesizer = GoogleSynthesizer::with_timeout(config, Duration::from_secs(2)).unwrap();

        let err = synthesizer.synthesize("hi there").await.unwrap_err();
        assert!(!format!("{}", err).contains("SECRETKEY"));
        assert!(!format!("{:?}", err).contains("SECRETKEY"));
    }
}
