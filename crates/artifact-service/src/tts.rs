//! Cached text-to-speech

use crate::error::{Result, ServiceError};
use crate::speech::Synthesizer;
use artifact_cache::{normalize, ArtifactCache, ComputeError, Encoding, KeyDeriver, LookupResult};
use std::sync::Arc;
use tracing::debug;

/// Synthesizes URL-encoded text into cached MP3 audio
pub struct SpeechService {
    cache: ArtifactCache,
    keys: KeyDeriver,
    synthesizer: Arc<dyn Synthesizer>,
}

impl SpeechService {
    pub fn new(cache: ArtifactCache, keys: KeyDeriver, synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            cache,
            keys,
            synthesizer,
        }
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub async fn speak(&self, payload: &str, encoding: Encoding) -> Result<LookupResult> {
        if payload.is_empty() {
            return Err(ServiceError::MissingPayload);
        }

        let input = normalize(payload, encoding)?;
        let text = input.to_text()?;
        if text.trim().is_empty() {
            debug!(encoding = encoding.as_str(), "Speech payload decoded to nothing");
            return Ok(self.cache.record_empty());
        }

        let key = self.keys.derive_bytes(input.as_bytes());
        debug!(key = %key, encoding = encoding.as_str(), "Synthesizing speech");

        let text = text.to_string();
        let synthesizer = Arc::clone(&self.synthesizer);
        let result = self
            .cache
            .get_or_compute(&key, || async move {
                synthesizer
                    .synthesize(&text)
                    .await
                    .map_err(ComputeError::from)
            })
            .await?;
        Ok(result)
    }
}
