//! Error types for the artifact service

use artifact_cache::{CacheError, ComputeError, DecodeError, StoreError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum ServiceError {
    /// The request carried no payload at all
    MissingPayload,
    /// The payload decoded to nothing usable
    EmptyInput,
    Decode(DecodeError),
    InvalidTemplate(String),
    /// Rendering or synthesis backend failure
    Collaborator(ComputeError),
    Timeout(Duration),
    Store(StoreError),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::MissingPayload => write!(f, "Missing text"),
            ServiceError::EmptyInput => write!(f, "No content"),
            ServiceError::Decode(err) => write!(f, "Decode error: {}", err),
            ServiceError::InvalidTemplate(name) => write!(f, "Invalid template: {}", name),
            ServiceError::Collaborator(err) => write!(f, "Generation failed: {}", err),
            ServiceError::Timeout(limit) => {
                write!(f, "Generation timed out after {} seconds", limit.as_secs())
            }
            ServiceError::Store(err) => write!(f, "Cache error: {}", err),
            ServiceError::Io(err) => write!(f, "IO error: {}", err),
            ServiceError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceError::Decode(err) => Some(err),
            ServiceError::Collaborator(err) => Some(err.as_ref()),
            ServiceError::Store(err) => Some(err),
            ServiceError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::MissingPayload => StatusCode::NOT_FOUND,
            ServiceError::EmptyInput
            | ServiceError::Decode(_)
            | ServiceError::InvalidTemplate(_) => StatusCode::BAD_REQUEST,
            ServiceError::Collaborator(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Store(_) | ServiceError::Io(_) | ServiceError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            match status {
                StatusCode::BAD_GATEWAY => "Generation failed".to_string(),
                StatusCode::GATEWAY_TIMEOUT => "Generation timed out".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        };

        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

impl From<CacheError> for ServiceError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Store(err) => ServiceError::Store(err),
            CacheError::Compute(err) => ServiceError::Collaborator(err),
            CacheError::Timeout(limit) => ServiceError::Timeout(limit),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        ServiceError::Store(err)
    }
}

impl From<DecodeError> for ServiceError {
    fn from(err: DecodeError) -> Self {
        ServiceError::Decode(err)
    }
}

impl From<crate::speech::SynthesisError> for ServiceError {
    fn from(err: crate::speech::SynthesisError) -> Self {
        ServiceError::Config(err.to_string())
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ServiceError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ServiceError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
