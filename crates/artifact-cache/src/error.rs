//! Error types for the artifact cache

use std::fmt;
use std::time::Duration;

/// Errors raised by a [`BlobStore`](crate::BlobStore) backend
#[derive(Debug)]
pub enum StoreError {
    Io(Box<std::io::Error>),
    Database(Box<sqlx::Error>),
    /// An entry exists but its contents cannot be used
    Corrupt(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "IO error: {}", err),
            StoreError::Database(err) => write!(f, "Database error: {}", err),
            StoreError::Corrupt(msg) => write!(f, "Corrupt entry: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(err) => Some(err.as_ref()),
            StoreError::Database(err) => Some(err.as_ref()),
            StoreError::Corrupt(_) => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(Box::new(err))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(Box::new(err))
    }
}

/// Failure reported by the collaborator that produces an artifact
pub type ComputeError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by [`ArtifactCache`](crate::ArtifactCache)
#[derive(Debug)]
pub enum CacheError {
    Store(StoreError),
    Compute(ComputeError),
    Timeout(Duration),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Store(err) => write!(f, "Storage error: {}", err),
            CacheError::Compute(err) => write!(f, "Compute error: {}", err),
            CacheError::Timeout(limit) => {
                write!(f, "Compute timed out after {} ms", limit.as_millis())
            }
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Store(err) => Some(err),
            CacheError::Compute(err) => Some(err.as_ref()),
            CacheError::Timeout(_) => None,
        }
    }
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        CacheError::Store(err)
    }
}

/// Errors raised while normalizing an encoded payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Base64(base64::DecodeError),
    Base58(bs58::decode::Error),
    InvalidUtf8(std::str::Utf8Error),
    UnknownEncoding(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Base64(err) => write!(f, "Invalid base64 payload: {}", err),
            DecodeError::Base58(err) => write!(f, "Invalid base58 payload: {}", err),
            DecodeError::InvalidUtf8(err) => write!(f, "Payload is not valid UTF-8: {}", err),
            DecodeError::UnknownEncoding(tag) => write!(f, "Unknown encoding: {}", tag),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Base64(err) => Some(err),
            DecodeError::Base58(err) => Some(err),
            DecodeError::InvalidUtf8(err) => Some(err),
            DecodeError::UnknownEncoding(_) => None,
        }
    }
}

impl From<base64::DecodeError> for DecodeError {
    fn from(err: base64::DecodeError) -> Self {
        DecodeError::Base64(err)
    }
}

impl From<bs58::decode::Error> for DecodeError {
    fn from(err: bs58::decode::Error) -> Self {
        DecodeError::Base58(err)
    }
}

impl From<std::str::Utf8Error> for DecodeError {
    fn from(err: std::str::Utf8Error) -> Self {
        DecodeError::InvalidUtf8(err)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
