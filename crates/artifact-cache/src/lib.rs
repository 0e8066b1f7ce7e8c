//! Content-addressed artifact cache
//!
//! Derives stable keys from structured requests, normalizes URL-encoded
//! payloads, stores computed blobs on disk or in an embedded SQLite
//! database, and sweeps entries older than a retention window.

mod cache;
mod encoding;
mod error;
mod key;
mod sqlite;
mod store;
mod sweep;
mod types;

pub use cache::ArtifactCache;
pub use encoding::{
    decode_base64_url_custom, encode_base64_url_custom, normalize, Encoding, NormalizedInput,
};
pub use error::{CacheError, ComputeError, DecodeError, Result, StoreError};
pub use key::{derive, CacheKey, KeyDeriver, RequestContext, KEY_LEN};
pub use sqlite::SqliteStore;
pub use store::{BlobStore, FileStore};
pub use sweep::{sweep, sweep_at};
pub use types::{
    CacheEntry, CacheOptions, CacheStats, LookupResult, DEFAULT_COMPUTE_TIMEOUT,
    DEFAULT_RETENTION,
};
