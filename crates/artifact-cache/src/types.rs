//! Cache types

use crate::key::CacheKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default age after which an entry is swept
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Default upper bound on a single artifact computation
pub const DEFAULT_COMPUTE_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome of a get-or-compute lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupResult {
    /// Computed by this call and stored
    Fresh(Vec<u8>),
    /// Served from the store without computing
    Cached(Vec<u8>),
    /// The input was empty or unusable; nothing was computed or stored
    Empty,
}

impl LookupResult {
    /// Status label, as reported in the `X-Status` header
    pub fn status(&self) -> &'static str {
        match self {
            LookupResult::Fresh(_) => "fresh",
            LookupResult::Cached(_) => "cached",
            LookupResult::Empty => "empty",
        }
    }

    pub fn artifact(&self) -> Option<&[u8]> {
        match self {
            LookupResult::Fresh(data) | LookupResult::Cached(data) => Some(data),
            LookupResult::Empty => None,
        }
    }

    pub fn into_artifact(self) -> Option<Vec<u8>> {
        match self {
            LookupResult::Fresh(data) | LookupResult::Cached(data) => Some(data),
            LookupResult::Empty => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, LookupResult::Fresh(_))
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, LookupResult::Cached(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, LookupResult::Empty)
    }
}

/// Metadata for a stored entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub hits: u64,
    pub misses: u64,
    pub fresh: u64,
    pub empty: u64,
}

/// Tuning for an [`ArtifactCache`](crate::ArtifactCache)
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub retention: Duration,
    pub compute_timeout: Duration,
    /// Empty the store when the cache is opened
    pub purge_on_start: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
            compute_timeout: DEFAULT_COMPUTE_TIMEOUT,
            purge_on_start: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyDeriver;

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.fresh, 0);
        assert_eq!(stats.empty, 0);
    }

    #[test]
    fn test_default_options() {
        let options = CacheOptions::default();
        assert_eq!(options.retention, Duration::from_secs(86_400));
        assert_eq!(options.compute_timeout, Duration::from_secs(60));
        assert!(!options.purge_on_start);
    }

    #[test]
    fn test_lookup_result_accessors() {
        let fresh = LookupResult::Fresh(b"png".to_vec());
        assert_eq!(fresh.status(), "fresh");
        assert_eq!(fresh.artifact(), Some(&b"png"[..]));
        assert!(fresh.is_fresh());

        let cached = LookupResult::Cached(b"mp3".to_vec());
        assert_eq!(cached.status(), "cached");
        assert_eq!(cached.into_artifact(), Some(b"mp3".to_vec()));

        assert_eq!(LookupResult::Empty.status(), "empty");
        assert_eq!(LookupResult::Empty.artifact(), None);
    }

    #[test]
    fn test_cache_entry_serialization() {
        let entry = CacheEntry {
            key: KeyDeriver::new().derive_bytes(b"abc"),
            size: 12345,
            modified_at: Utc::now(),
        };

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(entry.key.as_str()));
        assert!(json.contains("12345"));

        let deserialized: CacheEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.key, entry.key);
        assert_eq!(deserialized.size, entry.size);
    }
}
