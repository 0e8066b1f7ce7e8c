//! Age-based eviction

use crate::error::Result;
use crate::store::BlobStore;
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Remove entries older than `retention`
pub async fn sweep<S: BlobStore + ?Sized>(store: &S, retention: Duration) -> Result<usize> {
    sweep_at(store, retention, Utc::now()).await
}

/// Remove entries whose modification time is before `now - retention`
pub async fn sweep_at<S: BlobStore + ?Sized>(
    store: &S,
    retention: Duration,
    now: DateTime<Utc>,
) -> Result<usize> {
    let retention = TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX);
    let Some(cutoff) = now.checked_sub_signed(retention) else {
        // Nothing can be older than the start of time
        return Ok(0);
    };

    let removed = store.sweep_older_than(cutoff).await?;
    if removed > 0 {
        info!(store = store.kind(), removed, cutoff = %cutoff, "Swept expired entries");
    } else {
        debug!(store = store.kind(), cutoff = %cutoff, "Sweep found nothing to remove");
    }
    Ok(removed)
}

/// Enumerate and remove expired entries one by one.
///
/// Failed removals are logged and skipped.
pub(crate) async fn remove_older_than<S: BlobStore + ?Sized>(
    store: &S,
    cutoff: DateTime<Utc>,
) -> Result<usize> {
    let mut removed = 0;
    for entry in store.entries().await? {
        if entry.modified_at >= cutoff {
            continue;
        }
        match store.remove(&entry.key).await {
            Ok(true) => removed += 1,
            Ok(false) => debug!(key = %entry.key, "Entry vanished before removal"),
            Err(e) => warn!(key = %entry.key, error = %e, "Failed to remove expired entry"),
        }
    }
    Ok(removed)
}

pub(crate) async fn purge_entries<S: BlobStore + ?Sized>(store: &S) -> Result<usize> {
    let mut removed = 0;
    for entry in store.entries().await? {
        match store.remove(&entry.key).await {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(e) => warn!(key = %entry.key, error = %e, "Failed to purge entry"),
        }
    }
    Ok(removed)
}
