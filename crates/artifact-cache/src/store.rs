//! Persistent blob storage
//!
//! [`BlobStore`] is the seam between the cache and its backend. Every
//! backend keeps one whole blob per key and tracks its modification time,
//! which is all the sweeper needs.

use crate::error::{Result, StoreError};
use crate::key::CacheKey;
use crate::sweep;
use crate::types::CacheEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// A key to blob mapping backed by persistent storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short backend name used in logs
    fn kind(&self) -> &'static str;

    async fn contains(&self, key: &CacheKey) -> Result<bool>;

    /// Read a blob. A missing entry is `Ok(None)`; an unusable one is
    /// [`StoreError::Corrupt`].
    async fn read(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;

    /// Store a blob. Readers never observe a partial write, and the blob is
    /// durable once this returns: for file backends that includes syncing the
    /// directory entry created by the final rename.
    async fn write(&self, key: &CacheKey, data: &[u8]) -> Result<()>;

    /// Remove an entry, returning whether it existed
    async fn remove(&self, key: &CacheKey) -> Result<bool>;

    async fn entries(&self) -> Result<Vec<CacheEntry>>;

    /// Remove every entry
    async fn purge_all(&self) -> Result<usize> {
        sweep::purge_entries(self).await
    }

    /// Remove entries last modified before `cutoff`
    async fn sweep_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        sweep::remove_older_than(self, cutoff).await
    }

    /// Flush and release the backend
    async fn close(&self) {}
}

const FILE_PREFIX: &str = "__cached__";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One file per artifact, named `__cached__{key}.{extension}`.
///
/// Other files in the directory are ignored, so it may be shared.
pub struct FileStore {
    dir: PathBuf,
    extension: String,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    /// Ensure the storage directory exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        info!(dir = ?self.dir, extension = %self.extension, "File store initialized");
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}{}.{}", FILE_PREFIX, key, self.extension))
    }

    fn temp_path_for(&self, key: &CacheKey) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            ".{}{}.{}.{}-{}.tmp",
            FILE_PREFIX,
            key,
            self.extension,
            std::process::id(),
            n
        ))
    }

    fn key_from_file_name(&self, name: &str) -> Option<CacheKey> {
        let stem = name
            .strip_prefix(FILE_PREFIX)?
            .strip_suffix(self.extension.as_str())?
            .strip_suffix('.')?;
        CacheKey::parse(stem)
    }
}

/// Flush directory metadata so a completed rename survives a crash
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl BlobStore for FileStore {
    fn kind(&self) -> &'static str {
        "file"
    }

    async fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(fs::try_exists(self.path_for(key)).await?)
    }

    async fn read(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match fs::read(&path).await {
            // Writes never produce empty files
            Ok(data) if data.is_empty() => Err(StoreError::Corrupt(format!(
                "empty artifact file {}",
                path.display()
            ))),
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &CacheKey, data: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        let temp = self.temp_path_for(key);

        let written = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        sync_dir(&self.dir).await?;

        debug!(key = %key, size = data.len(), "Wrote artifact file");
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;

        while let Some(item) = dir.next_entry().await? {
            let Some(key) = item.file_name().to_str().and_then(|n| self.key_from_file_name(n))
            else {
                continue;
            };

            // Files can disappear between listing and stat
            let metadata = match item.metadata().await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            entries.push(CacheEntry {
                key,
                size: metadata.len(),
                modified_at: DateTime::<Utc>::from(metadata.modified()?),
            });
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyDeriver;
    use tempfile::tempdir;

    fn key(input: &str) -> CacheKey {
        KeyDeriver::new().derive_bytes(input.as_bytes())
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), "png");
        store.init().await.unwrap();

        let k = key("a");
        assert!(!store.contains(&k).await.unwrap());
        assert_eq!(store.read(&k).await.unwrap(), None);

        store.write(&k, b"\x89PNG").await.unwrap();

        assert!(store.contains(&k).await.unwrap());
        assert_eq!(store.read(&k).await.unwrap(), Some(b"\x89PNG".to_vec()));
    }

    #[tokio::test]
    async fn test_file_name_embeds_key_and_kind() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), "png");
        store.init().await.unwrap();

        let k = key("a");
        store.write(&k, b"data").await.unwrap();

        let expected = dir.path().join(format!("__cached__{}.png", k));
        assert!(expected.exists());

        // No temp files are left behind
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sync_dir_flushes_existing_directory() {
        let dir = tempdir().unwrap();
        sync_dir(dir.path()).await.unwrap();

        let missing = dir.path().join("gone");
        assert!(sync_dir(&missing).await.is_err());
    }

    #[tokio::test]
    async fn test_write_fails_without_directory() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("never-created"), "png");

        let k = key("a");
        assert!(matches!(store.write(&k, b"data").await, Err(StoreError::Io(_))));
        assert_eq!(store.read(&k).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_ignore_foreign_files() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), "png");
        store.init().await.unwrap();

        std::fs::write(dir.path().join("unrelated.txt"), b"keep").unwrap();
        std::fs::write(dir.path().join("__cached__nothex.png"), b"keep").unwrap();
        std::fs::write(dir.path().join(format!("__cached__{}.mp3", key("b"))), b"keep").unwrap();

        let k = key("a");
        store.write(&k, b"12345").await.unwrap();

        let entries = store.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, k);
        assert_eq!(entries[0].size, 5);

        assert_eq!(store.purge_all().await.unwrap(), 1);
        assert!(dir.path().join("unrelated.txt").exists());
        assert!(dir.path().join("__cached__nothex.png").exists());
    }

    #[tokio::test]
    async fn test_empty_file_is_corrupt() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), "png");
        store.init().await.unwrap();

        let k = key("a");
        std::fs::write(store.path_for(&k), b"").unwrap();

        assert!(matches!(store.read(&k).await, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_remove_missing_entry() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), "png");
        store.init().await.unwrap();

        let k = key("a");
        assert!(!store.remove(&k).await.unwrap());

        store.write(&k, b"data").await.unwrap();
        assert!(store.remove(&k).await.unwrap());
        assert!(!store.contains(&k).await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_whole_blob() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), "mp3");
        store.init().await.unwrap();

        let k = key("a");
        store.write(&k, b"a much longer first blob").await.unwrap();
        store.write(&k, b"short").await.unwrap();

        assert_eq!(store.read(&k).await.unwrap(), Some(b"short".to_vec()));
    }
}
