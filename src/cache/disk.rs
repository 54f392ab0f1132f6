//! Directory-backed cache storage
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/<bucket>/bucket.json          bucket metadata (name, created_at)
//! <root>/<bucket>/<digest>.json        entry metadata (identity, status, headers)
//! <root>/<bucket>/<digest>.body        raw response body
//! ```
//!
//! `<digest>` is `RequestKey::digest()`. Batch writes are staged under
//! `.tmp` names and only renamed into place once every file is written.
//! Files a batch replaces are kept under `.bak` names until the batch
//! commits, so a failed commit restores the bucket as it was.

use crate::cache::key::{validate_bucket_name, CacheEntry, RequestKey};
use crate::cache::storage::{ensure_cacheable, CacheStorage};
use crate::error::{SwcacheError, SwcacheResult};
use crate::network::{Headers, Response};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const BUCKET_META: &str = "bucket.json";
const STAGING_SUFFIX: &str = ".tmp";
const BACKUP_SUFFIX: &str = ".bak";

/// Format bytes as human-readable size (e.g., "1.5 MB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Bucket metadata persisted next to the entries
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BucketMeta {
    name: String,
    created_at: DateTime<Utc>,
}

/// Entry metadata persisted next to the body
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    key: RequestKey,
    status: u16,
    headers: Headers,
    response_url: String,
    stored_at: DateTime<Utc>,
}

/// Summary of a bucket on disk
#[derive(Debug, Clone, Serialize)]
pub struct BucketInfo {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub entries: usize,
    pub size_bytes: u64,
}

/// Buckets stored as directories under a root
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    /// Open storage rooted at `root`, creating the directory if needed
    pub async fn new(root: impl Into<PathBuf>) -> SwcacheResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            SwcacheError::io(format!("creating cache storage {}", root.display()), e)
        })?;
        Ok(Self { root })
    }

    /// Storage root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, name: &str) -> SwcacheResult<PathBuf> {
        validate_bucket_name(name)?;
        Ok(self.root.join(name))
    }

    fn existing_bucket_dir(&self, name: &str) -> SwcacheResult<PathBuf> {
        let dir = self.bucket_dir(name)?;
        if !dir.join(BUCKET_META).exists() {
            return Err(SwcacheError::BucketNotFound(name.to_string()));
        }
        Ok(dir)
    }

    async fn read_bucket_meta(path: &Path) -> Option<BucketMeta> {
        let content = fs::read_to_string(path).await.ok()?;
        serde_json::from_str(&content).ok()
    }

    async fn read_entry_meta(path: &Path) -> SwcacheResult<EntryMeta> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| SwcacheError::io(format!("reading cache entry {}", path.display()), e))?;
        serde_json::from_str(&content).map_err(|e| SwcacheError::CacheCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    async fn write_staged(
        dir: &Path,
        entry: &CacheEntry,
        staged: &mut Vec<(PathBuf, PathBuf)>,
    ) -> SwcacheResult<()> {
        let digest = entry.key.digest();
        let meta = EntryMeta {
            key: entry.key.clone(),
            status: entry.response.status,
            headers: entry.response.headers.clone(),
            response_url: entry.response.url.clone(),
            stored_at: Utc::now(),
        };

        let body_path = dir.join(format!("{digest}.body"));
        let body_tmp = dir.join(format!("{digest}.body{STAGING_SUFFIX}"));
        fs::write(&body_tmp, &entry.response.body)
            .await
            .map_err(|e| SwcacheError::io(format!("writing {}", body_tmp.display()), e))?;
        staged.push((body_tmp, body_path));

        let meta_path = dir.join(format!("{digest}.json"));
        let meta_tmp = dir.join(format!("{digest}.json{STAGING_SUFFIX}"));
        fs::write(&meta_tmp, serde_json::to_string_pretty(&meta)?)
            .await
            .map_err(|e| SwcacheError::io(format!("writing {}", meta_tmp.display()), e))?;
        staged.push((meta_tmp, meta_path));

        Ok(())
    }

    /// Move staged files into place.
    ///
    /// On failure every file already moved is taken back out, replaced
    /// files are restored and the remaining staged files are removed.
    async fn commit_staged(staged: Vec<(PathBuf, PathBuf)>) -> SwcacheResult<()> {
        let mut committed: Vec<(PathBuf, Option<PathBuf>)> = Vec::with_capacity(staged.len());
        let mut pending = staged.into_iter();
        let mut failure = None;

        for (tmp, path) in pending.by_ref() {
            match Self::commit_one(&tmp, &path).await {
                Ok(backup) => committed.push((path, backup)),
                Err(e) => {
                    remove_quietly(&tmp).await;
                    failure = Some(e);
                    break;
                }
            }
        }

        let Some(err) = failure else {
            for backup in committed.into_iter().filter_map(|(_, backup)| backup) {
                remove_quietly(&backup).await;
            }
            return Ok(());
        };

        for (tmp, _) in pending {
            remove_quietly(&tmp).await;
        }
        for (path, backup) in committed.into_iter().rev() {
            remove_quietly(&path).await;
            if let Some(backup) = backup {
                restore(&backup, &path).await;
            }
        }
        Err(err)
    }

    /// Rename one staged file into place, keeping any file it replaces.
    /// Returns the backup path of the replaced file.
    async fn commit_one(tmp: &Path, path: &Path) -> SwcacheResult<Option<PathBuf>> {
        let replaces_file = fs::metadata(path).await.is_ok_and(|m| m.is_file());
        let backup = if replaces_file {
            let backup = with_suffix(path, BACKUP_SUFFIX);
            fs::rename(path, &backup)
                .await
                .map_err(|e| SwcacheError::io(format!("backing up {}", path.display()), e))?;
            Some(backup)
        } else {
            None
        };

        if let Err(e) = fs::rename(tmp, path).await {
            if let Some(backup) = &backup {
                restore(backup, path).await;
            }
            return Err(SwcacheError::io(format!("committing {}", path.display()), e));
        }
        Ok(backup)
    }

    /// Describe a bucket: entry count and total body size
    pub async fn bucket_info(&self, name: &str) -> SwcacheResult<BucketInfo> {
        let dir = self.existing_bucket_dir(name)?;
        let meta = Self::read_bucket_meta(&dir.join(BUCKET_META))
            .await
            .ok_or_else(|| SwcacheError::CacheCorrupt {
                path: dir.join(BUCKET_META),
                reason: "unreadable bucket metadata".to_string(),
            })?;

        let mut entries = 0;
        let mut size_bytes = 0;
        let mut listing = fs::read_dir(&dir)
            .await
            .map_err(|e| SwcacheError::io(format!("reading bucket {}", dir.display()), e))?;
        while let Some(item) = listing
            .next_entry()
            .await
            .map_err(|e| SwcacheError::io("reading bucket entry", e))?
        {
            let path = item.path();
            if path.extension().is_some_and(|ext| ext == "body") {
                entries += 1;
                size_bytes += item.metadata().await.map(|m| m.len()).unwrap_or(0);
            }
        }

        Ok(BucketInfo {
            name: meta.name,
            created_at: meta.created_at,
            entries,
            size_bytes,
        })
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!("Failed to remove {}: {}", path.display(), e);
    }
}

async fn restore(backup: &Path, path: &Path) {
    if let Err(e) = fs::rename(backup, path).await {
        warn!("Failed to restore {}: {}", path.display(), e);
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> SwcacheResult<()> {
        let dir = self.bucket_dir(name)?;
        let meta_path = dir.join(BUCKET_META);
        if meta_path.exists() {
            return Ok(());
        }

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| SwcacheError::io(format!("creating bucket {}", dir.display()), e))?;

        let meta = BucketMeta {
            name: name.to_string(),
            created_at: Utc::now(),
        };
        fs::write(&meta_path, serde_json::to_string_pretty(&meta)?)
            .await
            .map_err(|e| SwcacheError::io(format!("writing {}", meta_path.display()), e))?;

        debug!("Created bucket {}", name);
        Ok(())
    }

    async fn has(&self, name: &str) -> SwcacheResult<bool> {
        Ok(self.bucket_dir(name)?.join(BUCKET_META).exists())
    }

    async fn keys(&self) -> SwcacheResult<Vec<String>> {
        let mut buckets = vec![];
        let mut listing = fs::read_dir(&self.root).await.map_err(|e| {
            SwcacheError::io(format!("reading cache storage {}", self.root.display()), e)
        })?;

        while let Some(item) = listing
            .next_entry()
            .await
            .map_err(|e| SwcacheError::io("reading cache storage entry", e))?
        {
            let path = item.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(meta) = Self::read_bucket_meta(&path.join(BUCKET_META)).await {
                buckets.push(meta);
            }
        }

        buckets.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(buckets.into_iter().map(|m| m.name).collect())
    }

    async fn delete(&self, name: &str) -> SwcacheResult<bool> {
        let dir = self.bucket_dir(name)?;
        if !dir.exists() {
            return Ok(false);
        }

        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| SwcacheError::io(format!("deleting bucket {}", dir.display()), e))?;
        debug!("Deleted bucket {}", name);
        Ok(true)
    }

    async fn put_all(&self, name: &str, entries: Vec<CacheEntry>) -> SwcacheResult<()> {
        ensure_cacheable(&entries)?;
        let dir = self.existing_bucket_dir(name)?;

        let mut staged = Vec::with_capacity(entries.len() * 2);
        for entry in &entries {
            if let Err(e) = Self::write_staged(&dir, entry, &mut staged).await {
                for (tmp, _) in &staged {
                    remove_quietly(tmp).await;
                }
                return Err(e);
            }
        }

        Self::commit_staged(staged).await?;

        debug!("Stored {} entries in bucket {}", entries.len(), name);
        Ok(())
    }

    async fn match_in(&self, name: &str, key: &RequestKey) -> SwcacheResult<Option<Response>> {
        let dir = self.existing_bucket_dir(name)?;
        let digest = key.digest();
        let meta_path = dir.join(format!("{digest}.json"));

        if !meta_path.exists() {
            return Ok(None);
        }

        let meta = Self::read_entry_meta(&meta_path).await?;
        if &meta.key != key {
            // Digest collision with a different identity
            return Ok(None);
        }

        let body_path = dir.join(format!("{digest}.body"));
        let body = fs::read(&body_path)
            .await
            .map_err(|e| SwcacheError::io(format!("reading {}", body_path.display()), e))?;

        Ok(Some(Response {
            status: meta.status,
            headers: meta.headers,
            body,
            url: meta.response_url,
        }))
    }

    async fn entries(&self, name: &str) -> SwcacheResult<Vec<RequestKey>> {
        let dir = self.existing_bucket_dir(name)?;
        let mut keys = vec![];
        let mut listing = fs::read_dir(&dir)
            .await
            .map_err(|e| SwcacheError::io(format!("reading bucket {}", dir.display()), e))?;

        while let Some(item) = listing
            .next_entry()
            .await
            .map_err(|e| SwcacheError::io("reading bucket entry", e))?
        {
            let path = item.path();
            let is_entry = path.extension().is_some_and(|ext| ext == "json")
                && path.file_name().is_some_and(|f| f != BUCKET_META);
            if is_entry {
                keys.push(Self::read_entry_meta(&path).await?.key);
            }
        }

        keys.sort();
        Ok(keys)
    }
}
