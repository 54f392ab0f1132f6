//! In-memory cache storage

use crate::cache::key::{validate_bucket_name, CacheEntry, RequestKey};
use crate::cache::storage::{ensure_cacheable, CacheStorage};
use crate::error::{SwcacheError, SwcacheResult};
use crate::network::Response;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

struct MemoryBucket {
    name: String,
    entries: BTreeMap<RequestKey, Response>,
}

/// Buckets held in process memory, kept in creation order
#[derive(Default)]
pub struct MemoryCacheStorage {
    buckets: RwLock<Vec<MemoryBucket>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> SwcacheResult<()> {
        validate_bucket_name(name)?;

        let mut buckets = self.buckets.write().await;
        if !buckets.iter().any(|b| b.name == name) {
            buckets.push(MemoryBucket {
                name: name.to_string(),
                entries: BTreeMap::new(),
            });
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> SwcacheResult<bool> {
        Ok(self.buckets.read().await.iter().any(|b| b.name == name))
    }

    async fn keys(&self) -> SwcacheResult<Vec<String>> {
        Ok(self
            .buckets
            .read()
            .await
            .iter()
            .map(|b| b.name.clone())
            .collect())
    }

    async fn delete(&self, name: &str) -> SwcacheResult<bool> {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|b| b.name != name);
        Ok(buckets.len() != before)
    }

    async fn put_all(&self, name: &str, entries: Vec<CacheEntry>) -> SwcacheResult<()> {
        ensure_cacheable(&entries)?;

        let mut buckets = self.buckets.write().await;
        let bucket = buckets
            .iter_mut()
            .find(|b| b.name == name)
            .ok_or_else(|| SwcacheError::BucketNotFound(name.to_string()))?;

        for entry in entries {
            bucket.entries.insert(entry.key, entry.response);
        }
        Ok(())
    }

    async fn match_in(&self, name: &str, key: &RequestKey) -> SwcacheResult<Option<Response>> {
        let buckets = self.buckets.read().await;
        let bucket = buckets
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| SwcacheError::BucketNotFound(name.to_string()))?;

        Ok(bucket.entries.get(key).cloned())
    }

    async fn entries(&self, name: &str) -> SwcacheResult<Vec<RequestKey>> {
        let buckets = self.buckets.read().await;
        let bucket = buckets
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| SwcacheError::BucketNotFound(name.to_string()))?;

        Ok(bucket.entries.keys().cloned().collect())
    }
}
