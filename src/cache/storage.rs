//! Cache storage abstraction
//!
//! The agent never touches buckets directly; it is handed a `CacheStorage`
//! capability. Backends: in-memory (tests, embedding) and directory-backed
//! (CLI).

use crate::cache::key::{CacheEntry, RequestKey};
use crate::error::{SwcacheError, SwcacheResult};
use crate::network::{Request, Response};
use async_trait::async_trait;

/// Named cache buckets of request -> response pairs
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a bucket, creating it if absent
    async fn open(&self, name: &str) -> SwcacheResult<()>;

    /// Check whether a bucket exists
    async fn has(&self, name: &str) -> SwcacheResult<bool>;

    /// Bucket names in creation order
    async fn keys(&self) -> SwcacheResult<Vec<String>>;

    /// Delete a bucket, returning whether it existed
    async fn delete(&self, name: &str) -> SwcacheResult<bool>;

    /// Store a batch of entries. Either every entry is stored or none is.
    async fn put_all(&self, name: &str, entries: Vec<CacheEntry>) -> SwcacheResult<()>;

    /// Look up one identity in one bucket
    async fn match_in(&self, name: &str, key: &RequestKey) -> SwcacheResult<Option<Response>>;

    /// Request identities stored in a bucket
    async fn entries(&self, name: &str) -> SwcacheResult<Vec<RequestKey>>;

    /// Store a single entry
    async fn put(&self, name: &str, entry: CacheEntry) -> SwcacheResult<()> {
        self.put_all(name, vec![entry]).await
    }

    /// Look up a request across all buckets, oldest bucket first.
    ///
    /// Non-GET requests never match.
    async fn match_request(&self, request: &Request) -> SwcacheResult<Option<Response>> {
        let Some(key) = RequestKey::for_request(request) else {
            return Ok(None);
        };

        for name in self.keys().await? {
            match self.match_in(&name, &key).await {
                Ok(Some(response)) => return Ok(Some(response)),
                Ok(None) => {}
                // Deleted between listing and lookup
                Err(SwcacheError::BucketNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }
}

/// Reject entries whose identity is not cacheable
pub(crate) fn ensure_cacheable(entries: &[CacheEntry]) -> SwcacheResult<()> {
    match entries.iter().find(|e| !e.key.method.is_cacheable()) {
        Some(entry) => Err(SwcacheError::MethodNotCacheable(entry.key.method)),
        None => Ok(()),
    }
}
