//! Request identity and bucket naming
//!
//! A cache entry is keyed by method + absolute URL. Only GET identities
//! exist; a request with any other method has no key and never reaches a
//! bucket.

use crate::error::{SwcacheError, SwcacheResult};
use crate::network::{Method, Request, Response};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Identity of a cached request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: Method,
    /// Absolute URL without fragment
    pub url: String,
}

impl RequestKey {
    /// Key for a GET of `url`
    pub fn get(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: Method::Get,
            url: url.to_string(),
        }
    }

    /// Key for a request, or `None` when the method is not cacheable
    pub fn for_request(request: &Request) -> Option<Self> {
        if !request.method.is_cacheable() {
            return None;
        }
        Some(Self::get(&request.url))
    }

    /// Stable file-safe digest of the identity (first 16 hex chars of SHA256)
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.method.as_str().as_bytes());
        hasher.update(b" ");
        hasher.update(self.url.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..8])
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A request/response pair ready to be stored
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: RequestKey,
    pub response: Response,
}

impl CacheEntry {
    /// Pair a request with its response, rejecting non-GET requests
    pub fn new(request: &Request, response: Response) -> SwcacheResult<Self> {
        let key = RequestKey::for_request(request)
            .ok_or(SwcacheError::MethodNotCacheable(request.method))?;
        Ok(Self { key, response })
    }
}

/// Build the version-stamped bucket name: `<app>-cache-<version>`
pub fn bucket_name(app_name: &str, version: &str) -> String {
    format!("{}-cache-{}", app_name, version)
}

/// Reject bucket names that cannot be used as a single directory name
pub fn validate_bucket_name(name: &str) -> SwcacheResult<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name == "." || name == ".." {
        Some("name is a relative path component")
    } else if name.contains(['/', '\\', '\0']) {
        Some("name contains a path separator")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(SwcacheError::BucketName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
