//! Error types for swcache
//!
//! All modules use `SwcacheResult<T>` as their return type.

use crate::network::Method;
use crate::runtime::Phase;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for swcache operations
pub type SwcacheResult<T> = Result<T, SwcacheError>;

/// All errors that can occur in swcache
#[derive(Error, Debug)]
pub enum SwcacheError {
    // Lifecycle errors
    #[error("Invalid lifecycle transition: {from} -> {to}")]
    InvalidPhase { from: Phase, to: Phase },

    #[error("Worker {0} is not the active worker of this registration")]
    NotActive(String),

    #[error("No worker is waiting to activate")]
    NothingWaiting,

    #[error("Worker {0} was superseded by a newer version")]
    Superseded(String),

    #[error("respond_with was already called for this fetch event")]
    AlreadyResponded,

    #[error("Install failed for {cache}: {reason}")]
    InstallFailed { cache: String, reason: String },

    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    #[error("Client not found: {0}")]
    ClientNotFound(String),

    // Cache errors
    #[error("Cache bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Invalid cache bucket name '{name}': {reason}")]
    BucketName { name: String, reason: String },

    #[error("Only GET requests can be cached, got {0}")]
    MethodNotCacheable(Method),

    #[error("Failed to precache {url}: {reason}")]
    Precache { url: String, reason: String },

    #[error("Corrupt cache entry {path}: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    // Network errors
    #[error("Network fetch failed for {url}: {reason}")]
    NetworkFetch { url: String, reason: String },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl SwcacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a network fetch error
    pub fn network(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::NetworkFetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error came from the lifecycle state machine rather than IO
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::InvalidPhase { .. }
                | Self::NotActive(_)
                | Self::NothingWaiting
                | Self::Superseded(_)
                | Self::AlreadyResponded
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::BucketNotFound(_) => Some("Run: swcache install"),
            Self::NetworkFetch { .. } => {
                Some("Check that agent.scope points at a reachable origin")
            }
            Self::ConfigInvalid { .. } => Some("Run: swcache config show"),
            Self::InstallFailed { .. } => {
                Some("Set agent.fail_on_cache_miss = false to tolerate precache failures")
            }
            _ => None,
        }
    }
}
