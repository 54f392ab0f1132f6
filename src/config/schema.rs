//! Configuration schema for swcache
//!
//! Configuration is stored at `~/.config/swcache/config.toml`

use crate::cache::key::{bucket_name, validate_bucket_name};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Agent identity and install policy
    pub agent: AgentConfig,

    /// Resources pre-cached at install
    pub manifest: ManifestConfig,

    /// Network fetch settings
    pub network: NetworkConfig,

    /// Cache bucket storage
    pub storage: StorageConfig,
}

impl Config {
    /// Check values serde cannot enforce. Returns the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.agent.app_name.trim().is_empty() {
            return Err("agent.app_name must not be empty".to_string());
        }
        if self.agent.version.trim().is_empty() {
            return Err("agent.version must not be empty".to_string());
        }
        validate_bucket_name(&self.agent.cache_name()).map_err(|e| e.to_string())?;
        self.agent.scope_url()?;

        if let Some(pos) = self
            .manifest
            .resources
            .iter()
            .position(|r| r.trim().is_empty())
        {
            return Err(format!("manifest.resources[{pos}] is empty"));
        }

        if self.network.max_body_bytes == 0 {
            return Err("network.max_body_bytes must be greater than 0".to_string());
        }

        if !matches!(self.general.log_format.as_str(), "text" | "json") {
            return Err(format!(
                "general.log_format must be \"text\" or \"json\", got \"{}\"",
                self.general.log_format
            ));
        }

        Ok(())
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Append lifecycle events as JSON lines to `<storage>/events.log`
    pub event_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            event_log: true,
        }
    }
}

/// Agent identity and install policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Application name, the prefix of every bucket name
    pub app_name: String,

    /// Generation tag. Bumping it on deploy invalidates every older bucket.
    pub version: String,

    /// Base URL that manifest entries and request paths resolve against
    pub scope: String,

    /// Fail install when the manifest cannot be fully cached.
    /// When false, the failure is reported and install proceeds.
    pub fail_on_cache_miss: bool,
}

impl AgentConfig {
    /// Name of the bucket owned by this version
    pub fn cache_name(&self) -> String {
        bucket_name(&self.app_name, &self.version)
    }

    /// Parsed scope URL. Always ends with `/` so relative entries resolve inside it.
    pub fn scope_url(&self) -> Result<Url, String> {
        let mut scope = self.scope.clone();
        if !scope.ends_with('/') {
            scope.push('/');
        }
        Url::parse(&scope).map_err(|e| format!("agent.scope '{}' is not a URL: {}", self.scope, e))
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            app_name: "app".to_string(),
            version: "v1".to_string(),
            scope: "http://localhost:8080/".to_string(),
            fail_on_cache_miss: false,
        }
    }
}

/// Manifest of resources cached at install
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Resource paths, relative to agent.scope or absolute
    pub resources: Vec<String>,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            resources: vec![
                "/".to_string(),
                "index.html".to_string(),
                "manifest.json".to_string(),
            ],
        }
    }
}

/// Network fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,

    /// User-Agent header sent with network requests
    pub user_agent: String,

    /// Largest response body accepted, in bytes
    pub max_body_bytes: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("swcache/", env!("CARGO_PKG_VERSION")).to_string(),
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Cache bucket storage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Bucket directory (defaults to the data directory)
    pub dir: Option<PathBuf>,
}
