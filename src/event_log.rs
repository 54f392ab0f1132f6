//! Persistent agent event log
//!
//! Writes JSON lines to `<storage dir>/events.log` so a deploy can be
//! inspected after the fact (what was cached, which buckets were cleared,
//! what was served offline).

use crate::agent::events::{AgentEvent, AgentObserver};
use crate::config::{schema::Config, ConfigManager};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// Observer that appends every agent event to a file
pub struct EventLog {
    enabled: bool,
    path: PathBuf,
    // Serializes appends from concurrent observers
    write: Mutex<()>,
}

impl EventLog {
    /// Create an event log inside a storage directory
    pub fn new(config: &Config, storage_dir: &Path) -> Self {
        Self::at(
            ConfigManager::event_log_path(storage_dir),
            config.general.event_log,
        )
    }

    pub fn at(path: PathBuf, enabled: bool) -> Self {
        Self {
            enabled,
            path,
            write: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an event as a JSON line.
    ///
    /// IO failures are logged and dropped. The log must never fail a fetch.
    pub async fn log(&self, event: &AgentEvent) {
        if !self.enabled {
            return;
        }

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event.name(),
            "data": event,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize agent event: {}", e);
                return;
            }
        };
        line.push('\n');

        let _guard = self.write.lock().await;
        if let Err(e) = self.append(&line).await {
            warn!("Failed to write event log {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl AgentObserver for EventLog {
    async fn notify(&self, event: &AgentEvent) {
        self.log(event).await;
    }
}
