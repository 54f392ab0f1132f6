//! Events the agent reports to its observer

use crate::network::Method;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Mutex, PoisonError};

/// Something observable the agent did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentEvent {
    InstallStarted {
        cache: String,
        resources: usize,
    },
    /// The manifest could not be fully cached. `fatal` reflects the
    /// fail-on-cache-miss policy in force.
    PrecacheFailed {
        cache: String,
        reason: String,
        fatal: bool,
    },
    InstallCompleted {
        cache: String,
        cached: usize,
    },
    ActivateStarted {
        cache: String,
    },
    BucketDeleted {
        bucket: String,
    },
    BucketDeleteFailed {
        bucket: String,
        reason: String,
    },
    ActivateCompleted {
        cache: String,
        deleted: usize,
    },
    /// Request left to the host's default network handling
    PassedThrough {
        method: Method,
        url: String,
    },
    ServedFromCache {
        url: String,
    },
    ServedFromNetwork {
        url: String,
        status: u16,
    },
    /// Cache miss and the network failed too
    NetworkFailed {
        url: String,
        reason: String,
    },
    /// Storage errored during lookup; treated as a miss
    CacheLookupFailed {
        url: String,
        reason: String,
    },
}

impl AgentEvent {
    /// Dotted event name used in the event log
    pub fn name(&self) -> &'static str {
        match self {
            Self::InstallStarted { .. } => "install.started",
            Self::PrecacheFailed { .. } => "install.precache_failed",
            Self::InstallCompleted { .. } => "install.completed",
            Self::ActivateStarted { .. } => "activate.started",
            Self::BucketDeleted { .. } => "activate.bucket_deleted",
            Self::BucketDeleteFailed { .. } => "activate.bucket_delete_failed",
            Self::ActivateCompleted { .. } => "activate.completed",
            Self::PassedThrough { .. } => "fetch.passed_through",
            Self::ServedFromCache { .. } => "fetch.cache",
            Self::ServedFromNetwork { .. } => "fetch.network",
            Self::NetworkFailed { .. } => "fetch.network_failed",
            Self::CacheLookupFailed { .. } => "fetch.cache_lookup_failed",
        }
    }

    /// Events that indicate something went wrong
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::PrecacheFailed { .. }
                | Self::BucketDeleteFailed { .. }
                | Self::NetworkFailed { .. }
                | Self::CacheLookupFailed { .. }
        )
    }
}

/// Receives agent events. Implementations must not fail the caller.
#[async_trait]
pub trait AgentObserver: Send + Sync {
    async fn notify(&self, event: &AgentEvent);
}

/// Discards every event
pub struct SilentObserver;

#[async_trait]
impl AgentObserver for SilentObserver {
    async fn notify(&self, _event: &AgentEvent) {}
}

/// Keeps every event in memory, in order
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<AgentEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AgentEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn failures(&self) -> Vec<AgentEvent> {
        self.events().into_iter().filter(AgentEvent::is_failure).collect()
    }
}

#[async_trait]
impl AgentObserver for RecordingObserver {
    async fn notify(&self, event: &AgentEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
