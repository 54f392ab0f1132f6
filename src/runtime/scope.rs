//! Worker global scope

use crate::error::SwcacheResult;
use async_trait::async_trait;
use tracing::debug;

/// Operations a handler may invoke on its host
#[async_trait]
pub trait WorkerScope: Send + Sync {
    /// Activate as soon as install finishes instead of waiting for the
    /// previous version's clients to close
    async fn skip_waiting(&self) -> SwcacheResult<()>;

    /// Take control of every client in scope, including ones loaded before
    /// this worker activated
    async fn claim(&self) -> SwcacheResult<()>;
}

/// Scope for an agent driven without a registration (one-shot CLI runs).
/// There are no clients and nothing to wait for.
pub struct DetachedScope;

#[async_trait]
impl WorkerScope for DetachedScope {
    async fn skip_waiting(&self) -> SwcacheResult<()> {
        debug!("skip_waiting on detached scope");
        Ok(())
    }

    async fn claim(&self) -> SwcacheResult<()> {
        debug!("claim on detached scope");
        Ok(())
    }
}
