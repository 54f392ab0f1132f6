//! Lifecycle events handed to handlers
//!
//! Handlers never run work to completion themselves. They register futures
//! on the event and the host awaits them before the worker moves on, which
//! keeps the host from tearing the worker down mid-operation.

use crate::error::{SwcacheError, SwcacheResult};
use crate::network::{Request, Response};
use crate::runtime::scope::WorkerScope;
use futures_util::future::{join_all, BoxFuture};
use std::future::Future;
use std::sync::Arc;

/// Work registered through `wait_until`
pub type PendingWork = BoxFuture<'static, SwcacheResult<()>>;

/// Response registered through `respond_with`
pub type PendingResponse = BoxFuture<'static, SwcacheResult<Response>>;

/// Which lifecycle signal an extendable event carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleKind {
    Install,
    Activate,
}

/// Install or activate event
pub struct ExtendableEvent {
    kind: LifecycleKind,
    scope: Arc<dyn WorkerScope>,
    pending: Vec<PendingWork>,
}

impl ExtendableEvent {
    pub fn new(kind: LifecycleKind, scope: Arc<dyn WorkerScope>) -> Self {
        Self {
            kind,
            scope,
            pending: Vec::new(),
        }
    }

    pub fn kind(&self) -> LifecycleKind {
        self.kind
    }

    /// Handle to the worker's global scope (skip_waiting, claim)
    pub fn scope(&self) -> Arc<dyn WorkerScope> {
        Arc::clone(&self.scope)
    }

    /// Keep the phase open until `work` settles
    pub fn wait_until<F>(&mut self, work: F)
    where
        F: Future<Output = SwcacheResult<()>> + Send + 'static,
    {
        self.pending.push(Box::pin(work));
    }

    /// Number of registered futures
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Await every registered future. All of them run to completion; the
    /// first failure (in registration order) is returned.
    pub async fn settle(self) -> SwcacheResult<()> {
        match join_all(self.pending).await.into_iter().find_map(Result::err) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Per-request fetch event
pub struct FetchEvent {
    request: Request,
    response: Option<PendingResponse>,
    extensions: Vec<PendingWork>,
}

impl FetchEvent {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            response: None,
            extensions: Vec::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Take over the response for this request. May be called once.
    pub fn respond_with<F>(&mut self, response: F) -> SwcacheResult<()>
    where
        F: Future<Output = SwcacheResult<Response>> + Send + 'static,
    {
        if self.response.is_some() {
            return Err(SwcacheError::AlreadyResponded);
        }
        self.response = Some(Box::pin(response));
        Ok(())
    }

    /// Extend the event's lifetime past the response
    pub fn wait_until<F>(&mut self, work: F)
    where
        F: Future<Output = SwcacheResult<()>> + Send + 'static,
    {
        self.extensions.push(Box::pin(work));
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    pub fn into_parts(self) -> (Request, Option<PendingResponse>, Vec<PendingWork>) {
        (self.request, self.response, self.extensions)
    }
}
