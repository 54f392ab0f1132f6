//! Host runtime for caching agents
//!
//! The runtime plays the part a browser plays for a service worker: it owns
//! the registration, delivers install, activate and fetch events, and tracks
//! which worker controls which client.

mod event;
mod phase;
mod registration;
mod scope;

pub use event::{ExtendableEvent, FetchEvent, LifecycleKind, PendingResponse, PendingWork};
pub use phase::Phase;
pub use registration::{ClientId, Registration, WorkerId};
pub use scope::{DetachedScope, WorkerScope};

use std::sync::Arc;

/// Event handlers a worker registers with its host.
///
/// Handlers return immediately; long-running work is attached to the event
/// with `wait_until` or `respond_with`.
pub trait LifecycleHandler: Send + Sync {
    /// Human-readable worker name for logs
    fn name(&self) -> &str;

    fn on_install(self: Arc<Self>, event: &mut ExtendableEvent);

    fn on_activate(self: Arc<Self>, event: &mut ExtendableEvent);

    /// Leaving the event without a response passes the request through
    fn on_fetch(self: Arc<Self>, event: &mut FetchEvent);
}
