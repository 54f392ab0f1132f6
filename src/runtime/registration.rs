//! Worker registration
//!
//! A registration owns every version of the agent registered for one scope
//! and the clients (pages) that scope serves. It drives each version through
//! its phases:
//!
//! ```text
//! register ──▶ Installing ──▶ Waiting ──▶ Active ──▶ Superseded
//!                  │             │
//!                  └─────────────┴──▶ Superseded
//! ```
//!
//! Only one worker holds each of the installing, waiting and active slots.
//! A newer worker taking a slot supersedes the previous holder and cancels
//! any work it still has in flight.

use crate::error::{SwcacheError, SwcacheResult};
use crate::network::{Fetcher, Request, Response};
use crate::runtime::event::{ExtendableEvent, FetchEvent, LifecycleKind};
use crate::runtime::phase::Phase;
use crate::runtime::scope::WorkerScope;
use crate::runtime::LifecycleHandler;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Identifier of a registered worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(Uuid);

impl WorkerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", &self.0.simple().to_string()[..8])
    }
}

/// Identifier of a client (page) in scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", &self.0.simple().to_string()[..8])
    }
}

struct Worker {
    name: String,
    /// Released once the worker is superseded
    handler: Option<Arc<dyn LifecycleHandler>>,
    phase: Phase,
    skip_waiting: bool,
    superseded: watch::Sender<bool>,
}

impl Worker {
    fn supersede(&mut self, id: WorkerId) {
        if self.phase.is_terminal() {
            return;
        }
        debug!("{} ({}) {} -> superseded", id, self.name, self.phase);
        self.phase = Phase::Superseded;
        self.handler = None;
        self.superseded.send_replace(true);
    }

    /// Handler of a live worker
    fn live_handler(&self, id: WorkerId) -> SwcacheResult<Arc<dyn LifecycleHandler>> {
        self.handler
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| SwcacheError::Superseded(id.to_string()))
    }
}

#[derive(Default)]
struct RegistrationState {
    workers: HashMap<WorkerId, Worker>,
    installing: Option<WorkerId>,
    waiting: Option<WorkerId>,
    active: Option<WorkerId>,
    /// Client -> controlling worker
    clients: HashMap<ClientId, Option<WorkerId>>,
}

impl RegistrationState {
    fn supersede(&mut self, id: WorkerId) {
        if let Some(worker) = self.workers.get_mut(&id) {
            worker.supersede(id);
        }
    }

    fn worker_mut(&mut self, id: WorkerId) -> SwcacheResult<&mut Worker> {
        self.workers
            .get_mut(&id)
            .ok_or_else(|| SwcacheError::WorkerNotFound(id.to_string()))
    }

    fn controls_any_client(&self, id: WorkerId) -> bool {
        self.clients.values().any(|c| *c == Some(id))
    }
}

/// Host-side registration for one scope
pub struct Registration {
    scope: Url,
    network: Arc<dyn Fetcher>,
    state: Mutex<RegistrationState>,
}

impl Registration {
    /// `network` serves requests no worker intercepts
    pub fn new(scope: Url, network: Arc<dyn Fetcher>) -> Arc<Self> {
        Arc::new(Self {
            scope,
            network,
            state: Mutex::new(RegistrationState::default()),
        })
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    fn state(&self) -> MutexGuard<'_, RegistrationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(self: &Arc<Self>, worker: WorkerId) -> Arc<dyn WorkerScope> {
        Arc::new(ScopeHandle {
            registration: Arc::clone(self),
            worker,
        })
    }

    /// Register a new version and run its install phase.
    ///
    /// On success the worker is left waiting, or active when nothing was
    /// active before or it called `skip_waiting`. An install failure leaves
    /// the previous version untouched.
    pub async fn register(
        self: &Arc<Self>,
        handler: Arc<dyn LifecycleHandler>,
    ) -> SwcacheResult<WorkerId> {
        let id = WorkerId::new();
        let mut superseded = {
            let mut state = self.state();
            if let Some(previous) = state.installing.take() {
                info!("{} replaces {} mid-install", id, previous);
                state.supersede(previous);
            }
            let (sender, receiver) = watch::channel(false);
            state.workers.insert(
                id,
                Worker {
                    name: handler.name().to_string(),
                    handler: Some(Arc::clone(&handler)),
                    phase: Phase::Installing,
                    skip_waiting: false,
                    superseded: sender,
                },
            );
            state.installing = Some(id);
            receiver
        };
        info!("Installing {} ({})", id, handler.name());

        let mut event = ExtendableEvent::new(LifecycleKind::Install, self.handle(id));
        Arc::clone(&handler).on_install(&mut event);
        let outcome = tokio::select! {
            result = event.settle() => result,
            _ = wait_superseded(&mut superseded) => Err(SwcacheError::Superseded(id.to_string())),
        };

        let activate_now = {
            let mut guard = self.state();
            let state = &mut *guard;
            if state.installing == Some(id) {
                state.installing = None;
            }

            let worker = state.worker_mut(id)?;
            if worker.phase.is_terminal() {
                return Err(SwcacheError::Superseded(id.to_string()));
            }
            if let Err(e) = outcome {
                warn!("Install of {} failed: {}", id, e);
                worker.supersede(id);
                return Err(e);
            }
            worker.phase = worker.phase.transition(Phase::Waiting)?;
            let skip = worker.skip_waiting;

            if let Some(previous) = state.waiting.replace(id) {
                state.supersede(previous);
            }
            let blocked = state
                .active
                .is_some_and(|active| state.controls_any_client(active));
            debug!("{} waiting (skip_waiting: {}, blocked: {})", id, skip, blocked);
            skip || !blocked
        };

        if activate_now {
            self.activate_waiting().await?;
        }
        Ok(id)
    }

    /// Promote the waiting worker to active and run its activate phase.
    ///
    /// Clients controlled by the previous active worker move to the new one.
    /// Failed activation work is logged; the worker still becomes active.
    pub async fn activate_waiting(self: &Arc<Self>) -> SwcacheResult<WorkerId> {
        let (id, handler, mut superseded) = {
            let mut guard = self.state();
            let state = &mut *guard;
            let id = state.waiting.take().ok_or(SwcacheError::NothingWaiting)?;

            if let Some(previous) = state.active.replace(id) {
                state.supersede(previous);
                for controller in state.clients.values_mut() {
                    if *controller == Some(previous) {
                        *controller = Some(id);
                    }
                }
                info!("{} superseded by {}", previous, id);
            }

            let worker = state.worker_mut(id)?;
            (id, worker.live_handler(id)?, worker.superseded.subscribe())
        };
        info!("Activating {} ({})", id, handler.name());

        let mut event = ExtendableEvent::new(LifecycleKind::Activate, self.handle(id));
        handler.on_activate(&mut event);
        let outcome = tokio::select! {
            result = event.settle() => result,
            _ = wait_superseded(&mut superseded) => Err(SwcacheError::Superseded(id.to_string())),
        };
        match outcome {
            Err(e @ SwcacheError::Superseded(_)) => return Err(e),
            Err(e) => warn!("Activation work for {} failed: {}", id, e),
            Ok(()) => {}
        }

        let mut state = self.state();
        let worker = state.worker_mut(id)?;
        if worker.phase.is_terminal() {
            return Err(SwcacheError::Superseded(id.to_string()));
        }
        worker.phase = worker.phase.transition(Phase::Active)?;
        info!("{} active", id);
        Ok(id)
    }

    /// Take control of every client for the active worker
    fn claim(&self, worker: WorkerId) -> SwcacheResult<usize> {
        let mut state = self.state();
        if state.active != Some(worker) {
            return Err(SwcacheError::NotActive(worker.to_string()));
        }
        for controller in state.clients.values_mut() {
            *controller = Some(worker);
        }
        debug!("{} claimed {} client(s)", worker, state.clients.len());
        Ok(state.clients.len())
    }

    /// Mark a worker as skipping the waiting phase. Returns true when it is
    /// already waiting and should activate now.
    fn skip_waiting(&self, id: WorkerId) -> SwcacheResult<bool> {
        let mut guard = self.state();
        let state = &mut *guard;
        let worker = state.worker_mut(id)?;
        if worker.phase.is_terminal() {
            return Err(SwcacheError::Superseded(id.to_string()));
        }
        worker.skip_waiting = true;
        Ok(worker.phase == Phase::Waiting && state.waiting == Some(id))
    }

    /// Open a client. It is controlled by the active worker, if there is one.
    pub fn add_client(&self) -> ClientId {
        let id = ClientId::new();
        let mut state = self.state();
        let controller = state
            .active
            .filter(|active| state.workers.get(active).is_some_and(|w| w.phase.handles_fetch()));
        state.clients.insert(id, controller);
        debug!("{} opened (controller: {:?})", id, controller);
        id
    }

    /// Close a client. When no client remains under the active worker, a
    /// waiting worker activates.
    pub async fn remove_client(self: &Arc<Self>, client: ClientId) -> SwcacheResult<()> {
        let activate = {
            let mut state = self.state();
            state
                .clients
                .remove(&client)
                .ok_or_else(|| SwcacheError::ClientNotFound(client.to_string()))?;
            let released = state
                .active
                .map_or(true, |active| !state.controls_any_client(active));
            state.waiting.is_some() && released
        };
        debug!("{} closed", client);

        if activate {
            self.activate_waiting().await?;
        }
        Ok(())
    }

    /// Worker controlling a client
    pub fn controller(&self, client: ClientId) -> Option<WorkerId> {
        self.state().clients.get(&client).copied().flatten()
    }

    pub fn phase(&self, worker: WorkerId) -> Option<Phase> {
        self.state().workers.get(&worker).map(|w| w.phase)
    }

    pub fn installing(&self) -> Option<WorkerId> {
        self.state().installing
    }

    pub fn waiting(&self) -> Option<WorkerId> {
        self.state().waiting
    }

    pub fn active(&self) -> Option<WorkerId> {
        self.state().active
    }

    /// Dispatch a request from a client.
    ///
    /// Uncontrolled clients, and controllers that are not active yet, go
    /// straight to the network. Otherwise the controller's fetch handler
    /// decides; without a `respond_with` the request falls through to the
    /// network too.
    pub async fn fetch(&self, client: ClientId, request: Request) -> SwcacheResult<Response> {
        let target = {
            let state = self.state();
            let controller = *state
                .clients
                .get(&client)
                .ok_or_else(|| SwcacheError::ClientNotFound(client.to_string()))?;
            controller.and_then(|id| {
                state
                    .workers
                    .get(&id)
                    .filter(|w| w.phase.handles_fetch())
                    .and_then(|w| w.handler.clone().map(|h| (id, h, w.superseded.subscribe())))
            })
        };

        let Some((worker, handler, mut superseded)) = target else {
            debug!("{} uncontrolled, {} {} goes to network", client, request.method, request.url);
            return self.network.fetch(&request).await;
        };

        let mut event = FetchEvent::new(request);
        handler.on_fetch(&mut event);
        let (request, response, extensions) = event.into_parts();

        if !extensions.is_empty() {
            tokio::spawn(async move {
                for result in join_all(extensions).await {
                    if let Err(e) = result {
                        debug!("Fetch event work failed: {}", e);
                    }
                }
            });
        }

        match response {
            Some(pending) => tokio::select! {
                result = pending => result,
                _ = wait_superseded(&mut superseded) => Err(SwcacheError::Superseded(worker.to_string())),
            },
            None => {
                debug!("{} passed {} {} through", worker, request.method, request.url);
                self.network.fetch(&request).await
            }
        }
    }
}

/// Resolves once the worker is superseded
async fn wait_superseded(receiver: &mut watch::Receiver<bool>) {
    loop {
        let superseded = *receiver.borrow_and_update();
        if superseded {
            return;
        }
        if receiver.changed().await.is_err() {
            return;
        }
    }
}

struct ScopeHandle {
    registration: Arc<Registration>,
    worker: WorkerId,
}

#[async_trait]
impl WorkerScope for ScopeHandle {
    async fn skip_waiting(&self) -> SwcacheResult<()> {
        if self.registration.skip_waiting(self.worker)? {
            self.registration.activate_waiting().await?;
        }
        Ok(())
    }

    async fn claim(&self) -> SwcacheResult<()> {
        self.registration.claim(self.worker).map(|_| ())
    }
}
