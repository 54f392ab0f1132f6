//! Test doubles shared by unit tests

use crate::cache::{CacheEntry, CacheStorage, MemoryCacheStorage, RequestKey};
use crate::error::{SwcacheError, SwcacheResult};
use crate::network::{Fetcher, Request, Response};
use crate::runtime::{ExtendableEvent, FetchEvent, LifecycleHandler, WorkerScope};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Fetcher answering from a fixed table. Unknown URLs fail like an
/// unreachable host.
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Option<(u16, Vec<u8>)>>>,
    offline: Mutex<bool>,
    requests: Mutex<Vec<Request>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ok(self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.set_ok(url, body);
        self
    }

    pub fn with_status(self, url: &str, status: u16) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Some((status, Vec::new())));
        self
    }

    /// Requests for `url` fail at the transport level
    pub fn offline_for(self, url: &str) -> Self {
        self.routes.lock().unwrap().insert(url.to_string(), None);
        self
    }

    pub fn set_ok(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Some((200, body.into())));
    }

    pub fn go_offline(&self) {
        *self.offline.lock().unwrap() = true;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> SwcacheResult<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let url = request.url.to_string();
        if *self.offline.lock().unwrap() {
            return Err(SwcacheError::network(url, "offline"));
        }
        let route = self.routes.lock().unwrap().get(&url).cloned();
        match route {
            Some(Some((status, body))) => Ok(Response::new(status, body).with_url(url)),
            _ => Err(SwcacheError::network(url, "connection refused")),
        }
    }
}

/// Memory storage that fails on demand
#[derive(Default)]
pub struct FlakyStorage {
    inner: MemoryCacheStorage,
    failing_delete: HashSet<String>,
    failing_lookups: bool,
}

impl FlakyStorage {
    pub fn failing_delete<I: IntoIterator<Item = &'static str>>(names: I) -> Self {
        Self {
            failing_delete: names.into_iter().map(String::from).collect(),
            ..Self::default()
        }
    }

    pub fn failing_lookups() -> Self {
        Self {
            failing_lookups: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl CacheStorage for FlakyStorage {
    async fn open(&self, name: &str) -> SwcacheResult<()> {
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> SwcacheResult<bool> {
        self.inner.has(name).await
    }

    async fn keys(&self) -> SwcacheResult<Vec<String>> {
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> SwcacheResult<bool> {
        if self.failing_delete.contains(name) {
            return Err(SwcacheError::Internal(format!("{name} is locked")));
        }
        self.inner.delete(name).await
    }

    async fn put_all(&self, name: &str, entries: Vec<CacheEntry>) -> SwcacheResult<()> {
        self.inner.put_all(name, entries).await
    }

    async fn match_in(&self, name: &str, key: &RequestKey) -> SwcacheResult<Option<Response>> {
        self.inner.match_in(name, key).await
    }

    async fn entries(&self, name: &str) -> SwcacheResult<Vec<RequestKey>> {
        self.inner.entries(name).await
    }

    async fn match_request(&self, request: &Request) -> SwcacheResult<Option<Response>> {
        if self.failing_lookups {
            return Err(SwcacheError::Internal("storage unavailable".to_string()));
        }
        self.inner.match_request(request).await
    }
}

/// Scope that counts calls
#[derive(Default)]
pub struct RecordingScope {
    skip_waiting: AtomicUsize,
    claim: AtomicUsize,
}

impl RecordingScope {
    pub fn skip_waiting_calls(&self) -> usize {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub fn claim_calls(&self) -> usize {
        self.claim.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerScope for RecordingScope {
    async fn skip_waiting(&self) -> SwcacheResult<()> {
        self.skip_waiting.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn claim(&self) -> SwcacheResult<()> {
        self.claim.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Minimal lifecycle handler with configurable behavior
pub struct ScriptedHandler {
    name: String,
    skip_waiting: bool,
    claim: bool,
    fail_install: bool,
    gate: Option<Arc<Notify>>,
    respond: Option<Vec<u8>>,
}

impl ScriptedHandler {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            skip_waiting: false,
            claim: false,
            fail_install: false,
            gate: None,
            respond: None,
        }
    }

    pub fn skipping_waiting(mut self) -> Self {
        self.skip_waiting = true;
        self
    }

    pub fn claiming(mut self) -> Self {
        self.claim = true;
        self
    }

    pub fn failing_install(mut self) -> Self {
        self.fail_install = true;
        self
    }

    /// Install blocks until the gate is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn responding(mut self, body: &str) -> Self {
        self.respond = Some(body.as_bytes().to_vec());
        self
    }
}

impl LifecycleHandler for ScriptedHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_install(self: Arc<Self>, event: &mut ExtendableEvent) {
        let scope = event.scope();
        event.wait_until(async move {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail_install {
                return Err(SwcacheError::InstallFailed {
                    cache: self.name.clone(),
                    reason: "scripted failure".to_string(),
                });
            }
            if self.skip_waiting {
                scope.skip_waiting().await?;
            }
            Ok(())
        });
    }

    fn on_activate(self: Arc<Self>, event: &mut ExtendableEvent) {
        let scope = event.scope();
        event.wait_until(async move {
            if self.claim {
                scope.claim().await?;
            }
            Ok(())
        });
    }

    fn on_fetch(self: Arc<Self>, event: &mut FetchEvent) {
        if let Some(body) = self.respond.clone() {
            let _ = event.respond_with(async move { Ok(Response::new(200, body)) });
        }
    }
}
