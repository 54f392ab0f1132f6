//! Offline caching agent
//!
//! The agent owns one generation of cached resources, named after its
//! version:
//!
//! | Phase    | Work                                                   |
//! |----------|--------------------------------------------------------|
//! | install  | fetch the manifest, store it in this version's bucket  |
//! | activate | delete every other bucket, claim open clients          |
//! | fetch    | GET: cache first, network fallback; others untouched   |
//!
//! Storage, network and observer are injected, so the same agent runs
//! against an in-memory store in tests and a directory store from the CLI.

pub mod events;
pub mod manifest;

pub use events::{AgentEvent, AgentObserver, RecordingObserver, SilentObserver};
pub use manifest::Manifest;

use crate::cache::{CacheEntry, CacheStorage};
use crate::config::schema::{AgentConfig, ManifestConfig};
use crate::error::{SwcacheError, SwcacheResult};
use crate::network::{Fetcher, Request, Response};
use crate::runtime::{ExtendableEvent, FetchEvent, LifecycleHandler, WorkerScope};
use futures_util::future::{join_all, try_join_all};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Agent identity and install policy
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Bucket owned by this version
    pub cache_name: String,
    /// Base URL manifest entries resolve against
    pub scope: Url,
    pub manifest: Manifest,
    /// Fail install when the manifest cannot be fully cached
    pub fail_on_cache_miss: bool,
}

impl AgentSettings {
    pub fn from_config(agent: &AgentConfig, manifest: &ManifestConfig) -> SwcacheResult<Self> {
        let scope = agent.scope_url().map_err(|reason| SwcacheError::InvalidUrl {
            url: agent.scope.clone(),
            reason,
        })?;

        Ok(Self {
            cache_name: agent.cache_name(),
            scope,
            manifest: Manifest::from_config(manifest),
            fail_on_cache_miss: agent.fail_on_cache_miss,
        })
    }
}

/// Outcome of a completed install
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub cache: String,
    /// Entries stored in the bucket by this install
    pub cached: usize,
    /// Why precaching failed, when the policy let install continue anyway
    pub precache_error: Option<String>,
}

/// Outcome of a completed activation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivateReport {
    pub cache: String,
    pub deleted: Vec<String>,
    /// Stale buckets that could not be deleted
    pub failed: Vec<String>,
}

/// Where a fetch response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Cache,
    Network,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => f.write_str("cache"),
            Self::Network => f.write_str("network"),
        }
    }
}

/// Response produced by the interceptor
#[derive(Debug, Clone)]
pub struct Resolved {
    pub response: Response,
    pub source: ResponseSource,
}

/// Cache-first offline agent
pub struct CacheAgent {
    settings: AgentSettings,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Fetcher>,
    observer: Arc<dyn AgentObserver>,
}

impl CacheAgent {
    pub fn new(
        settings: AgentSettings,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            settings,
            storage,
            network,
            observer: Arc::new(SilentObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn AgentObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn cache_name(&self) -> &str {
        &self.settings.cache_name
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Install: populate this version's bucket from the manifest, then ask
    /// to skip waiting.
    ///
    /// Precaching is all-or-nothing. When it fails and `fail_on_cache_miss`
    /// is set, install fails and the bucket is left as it was. Otherwise the
    /// failure is reported and install completes with an incomplete bucket.
    pub async fn install(&self, scope: &dyn WorkerScope) -> SwcacheResult<InstallReport> {
        let cache = self.cache_name().to_string();
        info!("Installing {} ({} resources)", cache, self.settings.manifest.len());
        self.notify(AgentEvent::InstallStarted {
            cache: cache.clone(),
            resources: self.settings.manifest.len(),
        })
        .await;

        self.storage.open(&cache).await?;

        let (cached, precache_error) = match self.precache().await {
            Ok(cached) => (cached, None),
            Err(e) => {
                let fatal = self.settings.fail_on_cache_miss;
                warn!("Precache for {} failed (fatal: {}): {}", cache, fatal, e);
                self.notify(AgentEvent::PrecacheFailed {
                    cache: cache.clone(),
                    reason: e.to_string(),
                    fatal,
                })
                .await;

                if fatal {
                    return Err(SwcacheError::InstallFailed {
                        cache,
                        reason: e.to_string(),
                    });
                }
                (0, Some(e.to_string()))
            }
        };

        scope.skip_waiting().await?;

        info!("Installed {} ({} entries cached)", cache, cached);
        self.notify(AgentEvent::InstallCompleted {
            cache: cache.clone(),
            cached,
        })
        .await;

        Ok(InstallReport {
            cache,
            cached,
            precache_error,
        })
    }

    /// Fetch every manifest resource concurrently and store them as one
    /// batch. Any failed fetch or non-2xx status fails the whole batch.
    async fn precache(&self) -> SwcacheResult<usize> {
        let urls = self.settings.manifest.resolve(&self.settings.scope)?;

        let fetches = urls.into_iter().map(|url| async move {
            let request = Request::get(url);
            let response = self.network.fetch(&request).await.map_err(|e| {
                SwcacheError::Precache {
                    url: request.url.to_string(),
                    reason: e.to_string(),
                }
            })?;

            if !response.is_ok() {
                return Err(SwcacheError::Precache {
                    url: request.url.to_string(),
                    reason: format!("status {} {}", response.status, response.status_text()),
                });
            }
            debug!("Fetched {} for precache", request.url);
            CacheEntry::new(&request, response)
        });

        let entries = try_join_all(fetches).await?;
        let count = entries.len();
        self.storage.put_all(self.cache_name(), entries).await?;
        Ok(count)
    }

    /// Activate: delete every bucket except this version's, then claim
    /// open clients.
    ///
    /// Refuses to run before this version's bucket exists, so the last
    /// installed generation is never cleared by an uninstalled one.
    /// Deletions run concurrently. A failed deletion is reported and does
    /// not stop the others or the claim.
    pub async fn activate(&self, scope: &dyn WorkerScope) -> SwcacheResult<ActivateReport> {
        let cache = self.cache_name().to_string();
        if !self.storage.has(&cache).await? {
            warn!("Refusing to activate {}: not installed", cache);
            return Err(SwcacheError::BucketNotFound(cache));
        }
        info!("Activating {}", cache);
        self.notify(AgentEvent::ActivateStarted {
            cache: cache.clone(),
        })
        .await;

        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| *name != cache)
            .collect();

        let deletions = stale.into_iter().map(|name| async move {
            let result = self.storage.delete(&name).await;
            (name, result)
        });

        let mut report = ActivateReport {
            cache: cache.clone(),
            ..ActivateReport::default()
        };
        for (name, result) in join_all(deletions).await {
            match result {
                Ok(_) => {
                    info!("Cleared old cache {}", name);
                    self.notify(AgentEvent::BucketDeleted {
                        bucket: name.clone(),
                    })
                    .await;
                    report.deleted.push(name);
                }
                Err(e) => {
                    warn!("Failed to clear old cache {}: {}", name, e);
                    self.notify(AgentEvent::BucketDeleteFailed {
                        bucket: name.clone(),
                        reason: e.to_string(),
                    })
                    .await;
                    report.failed.push(name);
                }
            }
        }

        scope.claim().await?;

        self.notify(AgentEvent::ActivateCompleted {
            cache,
            deleted: report.deleted.len(),
        })
        .await;
        Ok(report)
    }

    /// Whether the interceptor takes over this request. Only GET requests
    /// are cache-eligible; everything else goes to the host unmodified.
    pub fn intercepts(&self, request: &Request) -> bool {
        request.method.is_cacheable()
    }

    /// Cache first, network fallback.
    ///
    /// A cache hit issues no network call. A miss returns the network
    /// response as-is without storing it. A storage error during lookup
    /// counts as a miss.
    pub async fn resolve(&self, request: &Request) -> SwcacheResult<Resolved> {
        let url = request.url.to_string();

        match self.storage.match_request(request).await {
            Ok(Some(response)) => {
                debug!("Cache hit for {}", url);
                self.notify(AgentEvent::ServedFromCache { url }).await;
                return Ok(Resolved {
                    response,
                    source: ResponseSource::Cache,
                });
            }
            Ok(None) => debug!("Cache miss for {}", url),
            Err(e) => {
                warn!("Cache lookup for {} failed, using network: {}", url, e);
                self.notify(AgentEvent::CacheLookupFailed {
                    url: url.clone(),
                    reason: e.to_string(),
                })
                .await;
            }
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                self.notify(AgentEvent::ServedFromNetwork {
                    url,
                    status: response.status,
                })
                .await;
                Ok(Resolved {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(e) => {
                warn!("Fetch failed for {}: {}", url, e);
                self.notify(AgentEvent::NetworkFailed {
                    url,
                    reason: e.to_string(),
                })
                .await;
                Err(e)
            }
        }
    }

    async fn notify(&self, event: AgentEvent) {
        self.observer.notify(&event).await;
    }
}

impl LifecycleHandler for CacheAgent {
    fn name(&self) -> &str {
        self.cache_name()
    }

    fn on_install(self: Arc<Self>, event: &mut ExtendableEvent) {
        let scope = event.scope();
        event.wait_until(async move { self.install(scope.as_ref()).await.map(|_| ()) });
    }

    fn on_activate(self: Arc<Self>, event: &mut ExtendableEvent) {
        let scope = event.scope();
        event.wait_until(async move { self.activate(scope.as_ref()).await.map(|_| ()) });
    }

    fn on_fetch(self: Arc<Self>, event: &mut FetchEvent) {
        let request = event.request().clone();

        if !self.intercepts(&request) {
            debug!("Passing {} {} through", request.method, request.url);
            let observer = Arc::clone(&self.observer);
            event.wait_until(async move {
                observer
                    .notify(&AgentEvent::PassedThrough {
                        method: request.method,
                        url: request.url.to_string(),
                    })
                    .await;
                Ok(())
            });
            return;
        }

        let responded = event.respond_with(async move {
            self.resolve(&request).await.map(|resolved| resolved.response)
        });
        if let Err(e) = responded {
            warn!("Fetch handler could not respond: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCacheStorage, RequestKey};
    use crate::network::Method;
    use crate::runtime::{DetachedScope, Phase, Registration};
    use crate::testing::{FlakyStorage, RecordingScope, ScriptedFetcher};

    const SCOPE: &str = "https://app.example/";

    fn settings(version: &str, fail_on_cache_miss: bool) -> AgentSettings {
        AgentSettings {
            cache_name: format!("app-cache-{version}"),
            scope: Url::parse(SCOPE).unwrap(),
            manifest: Manifest::new(["/", "index.html", "manifest.json"]),
            fail_on_cache_miss,
        }
    }

    fn origin(tag: &str) -> ScriptedFetcher {
        ScriptedFetcher::new()
            .with_ok("https://app.example/", format!("root {tag}"))
            .with_ok("https://app.example/index.html", format!("index {tag}"))
            .with_ok("https://app.example/manifest.json", format!("manifest {tag}"))
    }

    fn get(path: &str) -> Request {
        Request::parse(Method::Get, &format!("{SCOPE}{path}")).unwrap()
    }

    fn agent(
        version: &str,
        storage: &Arc<MemoryCacheStorage>,
        network: &Arc<ScriptedFetcher>,
    ) -> CacheAgent {
        CacheAgent::new(settings(version, false), storage.clone(), network.clone())
    }

    #[tokio::test]
    async fn install_populates_current_bucket() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(origin("v1"));
        let scope = RecordingScope::default();

        let report = agent("v1", &storage, &network).install(&scope).await.unwrap();

        assert_eq!(report.cached, 3);
        assert_eq!(report.precache_error, None);
        let keys = storage.entries("app-cache-v1").await.unwrap();
        for path in ["", "index.html", "manifest.json"] {
            let key = RequestKey::get(&Url::parse(&format!("{SCOPE}{path}")).unwrap());
            assert!(keys.contains(&key), "missing {key}");
        }
        assert_eq!(scope.skip_waiting_calls(), 1);
    }

    #[tokio::test]
    async fn install_failure_tolerated_by_default() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(origin("v1").with_status("https://app.example/manifest.json", 404));
        let observer = Arc::new(RecordingObserver::new());
        let scope = RecordingScope::default();

        let report = agent("v1", &storage, &network)
            .with_observer(observer.clone())
            .install(&scope)
            .await
            .unwrap();

        assert_eq!(report.cached, 0);
        assert!(report.precache_error.unwrap().contains("404"));
        // bucket opened, nothing stored
        assert!(storage.has("app-cache-v1").await.unwrap());
        assert!(storage.entries("app-cache-v1").await.unwrap().is_empty());
        assert!(observer.events().contains(&AgentEvent::PrecacheFailed {
            cache: "app-cache-v1".to_string(),
            reason: "Failed to precache https://app.example/manifest.json: status 404 Not Found"
                .to_string(),
            fatal: false,
        }));
        assert_eq!(scope.skip_waiting_calls(), 1);
    }

    #[tokio::test]
    async fn install_failure_fatal_when_configured() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(origin("v1").offline_for("https://app.example/index.html"));
        let scope = RecordingScope::default();

        let err = CacheAgent::new(settings("v1", true), storage.clone(), network)
            .install(&scope)
            .await
            .unwrap_err();

        assert!(matches!(err, SwcacheError::InstallFailed { .. }));
        assert!(storage.entries("app-cache-v1").await.unwrap().is_empty());
        assert_eq!(scope.skip_waiting_calls(), 0);
    }

    #[tokio::test]
    async fn activate_leaves_only_current_bucket() {
        let storage = Arc::new(MemoryCacheStorage::new());
        for name in ["app-cache-v0", "app-cache-v1", "other-cache-v9"] {
            storage.open(name).await.unwrap();
        }
        let network = Arc::new(origin("v2"));
        let agent = agent("v2", &storage, &network);
        let scope = RecordingScope::default();

        agent.install(&scope).await.unwrap();
        let report = agent.activate(&scope).await.unwrap();

        assert_eq!(report.deleted.len(), 3);
        assert!(report.failed.is_empty());
        assert_eq!(storage.keys().await.unwrap(), vec!["app-cache-v2"]);
        assert_eq!(scope.claim_calls(), 1);
    }

    #[tokio::test]
    async fn activate_twice_is_noop() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(origin("v1"));
        let agent = agent("v1", &storage, &network);
        let scope = RecordingScope::default();

        agent.install(&scope).await.unwrap();
        agent.activate(&scope).await.unwrap();
        let second = agent.activate(&scope).await.unwrap();

        assert!(second.deleted.is_empty());
        assert_eq!(storage.keys().await.unwrap(), vec!["app-cache-v1"]);
        assert_eq!(storage.entries("app-cache-v1").await.unwrap().len(), 3);
        assert_eq!(scope.claim_calls(), 2);
    }

    #[tokio::test]
    async fn activate_before_install_keeps_previous_generation() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let scope = RecordingScope::default();
        let v1 = agent("v1", &storage, &Arc::new(origin("v1")));
        v1.install(&scope).await.unwrap();
        v1.activate(&scope).await.unwrap();

        let observer = Arc::new(RecordingObserver::new());
        let v2 = CacheAgent::new(
            settings("v2", false),
            storage.clone(),
            Arc::new(origin("v2")),
        )
        .with_observer(observer.clone());
        let err = v2.activate(&scope).await.unwrap_err();

        assert!(matches!(err, SwcacheError::BucketNotFound(ref name) if name == "app-cache-v2"));
        assert_eq!(storage.keys().await.unwrap(), vec!["app-cache-v1"]);
        assert_eq!(storage.entries("app-cache-v1").await.unwrap().len(), 3);
        assert_eq!(scope.claim_calls(), 1);
        assert!(observer.events().is_empty());
    }

    #[tokio::test]
    async fn failed_deletion_does_not_stop_activation() {
        let storage = Arc::new(FlakyStorage::failing_delete(["app-cache-v0"]));
        for name in ["app-cache-v0", "app-cache-v1", "app-cache-v2"] {
            storage.open(name).await.unwrap();
        }
        let observer = Arc::new(RecordingObserver::new());
        let scope = RecordingScope::default();
        let agent = CacheAgent::new(
            settings("v2", false),
            storage.clone(),
            Arc::new(origin("v2")),
        )
        .with_observer(observer.clone());

        let report = agent.activate(&scope).await.unwrap();

        assert_eq!(report.deleted, vec!["app-cache-v1"]);
        assert_eq!(report.failed, vec!["app-cache-v0"]);
        assert_eq!(scope.claim_calls(), 1);
        assert!(observer
            .failures()
            .iter()
            .any(|e| matches!(e, AgentEvent::BucketDeleteFailed { bucket, .. } if bucket == "app-cache-v0")));
    }

    #[tokio::test]
    async fn cache_hit_issues_no_network_call() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(origin("v1"));
        let agent = agent("v1", &storage, &network);
        agent.install(&DetachedScope).await.unwrap();
        let after_install = network.calls();

        let resolved = agent.resolve(&get("index.html")).await.unwrap();

        assert_eq!(resolved.source, ResponseSource::Cache);
        assert_eq!(resolved.response.body, b"index v1");
        assert_eq!(network.calls(), after_install);
    }

    #[tokio::test]
    async fn miss_returns_network_response_without_storing() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(origin("v1").with_ok("https://app.example/api/slots", "[]"));
        let agent = agent("v1", &storage, &network);
        agent.install(&DetachedScope).await.unwrap();

        let resolved = agent.resolve(&get("api/slots")).await.unwrap();

        assert_eq!(resolved.source, ResponseSource::Network);
        assert_eq!(resolved.response.body, b"[]");
        assert_eq!(storage.entries("app-cache-v1").await.unwrap().len(), 3);
        assert_eq!(
            storage.match_request(&get("api/slots")).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn miss_passes_error_statuses_unmodified() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(origin("v1").with_status("https://app.example/gone", 404));
        let agent = agent("v1", &storage, &network);

        let resolved = agent.resolve(&get("gone")).await.unwrap();
        assert_eq!(resolved.response.status, 404);
    }

    #[tokio::test]
    async fn miss_with_network_down_propagates() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(ScriptedFetcher::new());
        let observer = Arc::new(RecordingObserver::new());
        let agent = agent("v1", &storage, &network).with_observer(observer.clone());

        let err = agent.resolve(&get("index.html")).await.unwrap_err();

        assert!(matches!(err, SwcacheError::NetworkFetch { .. }));
        assert!(matches!(
            observer.events().last(),
            Some(AgentEvent::NetworkFailed { .. })
        ));
    }

    #[tokio::test]
    async fn post_never_served_from_cache() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(origin("v1"));
        let agent = agent("v1", &storage, &network);
        agent.install(&DetachedScope).await.unwrap();

        let post = Request::parse(Method::Post, "https://app.example/index.html")
            .unwrap()
            .with_body("slot=3");
        assert!(!agent.intercepts(&post));

        let resolved = agent.resolve(&post).await.unwrap();
        assert_eq!(resolved.source, ResponseSource::Network);
        let last = network.requests().pop().unwrap();
        assert_eq!(last.method, Method::Post);
        assert_eq!(last.body.as_deref(), Some(b"slot=3".as_slice()));
    }

    #[tokio::test]
    async fn lookup_error_falls_back_to_network() {
        let storage = Arc::new(FlakyStorage::failing_lookups());
        let network = Arc::new(origin("v1"));
        let observer = Arc::new(RecordingObserver::new());
        let agent = CacheAgent::new(settings("v1", false), storage, network.clone())
            .with_observer(observer.clone());

        let resolved = agent.resolve(&get("index.html")).await.unwrap();

        assert_eq!(resolved.source, ResponseSource::Network);
        assert!(matches!(
            observer.events().first(),
            Some(AgentEvent::CacheLookupFailed { .. })
        ));
    }

    #[tokio::test]
    async fn upgrade_from_v1_to_v2() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(origin("v1"));
        let registration = Registration::new(Url::parse(SCOPE).unwrap(), network.clone());

        let v1 = registration
            .register(Arc::new(agent("v1", &storage, &network)))
            .await
            .unwrap();
        assert_eq!(storage.entries("app-cache-v1").await.unwrap().len(), 3);
        let client = registration.add_client();
        assert_eq!(registration.controller(client), Some(v1));

        // v2 deploy: install creates the new bucket next to the old one
        network.set_ok("https://app.example/manifest.json", "manifest v2");
        let v2_agent = Arc::new(agent("v2", &storage, &network));
        v2_agent.install(&DetachedScope).await.unwrap();
        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["app-cache-v1", "app-cache-v2"]
        );
        assert_eq!(storage.entries("app-cache-v2").await.unwrap().len(), 3);

        // registering runs install again, skip_waiting lets it take over
        let v2 = registration.register(v2_agent).await.unwrap();
        assert_eq!(registration.active(), Some(v2));
        assert_eq!(registration.phase(v1), Some(Phase::Superseded));
        assert_eq!(registration.controller(client), Some(v2));
        assert_eq!(storage.keys().await.unwrap(), vec!["app-cache-v2"]);

        network.go_offline();
        let before = network.calls();
        let response = registration
            .fetch(client, get("manifest.json"))
            .await
            .unwrap();
        assert_eq!(response.body, b"manifest v2");
        assert_eq!(network.calls(), before);
    }

    #[tokio::test]
    async fn registered_agent_passes_post_through() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(origin("v1").with_ok("https://app.example/api", "created"));
        let registration = Registration::new(Url::parse(SCOPE).unwrap(), network.clone());
        registration
            .register(Arc::new(agent("v1", &storage, &network)))
            .await
            .unwrap();
        let client = registration.add_client();

        let post = Request::parse(Method::Post, "https://app.example/api").unwrap();
        let response = registration.fetch(client, post).await.unwrap();

        assert_eq!(response.body, b"created");
    }

    #[test]
    fn settings_from_config() {
        let agent = AgentConfig {
            app_name: "scheduler".to_string(),
            version: "v3".to_string(),
            scope: "https://app.example/scheduler".to_string(),
            fail_on_cache_miss: true,
        };
        let settings = AgentSettings::from_config(&agent, &ManifestConfig::default()).unwrap();

        assert_eq!(settings.cache_name, "scheduler-cache-v3");
        assert_eq!(settings.scope.as_str(), "https://app.example/scheduler/");
        assert_eq!(settings.manifest.len(), 3);
        assert!(settings.fail_on_cache_miss);
    }
}
