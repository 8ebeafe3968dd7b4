//! Install and activation of a worker version.
//!
//! States move Installing → Waiting → Active. A strict install failure or an
//! explicit replacement moves the worker to Redundant, which is terminal.

use crate::cache::CacheStorage;
use crate::clients::ClientRegistry;
use crate::config::{CacheNames, WorkerConfig};
use crate::error::{LiftError, Result};
use crate::events::{EventBus, WorkerEvent};
use crate::http::Request;
use crate::network::DynFetcher;
use futures::future::join_all;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Installing,
    Waiting,
    Active,
    Redundant,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Installing => "installing",
            LifecycleState::Waiting => "waiting",
            LifecycleState::Active => "active",
            LifecycleState::Redundant => "redundant",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of pre-caching the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReport {
    /// Manifest paths stored, in manifest order.
    pub cached: Vec<String>,
    /// Manifest paths that failed, with the reason.
    pub failed: Vec<(String, String)>,
}

impl InstallReport {
    pub fn total(&self) -> usize {
        self.cached.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Lifecycle {
    state: RwLock<LifecycleState>,
    skip_waiting: AtomicBool,
    version: String,
    names: CacheNames,
    origin: Url,
    manifest: Vec<String>,
    strict: bool,
    storage: Arc<dyn CacheStorage>,
    fetcher: DynFetcher,
    clients: Arc<ClientRegistry>,
    events: Arc<EventBus<WorkerEvent>>,
}

impl Lifecycle {
    pub fn new(
        config: &WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: DynFetcher,
        clients: Arc<ClientRegistry>,
        events: Arc<EventBus<WorkerEvent>>,
    ) -> Result<Self> {
        Ok(Self {
            state: RwLock::new(LifecycleState::Installing),
            skip_waiting: AtomicBool::new(false),
            version: config.version.clone(),
            names: config.cache_names(),
            origin: config.origin_url()?,
            manifest: config.precache_manifest.clone(),
            strict: config.strict_precache,
            storage,
            fetcher,
            clients,
            events,
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
            .read()
            .map(|s| *s)
            .unwrap_or(LifecycleState::Redundant)
    }

    fn set_state(&self, next: LifecycleState) {
        match self.state.write() {
            Ok(mut state) => {
                debug!("Lifecycle {} -> {}", *state, next);
                *state = next;
            }
            Err(e) => error!("Lifecycle state lock poisoned: {}", e),
        }
    }

    /// Whether install asked to activate without waiting for old clients.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Pre-cache the manifest into the static namespace.
    ///
    /// All entries are fetched as one concurrent batch. Successes are stored
    /// in manifest order. Failures are logged and reported; in strict mode
    /// any failure makes the worker redundant.
    pub async fn install(&self) -> Result<InstallReport> {
        if self.state() == LifecycleState::Redundant {
            return Err(LiftError::Redundant);
        }

        info!(
            "Installing version {} ({} manifest entries)",
            self.version,
            self.manifest.len()
        );
        self.events.emit(&WorkerEvent::InstallStarted {
            version: self.version.clone(),
        });
        self.set_state(LifecycleState::Installing);
        self.skip_waiting.store(true, Ordering::SeqCst);

        if let Err(e) = self.storage.open(&self.names.static_assets) {
            if self.strict {
                error!("Cannot open {}: {}", self.names.static_assets, e);
                self.mark_redundant();
                return Err(e);
            }
            warn!("Cannot open {}, continuing: {}", self.names.static_assets, e);
        }

        let fetches = self.manifest.iter().map(|path| async move {
            let request = self
                .origin
                .join(path)
                .map_err(|e| LiftError::InvalidUrl {
                    url: path.clone(),
                    message: e.to_string(),
                })
                .and_then(|url| Request::new(Method::GET, url.as_str()))?;
            let response = self.fetcher.fetch(&request).await?;
            Ok::<_, LiftError>((request, response))
        });
        let results = join_all(fetches).await;

        let mut report = InstallReport::default();
        for (path, result) in self.manifest.iter().zip(results) {
            match result {
                Ok((request, response)) if response.is_cacheable() => {
                    match self.storage.put(
                        &self.names.static_assets,
                        &request.cache_key(),
                        &response.to_cached(),
                    ) {
                        Ok(()) => report.cached.push(path.clone()),
                        Err(e) => report.failed.push((path.clone(), e.to_string())),
                    }
                }
                Ok((_, response)) => report
                    .failed
                    .push((path.clone(), format!("HTTP {}", response.status))),
                Err(e) => report.failed.push((path.clone(), e.to_string())),
            }
        }

        for (path, reason) in &report.failed {
            warn!("Failed to pre-cache {}: {}", path, reason);
        }

        if self.strict && !report.is_complete() {
            error!(
                "Install of {} failed: {} of {} entries missing",
                self.version,
                report.failed.len(),
                report.total()
            );
            self.mark_redundant();
            return Err(LiftError::InstallFailed {
                failed: report.failed.len(),
                total: report.total(),
            });
        }

        info!(
            "Installed version {}: {} cached, {} failed",
            self.version,
            report.cached.len(),
            report.failed.len()
        );
        self.set_state(LifecycleState::Waiting);
        self.events.emit(&WorkerEvent::Installed {
            report: report.clone(),
        });
        Ok(report)
    }

    /// Delete namespaces from other versions, claim clients, become active.
    ///
    /// Returns the deleted namespace names. Repeating activation for the same
    /// version deletes nothing.
    pub async fn activate(&self) -> Result<Vec<String>> {
        match self.state() {
            LifecycleState::Redundant => return Err(LiftError::Redundant),
            LifecycleState::Installing => {
                return Err(LiftError::Other(
                    "cannot activate before install completes".to_string(),
                ))
            }
            LifecycleState::Waiting | LifecycleState::Active => {}
        }

        let mut deleted = Vec::new();
        for name in self.storage.namespaces()? {
            if self.names.contains(&name) {
                continue;
            }
            if self.storage.delete_namespace(&name)? {
                info!("Deleted stale cache namespace {}", name);
                self.events
                    .emit(&WorkerEvent::NamespaceDeleted { name: name.clone() });
                deleted.push(name);
            }
        }

        let claimed = self.clients.claim();
        self.set_state(LifecycleState::Active);
        info!(
            "Activated version {}: {} namespaces deleted, {} clients claimed",
            self.version,
            deleted.len(),
            claimed
        );
        self.events.emit(&WorkerEvent::Activated {
            deleted: deleted.clone(),
            claimed,
        });
        Ok(deleted)
    }

    /// Move to the terminal Redundant state.
    pub fn mark_redundant(&self) {
        if self.state() == LifecycleState::Redundant {
            return;
        }
        self.set_state(LifecycleState::Redundant);
        self.events.emit(&WorkerEvent::Redundant);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CachedResponse, MemoryCache};
    use crate::clients::ClientKind;
    use crate::strategy::test_support::{ScriptedFetcher, ORIGIN};
    use reqwest::StatusCode;
    use std::sync::Mutex;

    fn lifecycle(
        manifest: &[&str],
        strict: bool,
        fetcher: Arc<ScriptedFetcher>,
    ) -> (Lifecycle, Arc<MemoryCache>, Arc<ClientRegistry>) {
        let config = WorkerConfig {
            origin: ORIGIN.to_string(),
            precache_manifest: manifest.iter().map(|s| s.to_string()).collect(),
            strict_precache: strict,
            ..Default::default()
        };
        let storage = Arc::new(MemoryCache::new());
        let clients = Arc::new(ClientRegistry::new());
        let lifecycle = Lifecycle::new(
            &config,
            storage.clone(),
            fetcher,
            clients.clone(),
            Arc::new(EventBus::new()),
        )
        .unwrap();
        (lifecycle, storage, clients)
    }

    #[tokio::test]
    async fn test_best_effort_install_keeps_successes() {
        let fetcher = Arc::new(ScriptedFetcher::default().route("/", StatusCode::OK, "home"));
        let (lifecycle, storage, _) = lifecycle(&["/", "/style.css"], false, fetcher);

        let report = lifecycle.install().await.unwrap();
        assert_eq!(report.cached, vec!["/"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "/style.css");

        let keys = storage.keys("locallift-static-v1").unwrap();
        assert_eq!(keys, vec![format!("GET {}/", ORIGIN)]);
        assert_eq!(lifecycle.state(), LifecycleState::Waiting);
        assert!(lifecycle.skip_waiting_requested());
    }

    /// Memory storage whose `open` always fails.
    struct OpenFails(MemoryCache);

    impl CacheStorage for OpenFails {
        fn open(&self, _namespace: &str) -> Result<()> {
            Err(LiftError::Storage {
                message: "quota exceeded".to_string(),
                source: None,
            })
        }
        fn has(&self, namespace: &str) -> Result<bool> {
            self.0.has(namespace)
        }
        fn namespaces(&self) -> Result<Vec<String>> {
            self.0.namespaces()
        }
        fn delete_namespace(&self, namespace: &str) -> Result<bool> {
            self.0.delete_namespace(namespace)
        }
        fn get(&self, namespace: &str, key: &str) -> Result<Option<CachedResponse>> {
            self.0.get(namespace, key)
        }
        fn put(&self, namespace: &str, key: &str, response: &CachedResponse) -> Result<()> {
            self.0.put(namespace, key, response)
        }
        fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
            self.0.delete(namespace, key)
        }
        fn keys(&self, namespace: &str) -> Result<Vec<String>> {
            self.0.keys(namespace)
        }
        fn stats(&self) -> Result<crate::cache::StorageStats> {
            self.0.stats()
        }
    }

    fn lifecycle_on(storage: Arc<OpenFails>, strict: bool) -> Lifecycle {
        let config = WorkerConfig {
            origin: ORIGIN.to_string(),
            precache_manifest: vec!["/".to_string()],
            strict_precache: strict,
            ..Default::default()
        };
        let fetcher = Arc::new(ScriptedFetcher::default().route("/", StatusCode::OK, "home"));
        Lifecycle::new(
            &config,
            storage,
            fetcher,
            Arc::new(ClientRegistry::new()),
            Arc::new(EventBus::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_namespace_open_failure_is_not_fatal_in_best_effort_mode() {
        let storage = Arc::new(OpenFails(MemoryCache::new()));
        let lifecycle = lifecycle_on(storage.clone(), false);

        let report = lifecycle.install().await.unwrap();
        assert_eq!(report.cached, vec!["/"]);
        assert_eq!(lifecycle.state(), LifecycleState::Waiting);
        assert_eq!(storage.len("locallift-static-v1").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_namespace_open_failure_is_terminal_in_strict_mode() {
        let lifecycle = lifecycle_on(Arc::new(OpenFails(MemoryCache::new())), true);

        assert!(matches!(
            lifecycle.install().await,
            Err(LiftError::Storage { .. })
        ));
        assert_eq!(lifecycle.state(), LifecycleState::Redundant);
    }

    #[tokio::test]
    async fn test_install_stores_in_manifest_order() {
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .route("/b.js", StatusCode::OK, "b")
                .route("/a.css", StatusCode::OK, "a")
                .route("/c.html", StatusCode::OK, "c"),
        );
        let (lifecycle, storage, _) = lifecycle(&["/c.html", "/a.css", "/b.js"], false, fetcher);

        lifecycle.install().await.unwrap();
        let keys = storage.keys("locallift-static-v1").unwrap();
        assert_eq!(
            keys,
            vec![
                format!("GET {}/c.html", ORIGIN),
                format!("GET {}/a.css", ORIGIN),
                format!("GET {}/b.js", ORIGIN),
            ]
        );
    }

    #[tokio::test]
    async fn test_strict_install_failure_is_terminal() {
        let fetcher = Arc::new(ScriptedFetcher::default().route("/", StatusCode::OK, "home"));
        let (lifecycle, _, _) = lifecycle(&["/", "/missing.css"], true, fetcher);

        let err = lifecycle.install().await.unwrap_err();
        assert!(matches!(err, LiftError::InstallFailed { failed: 1, total: 2 }));
        assert_eq!(lifecycle.state(), LifecycleState::Redundant);
        assert!(matches!(lifecycle.activate().await, Err(LiftError::Redundant)));
    }

    #[tokio::test]
    async fn test_activate_deletes_stale_namespaces_and_claims() {
        let fetcher = Arc::new(ScriptedFetcher::default().route("/", StatusCode::OK, "home"));
        let (lifecycle, storage, clients) = lifecycle(&["/"], false, fetcher);

        let stale = CachedResponse::new(200, Vec::new(), b"old".to_vec());
        storage.put("locallift-static-v0", "GET /old", &stale).unwrap();
        storage.put("other-app-cache", "GET /x", &stale).unwrap();
        let _window = clients.register(format!("{}/dashboard", ORIGIN), ClientKind::Window);

        lifecycle.install().await.unwrap();
        let deleted = lifecycle.activate().await.unwrap();

        assert_eq!(deleted, vec!["locallift-static-v0", "other-app-cache"]);
        assert_eq!(storage.namespaces().unwrap(), vec!["locallift-static-v1"]);
        assert_eq!(lifecycle.state(), LifecycleState::Active);
        assert!(clients.match_all(None).iter().all(|c| c.controlled));
    }

    #[tokio::test]
    async fn test_activation_is_idempotent() {
        let fetcher = Arc::new(ScriptedFetcher::default().route("/", StatusCode::OK, "home"));
        let (lifecycle, storage, _) = lifecycle(&["/"], false, fetcher);

        lifecycle.install().await.unwrap();
        lifecycle.activate().await.unwrap();
        let before = storage.stats().unwrap();

        let deleted = lifecycle.activate().await.unwrap();
        assert!(deleted.is_empty());
        assert_eq!(storage.stats().unwrap(), before);
    }

    #[tokio::test]
    async fn test_activate_before_install_is_rejected() {
        let (lifecycle, _, _) = lifecycle(&["/"], false, Arc::new(ScriptedFetcher::default()));
        assert!(lifecycle.activate().await.is_err());
        assert_eq!(lifecycle.state(), LifecycleState::Installing);
    }

    #[tokio::test]
    async fn test_events_follow_lifecycle() {
        let fetcher = Arc::new(ScriptedFetcher::default().route("/", StatusCode::OK, "home"));
        let config = WorkerConfig {
            origin: ORIGIN.to_string(),
            precache_manifest: vec!["/".to_string()],
            ..Default::default()
        };
        let events = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        events.subscribe(move |e: &WorkerEvent| {
            let name = match e {
                WorkerEvent::InstallStarted { .. } => "install_started",
                WorkerEvent::Installed { .. } => "installed",
                WorkerEvent::Activated { .. } => "activated",
                WorkerEvent::Redundant => "redundant",
                _ => "other",
            };
            log.lock().unwrap().push(name);
        });

        let lifecycle = Lifecycle::new(
            &config,
            Arc::new(MemoryCache::new()),
            fetcher,
            Arc::new(ClientRegistry::new()),
            events,
        )
        .unwrap();
        lifecycle.install().await.unwrap();
        lifecycle.activate().await.unwrap();
        lifecycle.mark_redundant();
        lifecycle.mark_redundant();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["install_started", "installed", "activated", "redundant"]
        );
    }
}
