//! The worker controller: one object owning every piece of engine state.

use crate::cache::{CacheStorage, MemoryCache, StorageStats};
use crate::clients::ClientRegistry;
use crate::config::{AppConfig, CacheNames, WorkerConfig};
use crate::error::Result;
use crate::events::{EventBus, WorkerEvent};
use crate::hooks::{ClickOutcome, Notification, RuntimeHooks};
use crate::http::{Request, Response};
use crate::lifecycle::{InstallReport, Lifecycle, LifecycleState};
use crate::network::{DynFetcher, HttpFetcher};
use crate::router::{RequestClass, Router};
use crate::strategy::StrategyEngine;
use crate::updates::{ActivePost, FeedOptions, PostFeed, UpdateSource};
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};
use uuid::Uuid;

/// Result of offering a request to the worker.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The worker answered.
    Respond(Response),
    /// Not intercepted; the host performs the request itself.
    Passthrough,
}

impl FetchOutcome {
    pub fn response(self) -> Option<Response> {
        match self {
            FetchOutcome::Respond(response) => Some(response),
            FetchOutcome::Passthrough => None,
        }
    }
}

/// Health snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub state: LifecycleState,
    pub version: String,
    pub clients: usize,
    pub storage: StorageStats,
}

/// Builder for [`ServiceWorker`].
///
/// # Example
///
/// ```rust,ignore
/// use locallift_core::{ServiceWorker, SqliteCache, WorkerConfig};
///
/// let worker = ServiceWorker::builder(WorkerConfig::default())
///     .storage(Arc::new(SqliteCache::new(path)?))
///     .build()?;
/// worker.start().await?;
/// ```
pub struct ServiceWorkerBuilder {
    config: WorkerConfig,
    storage: Option<Arc<dyn CacheStorage>>,
    fetcher: Option<DynFetcher>,
    events: Option<Arc<EventBus<WorkerEvent>>>,
    updates: Option<UpdateSource>,
    feed_options: FeedOptions,
}

impl ServiceWorkerBuilder {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            storage: None,
            fetcher: None,
            events: None,
            updates: None,
            feed_options: FeedOptions::default(),
        }
    }

    /// Cache backend.
    ///
    /// Default: [`MemoryCache`]
    pub fn storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Network access.
    ///
    /// Default: [`HttpFetcher`] with the configured request timeout
    pub fn fetcher(mut self, fetcher: DynFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Share an existing event bus, e.g. to subscribe before install.
    pub fn events(mut self, events: Arc<EventBus<WorkerEvent>>) -> Self {
        self.events = Some(events);
        self
    }

    /// Where new-post notifications come from.
    ///
    /// Default: none; [`ServiceWorker::next_posts`] returns `None`
    pub fn update_source(mut self, source: UpdateSource) -> Self {
        self.updates = Some(source);
        self
    }

    pub fn feed_options(mut self, options: FeedOptions) -> Self {
        self.feed_options = options;
        self
    }

    pub fn build(self) -> Result<ServiceWorker> {
        let config = self.config;
        config.validate()?;

        let storage: Arc<dyn CacheStorage> = match self.storage {
            Some(storage) => storage,
            None => Arc::new(MemoryCache::new()),
        };
        let fetcher: DynFetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::with_options(None, config.request_timeout())?),
        };
        let events = self.events.unwrap_or_default();
        let clients = Arc::new(ClientRegistry::new());

        let engine = StrategyEngine::new(
            &config,
            Arc::clone(&storage),
            Arc::clone(&fetcher),
            Arc::clone(&events),
        )?;
        let lifecycle = Lifecycle::new(
            &config,
            Arc::clone(&storage),
            Arc::clone(&fetcher),
            Arc::clone(&clients),
            Arc::clone(&events),
        )?;
        let hooks = RuntimeHooks::new(
            config.origin_url()?,
            Arc::clone(&clients),
            Arc::clone(&events),
        );

        info!(
            "{} worker {} built for origin {}",
            AppConfig::APP_NAME,
            config.version,
            config.origin
        );

        Ok(ServiceWorker {
            router: Router::new(&config),
            names: config.cache_names(),
            config,
            storage,
            fetcher,
            engine,
            lifecycle,
            clients,
            hooks,
            events,
            updates: tokio::sync::Mutex::new(self.updates),
            feed: Mutex::new(PostFeed::new(self.feed_options)),
        })
    }
}

/// Offline engine for one worker version.
pub struct ServiceWorker {
    config: WorkerConfig,
    names: CacheNames,
    storage: Arc<dyn CacheStorage>,
    fetcher: DynFetcher,
    router: Router,
    engine: StrategyEngine,
    lifecycle: Lifecycle,
    clients: Arc<ClientRegistry>,
    hooks: RuntimeHooks,
    events: Arc<EventBus<WorkerEvent>>,
    updates: tokio::sync::Mutex<Option<UpdateSource>>,
    feed: Mutex<PostFeed>,
}

impl ServiceWorker {
    pub fn builder(config: WorkerConfig) -> ServiceWorkerBuilder {
        ServiceWorkerBuilder::new(config)
    }

    /// Worker with in-memory storage and an HTTP fetcher.
    pub fn new(config: WorkerConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Default location of the persistent cache database.
    pub fn default_cache_db_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| {
            dir.join(AppConfig::DATA_DIR_NAME)
                .join(AppConfig::CACHE_DB_FILENAME)
        })
    }

    // ========================================
    // Lifecycle
    // ========================================

    pub async fn install(&self) -> Result<InstallReport> {
        self.lifecycle.install().await
    }

    pub async fn activate(&self) -> Result<Vec<String>> {
        self.lifecycle.activate().await
    }

    /// Install, then activate at once when skip-waiting was requested.
    pub async fn start(&self) -> Result<InstallReport> {
        let report = self.install().await?;
        if self.lifecycle.skip_waiting_requested() {
            self.activate().await?;
        }
        Ok(report)
    }

    /// Retire this worker, e.g. when a newer version takes over.
    pub fn mark_redundant(&self) {
        self.lifecycle.mark_redundant();
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    // ========================================
    // Fetch handling
    // ========================================

    /// Offer a request to the worker.
    ///
    /// Only an active worker intercepts, and only GET requests in scope.
    /// Intercepted requests always resolve with a response.
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        if self.state() != LifecycleState::Active || !self.router.intercepts(request) {
            return FetchOutcome::Passthrough;
        }

        let class = self.router.classify(&request.url);
        debug!("{} {} -> {}", request.method, request.url, class);
        let response = self.engine.dispatch(class, request).await;
        debug!(
            "{} answered {} from {}",
            request.url,
            response.status,
            response.source.as_str()
        );
        FetchOutcome::Respond(response)
    }

    /// Class a request would be routed to, if intercepted.
    pub fn classify(&self, request: &Request) -> Option<RequestClass> {
        self.router
            .intercepts(request)
            .then(|| self.router.classify(&request.url))
    }

    // ========================================
    // Runtime hooks
    // ========================================

    pub fn push(&self, payload: &[u8]) -> Notification {
        self.hooks.push(payload)
    }

    pub fn notification_click(&self, id: Uuid) -> Option<ClickOutcome> {
        self.hooks.notification_click(id)
    }

    pub fn sync(&self, tag: &str) -> usize {
        self.hooks.sync(tag)
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.hooks.notifications()
    }

    pub fn close_notification(&self, id: Uuid) -> bool {
        self.hooks.close(id)
    }

    // ========================================
    // Post feed
    // ========================================

    fn feed_lock(&self) -> MutexGuard<'_, PostFeed> {
        self.feed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for the next batch from the update source and show it.
    ///
    /// Returns the posts newly added to the feed, or `None` when no source
    /// is configured or a push channel has closed.
    pub async fn next_posts(&self) -> Option<Vec<ActivePost>> {
        let batch = {
            let mut updates = self.updates.lock().await;
            updates.as_mut()?.next_batch().await?
        };

        let now = Utc::now();
        let mut feed = self.feed_lock();
        feed.expire(now);

        let mut shown = Vec::new();
        for post in batch {
            let id = post.id.clone();
            if !feed.add(post, now) {
                continue;
            }
            if let Some(active) = feed.get(&id) {
                shown.push(active.clone());
            }
        }
        drop(feed);

        for active in &shown {
            debug!("Showing post {}", active.post.id);
            self.events.emit(&WorkerEvent::PostShown {
                id: active.post.id.clone(),
            });
        }
        Some(shown)
    }

    /// Posts on display, soonest expiry first. Expired posts are dropped.
    pub fn feed(&self) -> Vec<ActivePost> {
        let mut feed = self.feed_lock();
        feed.expire(Utc::now());
        feed.active().into_iter().cloned().collect()
    }

    pub fn dismiss_post(&self, id: &str) -> bool {
        self.feed_lock().dismiss(id)
    }

    // ========================================
    // Accessors
    // ========================================

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn cache_names(&self) -> &CacheNames {
        &self.names
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn fetcher(&self) -> &DynFetcher {
        &self.fetcher
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    pub fn events(&self) -> &Arc<EventBus<WorkerEvent>> {
        &self.events
    }

    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.stats()
    }

    pub fn status(&self) -> Result<WorkerStatus> {
        Ok(WorkerStatus {
            state: self.state(),
            version: self.config.version.clone(),
            clients: self.clients.len(),
            storage: self.stats()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::{url, ScriptedFetcher, ORIGIN};
    use reqwest::{Method, StatusCode};

    fn worker(fetcher: Arc<ScriptedFetcher>) -> ServiceWorker {
        let config = WorkerConfig {
            origin: ORIGIN.to_string(),
            precache_manifest: vec!["/".to_string(), "/offline.html".to_string()],
            ..Default::default()
        };
        ServiceWorker::builder(config)
            .fetcher(fetcher)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_inactive_worker_passes_through() {
        let worker = worker(Arc::new(ScriptedFetcher::default()));
        let request = Request::get(&url("/style.css")).unwrap();
        assert!(matches!(
            worker.handle_fetch(&request).await,
            FetchOutcome::Passthrough
        ));
    }

    #[tokio::test]
    async fn test_non_get_passes_through() {
        let fetcher = Arc::new(ScriptedFetcher::default().route("/", StatusCode::OK, "home"));
        let worker = worker(fetcher);
        worker.start().await.unwrap();

        let request = Request::new(Method::POST, &url("/api/workouts")).unwrap();
        assert!(matches!(
            worker.handle_fetch(&request).await,
            FetchOutcome::Passthrough
        ));
        assert_eq!(worker.classify(&request), None);
    }

    #[tokio::test]
    async fn test_start_activates_and_reports_status() {
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .route("/", StatusCode::OK, "home")
                .route("/offline.html", StatusCode::OK, "offline"),
        );
        let worker = worker(fetcher);

        let report = worker.start().await.unwrap();
        assert_eq!(report.cached.len(), 2);
        assert_eq!(worker.state(), LifecycleState::Active);

        let status = worker.status().unwrap();
        assert_eq!(status.version, "v1");
        assert_eq!(status.storage.total_entries, 2);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = WorkerConfig {
            origin: "not a url".to_string(),
            ..Default::default()
        };
        assert!(ServiceWorker::builder(config)
            .fetcher(Arc::new(ScriptedFetcher::default()))
            .build()
            .is_err());
    }

    #[test]
    fn test_default_cache_db_path() {
        if let Some(path) = ServiceWorker::default_cache_db_path() {
            assert!(path.ends_with("locallift/offline-cache.sqlite"));
        }
    }
}
