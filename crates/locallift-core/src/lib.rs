//! LocalLift Core - offline caching engine for the LocalLift web client.
//!
//! This crate intercepts the client's HTTP requests and answers them from
//! namespaced response caches or the network, per resource class:
//! static assets cache-first, API calls network-first, images cache-first
//! with a placeholder, everything else network-first into a size-bounded
//! dynamic cache. Every intercepted request resolves with a response, even
//! when both network and cache are unavailable.
//!
//! For running the engine in front of a real origin, see the
//! `locallift-proxy` crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use locallift_core::{FetchOutcome, Request, ServiceWorker, WorkerConfig};
//!
//! #[tokio::main]
//! async fn main() -> locallift_core::Result<()> {
//!     let worker = ServiceWorker::new(WorkerConfig::default())?;
//!
//!     // Pre-cache the manifest and take control
//!     let report = worker.start().await?;
//!     println!("Pre-cached {} assets", report.cached.len());
//!
//!     let request = Request::navigate("http://localhost:8000/dashboard")?;
//!     if let FetchOutcome::Respond(response) = worker.handle_fetch(&request).await {
//!         println!("{} from {}", response.status, response.source.as_str());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clients;
pub mod config;
pub mod dynamic;
pub mod error;
pub mod events;
pub mod hooks;
pub mod http;
pub mod lifecycle;
pub mod network;
pub mod router;
pub mod strategy;
pub mod updates;

mod worker;

// Re-export commonly used types
pub use cache::{CacheStorage, CachedResponse, MemoryCache, SqliteCache, StorageStats};
pub use clients::{Client, ClientKind, ClientMessage, ClientRegistry};
pub use config::{AppConfig, CacheNames, WorkerConfig};
pub use dynamic::{DynamicCache, DynamicUpdate};
pub use error::{LiftError, Result};
pub use events::{EventBus, SubscriptionId, WorkerEvent};
pub use hooks::{ClickOutcome, Notification, NotificationOptions};
pub use http::{Request, RequestMode, Response, ResponseSource};
pub use lifecycle::{InstallReport, LifecycleState};
pub use network::{DynFetcher, Fetcher, HttpFetcher};
pub use router::{RequestClass, Router};
pub use updates::{ActivePost, FeedOptions, PollOptions, Poller, Post, PostFeed, UpdateSource};
pub use worker::{FetchOutcome, ServiceWorker, ServiceWorkerBuilder, WorkerStatus};
