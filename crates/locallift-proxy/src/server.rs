//! HTTP server implementation using Axum.

use crate::handler::{
    handle_health, handle_notification_click, handle_notification_close, handle_notifications,
    handle_posts, handle_proxy, handle_push, handle_sync,
};
use axum::{
    routing::{delete, get, post},
    Router,
};
use locallift_core::ServiceWorker;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use url::Url;

/// Application state shared across handlers.
pub struct AppState {
    /// The offline engine
    pub worker: Arc<ServiceWorker>,
    /// Origin that incoming paths are resolved against
    pub origin: Url,
}

/// Build the router: control routes under `/__locallift`, everything else
/// through the engine.
pub fn build_router(
    worker: Arc<ServiceWorker>,
    max_concurrency: usize,
) -> anyhow::Result<Router> {
    let origin = worker.config().origin_url()?;
    let state = Arc::new(AppState { worker, origin });

    Ok(Router::new()
        .route("/__locallift/health", get(handle_health))
        .route("/__locallift/sync", post(handle_sync))
        .route("/__locallift/push", post(handle_push))
        .route("/__locallift/notifications", get(handle_notifications))
        .route(
            "/__locallift/notifications/:id/click",
            post(handle_notification_click),
        )
        .route(
            "/__locallift/notifications/:id",
            delete(handle_notification_close),
        )
        .route("/__locallift/posts", get(handle_posts))
        .fallback(handle_proxy)
        .layer(GlobalConcurrencyLimitLayer::new(max_concurrency.max(1)))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Start the proxy server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(
    worker: Arc<ServiceWorker>,
    host: &str,
    port: u16,
    max_concurrency: usize,
) -> anyhow::Result<SocketAddr> {
    let app = build_router(worker, max_concurrency)?;

    // Parse the address
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    // Bind to the address
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    // Spawn the server in the background
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}
