//! Request handlers.

use crate::server::AppState;
use axum::{
    body::to_bytes,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use locallift_core::{ClickOutcome, FetchOutcome, Request, RequestMode, Response};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, warn};
use url::Url;
use uuid::Uuid;

/// Largest request body forwarded.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Header naming where a proxied response came from.
pub const SOURCE_HEADER: &str = "x-locallift-source";

/// Health check endpoint: lifecycle state and per-namespace statistics.
pub async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.worker.status() {
        Ok(status) => (StatusCode::OK, Json(json!({"status": "ok", "worker": status}))),
        Err(e) => {
            error!("Failed to read worker status: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "error": e.to_string()})),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub tag: String,
}

/// Trigger a background sync.
pub async fn handle_sync(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SyncRequest>,
) -> impl IntoResponse {
    let notified = state.worker.sync(&request.tag);
    Json(json!({"tag": request.tag, "notified": notified}))
}

/// Deliver a push message; the raw body is the payload.
pub async fn handle_push(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    Json(state.worker.push(&body))
}

/// Notifications shown and not yet clicked or closed.
pub async fn handle_notifications(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.worker.notifications())
}

/// Click a notification: focus or open the window it points at.
pub async fn handle_notification_click(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> axum::response::Response {
    let (outcome, client) = match state.worker.notification_click(id) {
        Some(ClickOutcome::Focused(client)) => ("focused", client),
        Some(ClickOutcome::Opened(client)) => ("opened", client),
        None => return (StatusCode::NOT_FOUND, "Unknown notification").into_response(),
    };
    Json(json!({"outcome": outcome, "client": client})).into_response()
}

/// Close a notification without acting on it.
pub async fn handle_notification_close(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> StatusCode {
    if state.worker.close_notification(id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Posts currently on display.
pub async fn handle_posts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.worker.feed())
}

/// Absolute URL of an incoming request on the configured origin.
///
/// The path is always kept as a path, so `//host/x` cannot re-target the host.
pub(crate) fn origin_url(origin: &Url, uri: &Uri) -> Url {
    let mut url = origin.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());
    url.set_fragment(None);
    url
}

fn into_axum(response: Response) -> axum::response::Response {
    let source = response.source.as_str();
    let mut out = (response.status, response.headers, response.body).into_response();
    out.headers_mut()
        .insert(SOURCE_HEADER, HeaderValue::from_static(source));
    out
}

fn bad_gateway(message: &str) -> axum::response::Response {
    (StatusCode::BAD_GATEWAY, message.to_string()).into_response()
}

/// Run a request through the engine, forwarding it upstream when not
/// intercepted.
pub async fn handle_proxy(
    State(state): State<Arc<AppState>>,
    request: axum::extract::Request,
) -> axum::response::Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            warn!("Failed to read request body: {}", e);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let url = origin_url(&state.origin, &parts.uri);
    let mode = RequestMode::from_headers(&parts.method, &parts.headers);
    let mut core_request = match Request::new(parts.method, url.as_str()) {
        Ok(request) => request.with_mode(mode).with_body(body),
        Err(e) => {
            warn!("Rejecting request for {}: {}", url, e);
            return (StatusCode::BAD_REQUEST, "Invalid request URL").into_response();
        }
    };
    core_request.headers = parts.headers;

    match state.worker.handle_fetch(&core_request).await {
        FetchOutcome::Respond(response) => into_axum(response),
        FetchOutcome::Passthrough => {
            debug!("Forwarding {} {}", core_request.method, core_request.url);
            match state.worker.fetcher().fetch(&core_request).await {
                Ok(response) => into_axum(response),
                Err(e) if e.is_network() => {
                    warn!("Upstream request for {} failed: {}", core_request.url, e);
                    bad_gateway("Upstream unavailable")
                }
                Err(e) => {
                    error!("Cannot forward {}: {}", core_request.url, e);
                    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://app.locallift.test").unwrap()
    }

    #[test]
    fn test_origin_url_keeps_path_and_query() {
        let uri: Uri = "/api/posts/recent?limit=5".parse().unwrap();
        let url = origin_url(&origin(), &uri);
        assert_eq!(url.as_str(), "https://app.locallift.test/api/posts/recent?limit=5");
    }

    #[test]
    fn test_origin_url_ignores_scheme_relative_path() {
        let uri: Uri = "//evil.example/style.css".parse().unwrap();
        let url = origin_url(&origin(), &uri);
        assert_eq!(url.host_str(), Some("app.locallift.test"));
        assert_eq!(url.path(), "//evil.example/style.css");
    }
}
