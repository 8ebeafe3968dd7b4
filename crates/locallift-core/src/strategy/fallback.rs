//! Synthetic responses for when neither network nor cache can answer.

use crate::http::Response;
use reqwest::StatusCode;
use serde::Serialize;

/// 1×1 transparent GIF.
pub const TRANSPARENT_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x01, 0x44, 0x00, 0x3b,
];

/// Served to navigations when the offline page itself was never cached.
const BUILTIN_OFFLINE_PAGE: &str = "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>LocalLift - Offline</title></head>\n<body><h1>You are offline</h1><p>This page is not available offline. Reconnect and try again.</p></body>\n</html>\n";

/// JSON body returned for API requests while offline.
#[derive(Debug, Serialize)]
pub struct OfflineError {
    pub error: &'static str,
    pub message: &'static str,
    pub offline: bool,
}

impl Default for OfflineError {
    fn default() -> Self {
        Self {
            error: "network_error",
            message: "You appear to be offline",
            offline: true,
        }
    }
}

pub fn request_timed_out() -> Response {
    Response::synthetic(StatusCode::REQUEST_TIMEOUT, "")
}

pub fn service_unavailable() -> Response {
    Response::synthetic(StatusCode::SERVICE_UNAVAILABLE, "Network error")
        .with_header("content-type", "text/plain; charset=utf-8")
}

pub fn offline_api_error() -> Response {
    // Serializing a struct of static strings cannot fail
    let body = serde_json::to_vec(&OfflineError::default()).unwrap_or_default();
    Response::synthetic(StatusCode::SERVICE_UNAVAILABLE, body)
        .with_header("content-type", "application/json")
}

pub fn transparent_gif() -> Response {
    Response::synthetic(StatusCode::OK, TRANSPARENT_GIF)
        .with_header("content-type", "image/gif")
        .with_header("cache-control", "no-store")
}

pub fn builtin_offline_page() -> Response {
    Response::synthetic(StatusCode::OK, BUILTIN_OFFLINE_PAGE)
        .with_header("content-type", "text/html; charset=utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ResponseSource;

    #[test]
    fn test_offline_api_error_body() {
        let response = offline_api_error();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.header("content-type"), Some("application/json"));

        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["error"], "network_error");
        assert_eq!(body["offline"], true);
        assert!(body["message"].is_string());
    }

    #[test]
    fn test_transparent_gif() {
        let response = transparent_gif();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header("content-type"), Some("image/gif"));
        assert_eq!(response.header("cache-control"), Some("no-store"));
        assert!(response.body.starts_with(b"GIF89a"));
        assert_eq!(response.body.len(), 42);
        assert_eq!(response.source, ResponseSource::Synthetic);
    }

    #[test]
    fn test_request_timed_out_is_empty_408() {
        let response = request_timed_out();
        assert_eq!(response.status, StatusCode::REQUEST_TIMEOUT);
        assert!(response.body.is_empty());
    }
}
