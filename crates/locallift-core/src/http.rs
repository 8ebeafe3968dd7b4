//! Request and response values exchanged between the host, the strategies
//! and the network.

use crate::cache::CachedResponse;
use crate::error::{LiftError, Result};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

/// How the host issued a request. Only `Navigate` changes strategy behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level page load.
    Navigate,
    SameOrigin,
    #[default]
    Cors,
    NoCors,
}

impl RequestMode {
    /// Infer the mode from request headers.
    ///
    /// `Sec-Fetch-Mode` wins when present; otherwise a GET that accepts HTML
    /// is treated as a navigation.
    pub fn from_headers(method: &Method, headers: &HeaderMap) -> Self {
        if let Some(mode) = headers.get("sec-fetch-mode").and_then(|v| v.to_str().ok()) {
            return match mode {
                "navigate" => RequestMode::Navigate,
                "same-origin" => RequestMode::SameOrigin,
                "no-cors" => RequestMode::NoCors,
                _ => RequestMode::Cors,
            };
        }

        let accepts_html = headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("text/html"))
            .unwrap_or(false);

        if *method == Method::GET && accepts_html {
            RequestMode::Navigate
        } else {
            RequestMode::Cors
        }
    }
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| LiftError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            method,
            url,
            mode: RequestMode::default(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        })
    }

    /// A plain GET request.
    pub fn get(url: &str) -> Result<Self> {
        Self::new(Method::GET, url)
    }

    /// A GET request issued as a page navigation.
    pub fn navigate(url: &str) -> Result<Self> {
        Ok(Self::get(url)?.with_mode(RequestMode::Navigate))
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Storage key for this request.
    pub fn cache_key(&self) -> String {
        cache_key(&self.method, &self.url)
    }
}

/// Normalized storage key: method plus absolute URL without fragment.
pub fn cache_key(method: &Method, url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    format!("{} {}", method, url)
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// Built by the engine because neither network nor cache could answer.
    Synthetic,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::Synthetic => "synthetic",
        }
    }
}

/// A response handed back to the host.
///
/// Cloning is cheap: the body is reference counted.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            source: ResponseSource::Network,
        }
    }

    pub(crate) fn synthetic(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            source: ResponseSource::Synthetic,
            ..Self::new(status, body)
        }
    }

    /// Add a header; invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Only HTTP 200 responses are ever stored.
    pub fn is_cacheable(&self) -> bool {
        self.status == StatusCode::OK
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Snapshot for storage.
    pub fn to_cached(&self) -> CachedResponse {
        let headers = self
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        CachedResponse::new(self.status.as_u16(), headers, self.body.to_vec())
    }

    /// Rebuild a response from a stored snapshot.
    pub fn from_cached(cached: CachedResponse) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in &cached.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }

        Self {
            status: StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK),
            headers,
            body: Bytes::from(cached.body),
            source: ResponseSource::Cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_drops_fragment() {
        let request = Request::get("https://app.locallift.test/dashboard#top").unwrap();
        assert_eq!(request.cache_key(), "GET https://app.locallift.test/dashboard");
    }

    #[test]
    fn test_mode_from_sec_fetch_mode() {
        let mut headers = HeaderMap::new();
        headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
        assert_eq!(
            RequestMode::from_headers(&Method::GET, &headers),
            RequestMode::Navigate
        );

        headers.insert("sec-fetch-mode", HeaderValue::from_static("no-cors"));
        assert_eq!(
            RequestMode::from_headers(&Method::GET, &headers),
            RequestMode::NoCors
        );
    }

    #[test]
    fn test_mode_from_accept_header() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"));
        assert_eq!(
            RequestMode::from_headers(&Method::GET, &headers),
            RequestMode::Navigate
        );
        assert_eq!(
            RequestMode::from_headers(&Method::POST, &headers),
            RequestMode::Cors
        );
        assert_eq!(
            RequestMode::from_headers(&Method::GET, &HeaderMap::new()),
            RequestMode::Cors
        );
    }

    #[test]
    fn test_snapshot_preserves_headers_and_body() {
        let response = Response::new(StatusCode::OK, "body {}")
            .with_header("content-type", "text/css");

        let restored = Response::from_cached(response.to_cached());
        assert_eq!(restored.status, StatusCode::OK);
        assert_eq!(restored.header("content-type"), Some("text/css"));
        assert_eq!(restored.text(), "body {}");
        assert_eq!(restored.source, ResponseSource::Cache);
    }

    #[test]
    fn test_only_ok_is_cacheable() {
        assert!(Response::new(StatusCode::OK, "").is_cacheable());
        assert!(!Response::new(StatusCode::NOT_FOUND, "").is_cacheable());
        assert!(!Response::new(StatusCode::NO_CONTENT, "").is_cacheable());
    }
}
