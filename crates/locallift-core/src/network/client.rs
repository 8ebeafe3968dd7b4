//! reqwest-backed fetcher.
//!
//! Provides a wrapper around reqwest with:
//! - Optional upstream origin rewriting (proxy mode)
//! - Optional request timeout (none by default: the transport decides)
//! - Hop-by-hop header filtering in both directions

use super::fetcher::Fetcher;
use crate::config::AppConfig;
use crate::error::{LiftError, Result};
use crate::http::{Request, Response, ResponseSource};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Headers that describe a single connection or its framing and must not be
/// forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = headers.clone();
    for name in HOP_BY_HOP {
        filtered.remove(*name);
    }
    filtered
}

/// Fetcher that performs real HTTP requests.
pub struct HttpFetcher {
    client: Client,
    /// Origin that requests are redirected to, if any.
    upstream: Option<Url>,
    timeout: Option<Duration>,
}

impl HttpFetcher {
    /// Create a fetcher that requests URLs as given.
    pub fn new() -> Result<Self> {
        Self::with_options(None, None)
    }

    /// Create a fetcher that sends every request to `upstream`'s origin,
    /// keeping path and query.
    pub fn with_upstream(upstream: Url) -> Result<Self> {
        Self::with_options(Some(upstream), None)
    }

    pub fn with_options(upstream: Option<Url>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(AppConfig::USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(|e| LiftError::Network {
            message: format!("Failed to create HTTP client: {}", e),
            source: Some(e),
        })?;

        Ok(Self {
            client,
            upstream,
            timeout,
        })
    }

    pub fn upstream(&self) -> Option<&Url> {
        self.upstream.as_ref()
    }

    /// The URL actually requested for `url`.
    pub fn target_url(&self, url: &Url) -> Url {
        let Some(upstream) = &self.upstream else {
            return url.clone();
        };

        let mut target = upstream.clone();
        target.set_path(url.path());
        target.set_query(url.query());
        target.set_fragment(None);
        target
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let target = self.target_url(&request.url);
        debug!("{} {}", request.method, target);

        let mut builder = self
            .client
            .request(request.method.clone(), target.clone())
            .headers(strip_hop_by_hop(&request.headers));
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LiftError::Timeout(self.timeout.unwrap_or_default())
            } else {
                LiftError::Network {
                    message: format!("{} {} failed: {}", request.method, target, e),
                    source: Some(e),
                }
            }
        })?;

        let status = response.status();
        let headers = strip_hop_by_hop(response.headers());
        let body = response.bytes().await.map_err(|e| LiftError::Network {
            message: format!("Failed to read body of {}: {}", target, e),
            source: Some(e),
        })?;

        Ok(Response {
            status,
            headers,
            body,
            source: ResponseSource::Network,
        })
    }
}
