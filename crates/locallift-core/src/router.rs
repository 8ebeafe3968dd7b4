//! Request classification.
//!
//! Routing is pure: it looks at method, scheme, origin and path only.

use crate::config::WorkerConfig;
use crate::http::Request;
use reqwest::Method;
use std::collections::HashSet;
use url::{Origin, Url};

/// Resource class of an intercepted request, in matching priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Served cache-first from the static namespace.
    StaticAsset,
    /// Served network-first into the api namespace.
    Api,
    /// Served by the image strategy.
    Image,
    /// Network first, cached in the size-bounded dynamic namespace.
    Other,
}

impl RequestClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestClass::StaticAsset => "static",
            RequestClass::Api => "api",
            RequestClass::Image => "image",
            RequestClass::Other => "other",
        }
    }
}

impl std::fmt::Display for RequestClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Router {
    scope: Option<Origin>,
    manifest: HashSet<String>,
    static_extensions: Vec<String>,
    api_prefix: String,
    api_allow_list: Vec<String>,
    image_extensions: Vec<String>,
    image_path_segments: Vec<String>,
}

impl Router {
    pub fn new(config: &WorkerConfig) -> Self {
        let scope = if config.same_origin_only {
            config.origin_url().ok().map(|u| u.origin())
        } else {
            None
        };

        Self {
            scope,
            manifest: config.precache_manifest.iter().cloned().collect(),
            static_extensions: config.static_extensions.clone(),
            api_prefix: config.api_prefix.clone(),
            api_allow_list: config.api_allow_list.clone(),
            image_extensions: config.image_extensions.clone(),
            image_path_segments: config.image_path_segments.clone(),
        }
    }

    /// Whether the engine handles this request at all.
    ///
    /// Non-GET requests, non-HTTP(S) schemes and out-of-scope origins pass
    /// through untouched.
    pub fn intercepts(&self, request: &Request) -> bool {
        if request.method != Method::GET {
            return false;
        }
        if !matches!(request.url.scheme(), "http" | "https") {
            return false;
        }
        match &self.scope {
            Some(origin) => request.url.origin() == *origin,
            None => true,
        }
    }

    pub fn classify(&self, url: &Url) -> RequestClass {
        let path = url.path();
        if self.is_static_asset(path) {
            RequestClass::StaticAsset
        } else if self.is_api_request(path) {
            RequestClass::Api
        } else if self.is_image_request(path) {
            RequestClass::Image
        } else {
            RequestClass::Other
        }
    }

    pub fn is_static_asset(&self, path: &str) -> bool {
        self.static_extensions.iter().any(|ext| path.ends_with(ext.as_str()))
            || self.manifest.contains(path)
    }

    pub fn is_api_request(&self, path: &str) -> bool {
        path.starts_with(self.api_prefix.as_str())
            || self
                .api_allow_list
                .iter()
                .any(|endpoint| path.contains(endpoint.as_str()))
    }

    pub fn is_image_request(&self, path: &str) -> bool {
        self.image_extensions.iter().any(|ext| path.ends_with(ext.as_str()))
            || self
                .image_path_segments
                .iter()
                .any(|segment| path.contains(segment.as_str()))
    }
}
