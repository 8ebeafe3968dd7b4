//! Centralized configuration for the offline engine.
//!
//! [`WorkerConfig`] is the single source of truth for cache names, the
//! pre-cache manifest and routing tables. Every field has a documented
//! default, so a JSON file only needs the fields it overrides.

use crate::error::{LiftError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application-level constants.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "LocalLift";
    pub const USER_AGENT: &'static str = "LocalLift-Offline/0.1";
    pub const DATA_DIR_NAME: &'static str = "locallift";
    pub const CACHE_DB_FILENAME: &'static str = "offline-cache.sqlite";
}

/// Names of the four cache namespaces for one engine version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheNames {
    pub static_assets: String,
    pub dynamic: String,
    pub images: String,
    pub api: String,
}

impl CacheNames {
    /// Derive the namespace names for a prefix and version tag.
    pub fn for_version(prefix: &str, version: &str) -> Self {
        Self {
            static_assets: format!("{}-static-{}", prefix, version),
            dynamic: format!("{}-dynamic-{}", prefix, version),
            images: format!("{}-images-{}", prefix, version),
            api: format!("{}-api-{}", prefix, version),
        }
    }

    /// All current names, in the order the namespaces are created.
    pub fn all(&self) -> [&str; 4] {
        [
            self.static_assets.as_str(),
            self.dynamic.as_str(),
            self.images.as_str(),
            self.api.as_str(),
        ]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.all().contains(&name)
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Prefix for every namespace name (default `locallift`).
    pub cache_prefix: String,
    /// Version tag baked into namespace names (default `v1`).
    pub version: String,
    /// Origin that manifest paths and fallback pages resolve against.
    pub origin: String,
    /// Restrict interception to `origin` (default `false`: any origin).
    pub same_origin_only: bool,
    /// Paths fetched and stored at install time.
    pub precache_manifest: Vec<String>,
    /// Fail the install when any manifest entry fails (default `false`).
    pub strict_precache: bool,
    /// Capacity of the dynamic namespace (default 100).
    pub dynamic_cache_size: usize,
    /// Endpoints treated as API requests besides the `/api/` prefix.
    pub api_allow_list: Vec<String>,
    /// Path prefix identifying API requests (default `/api/`).
    pub api_prefix: String,
    /// Extensions served cache-first from the static namespace.
    pub static_extensions: Vec<String>,
    /// Extensions routed to the image strategy.
    pub image_extensions: Vec<String>,
    /// Path segments routed to the image strategy.
    pub image_path_segments: Vec<String>,
    /// Page served to navigations when network and cache both fail.
    pub offline_page: String,
    /// Image served when an image cannot be fetched.
    pub placeholder_image: String,
    /// Request timeout in seconds; `None` defers to the transport.
    pub request_timeout_secs: Option<u64>,
}

impl WorkerConfig {
    pub const DEFAULT_CACHE_PREFIX: &'static str = "locallift";
    pub const DEFAULT_VERSION: &'static str = "v1";
    pub const DEFAULT_ORIGIN: &'static str = "http://localhost:8000";
    pub const DEFAULT_DYNAMIC_CACHE_SIZE: usize = 100;
    pub const DEFAULT_API_PREFIX: &'static str = "/api/";
    pub const DEFAULT_OFFLINE_PAGE: &'static str = "/offline.html";
    pub const DEFAULT_PLACEHOLDER_IMAGE: &'static str = "/img/placeholder.svg";

    pub const DEFAULT_MANIFEST: &'static [&'static str] = &[
        "/",
        "/index.html",
        "/login/index.html",
        "/dashboard/index.html",
        "/style.css",
        "/js/main.js",
        "/js/performance-utils.js",
        "/js/dark-mode.js",
        "/js/responsive-utils.js",
        "/js/tab-handler.js",
        "/js/dropdown-handler.js",
        "/js/config.js",
        "/fonts/inter-var.woff2",
        "/img/logo.svg",
        "/img/icons/dashboard.svg",
        "/img/icons/profile.svg",
        "/img/icons/settings.svg",
        "/offline.html",
        "/404.html",
    ];

    pub const DEFAULT_API_ALLOW_LIST: &'static [&'static str] = &["/api/health", "/api/settings"];

    pub const DEFAULT_STATIC_EXTENSIONS: &'static [&'static str] =
        &[".html", ".css", ".js", ".woff2", ".svg", ".json"];

    pub const DEFAULT_IMAGE_EXTENSIONS: &'static [&'static str] =
        &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".ico", ".svg"];

    pub const DEFAULT_IMAGE_PATH_SEGMENTS: &'static [&'static str] = &["/img/", "/images/"];

    /// Load configuration from a JSON file, filling omitted fields with defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| LiftError::io_with_path(e, path))?;
        let config: WorkerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.dynamic_cache_size == 0 {
            return Err(LiftError::Config {
                message: "dynamic_cache_size must be at least 1".to_string(),
            });
        }
        if self.cache_prefix.is_empty() || self.version.is_empty() {
            return Err(LiftError::Config {
                message: "cache_prefix and version must not be empty".to_string(),
            });
        }
        for path in &self.precache_manifest {
            if !path.starts_with('/') {
                return Err(LiftError::Config {
                    message: format!("manifest path must be root-relative: {}", path),
                });
            }
        }
        self.origin_url()?;
        Ok(())
    }

    /// Namespace names for this configuration's version.
    pub fn cache_names(&self) -> CacheNames {
        CacheNames::for_version(&self.cache_prefix, &self.version)
    }

    /// Parsed origin URL.
    pub fn origin_url(&self) -> Result<url::Url> {
        url::Url::parse(&self.origin).map_err(|e| LiftError::InvalidUrl {
            url: self.origin.clone(),
            message: e.to_string(),
        })
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_prefix: Self::DEFAULT_CACHE_PREFIX.to_string(),
            version: Self::DEFAULT_VERSION.to_string(),
            origin: Self::DEFAULT_ORIGIN.to_string(),
            same_origin_only: false,
            precache_manifest: owned(Self::DEFAULT_MANIFEST),
            strict_precache: false,
            dynamic_cache_size: Self::DEFAULT_DYNAMIC_CACHE_SIZE,
            api_allow_list: owned(Self::DEFAULT_API_ALLOW_LIST),
            api_prefix: Self::DEFAULT_API_PREFIX.to_string(),
            static_extensions: owned(Self::DEFAULT_STATIC_EXTENSIONS),
            image_extensions: owned(Self::DEFAULT_IMAGE_EXTENSIONS),
            image_path_segments: owned(Self::DEFAULT_IMAGE_PATH_SEGMENTS),
            offline_page: Self::DEFAULT_OFFLINE_PAGE.to_string(),
            placeholder_image: Self::DEFAULT_PLACEHOLDER_IMAGE.to_string(),
            request_timeout_secs: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cache_names_for_version() {
        let names = CacheNames::for_version("locallift", "v1");
        assert_eq!(names.static_assets, "locallift-static-v1");
        assert_eq!(names.dynamic, "locallift-dynamic-v1");
        assert_eq!(names.images, "locallift-images-v1");
        assert_eq!(names.api, "locallift-api-v1");
        assert!(names.contains("locallift-api-v1"));
        assert!(!names.contains("locallift-api-v0"));
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.dynamic_cache_size, 100);
        assert_eq!(config.precache_manifest.len(), 19);
        assert!(config.precache_manifest.contains(&"/offline.html".to_string()));
        assert!(config.request_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"version": "v2", "dynamic_cache_size": 5}}"#).unwrap();

        let config = WorkerConfig::load(file.path()).unwrap();
        assert_eq!(config.version, "v2");
        assert_eq!(config.dynamic_cache_size, 5);
        assert_eq!(config.offline_page, "/offline.html");
        assert_eq!(config.cache_names().static_assets, "locallift-static-v2");
    }

    #[test]
    fn test_validate_rejects_relative_manifest_path() {
        let config = WorkerConfig {
            precache_manifest: vec!["style.css".to_string()],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LiftError::Config { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = WorkerConfig {
            dynamic_cache_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
