//! Fetcher trait.

use crate::error::Result;
use crate::http::{Request, Response};
use async_trait::async_trait;
use std::sync::Arc;

/// Performs network requests on behalf of the engine.
///
/// An `Err` means the network could not be reached. Any HTTP status,
/// including 4xx and 5xx, is an `Ok` response.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Shared fetcher handle.
pub type DynFetcher = Arc<dyn Fetcher>;

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        (**self).fetch(request).await
    }
}
