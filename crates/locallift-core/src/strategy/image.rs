use super::{fallback, StrategyEngine};
use crate::http::{Request, Response};
use tracing::{debug, info};

impl StrategyEngine {
    /// Cache-first for images with a placeholder chain.
    ///
    /// Order: cached copy, network (stored in the images namespace), cached
    /// placeholder image, inline transparent GIF.
    pub async fn image(&self, request: &Request) -> Response {
        if let Some(cached) = self.lookup(&request.cache_key()) {
            debug!("Image cache hit: {}", request.url);
            return cached;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store(&self.names.images, request, &response);
                response
            }
            Err(e) => {
                info!("Image fetch of {} failed, using placeholder: {}", request.url, e);
                self.lookup_path(&self.placeholder_image)
                    .unwrap_or_else(fallback::transparent_gif)
            }
        }
    }
}
