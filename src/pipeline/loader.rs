//! Shared image pipeline for all rows.
//!
//! - Memory cache hit returns immediately
//! - Concurrent loads of one locator share a single fetch (waiters list)
//! - Fetch runs as its own task so a cancelled row never strands other waiters
//! - Decoding happens on the blocking pool

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flume::Sender;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::cache::{CacheKey, ImageCache};
use super::fetch::Fetcher;
use super::{DecodedImage, ImagePipeline, PipelineError};
use crate::image_loader;
use crate::models::Locator;

type LoadResult = Result<DecodedImage, PipelineError>;

struct Shared {
    fetcher: Fetcher,
    cache: ImageCache,
    waiters: Mutex<HashMap<CacheKey, Vec<Sender<LoadResult>>>>,
}

#[derive(Clone)]
pub struct CachingImagePipeline {
    shared: Arc<Shared>,
}

impl CachingImagePipeline {
    pub fn new(cache: ImageCache, http_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                fetcher: Fetcher::new(http_timeout),
                cache,
                waiters: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn cache(&self) -> &ImageCache {
        &self.shared.cache
    }

}

impl Shared {
    async fn resolve(self: Arc<Self>, locator: Locator, key: CacheKey) {
        let result = self.fetch_and_decode(&locator).await;
        if let Ok(ref image) = result {
            self.cache.insert(key, image.clone());
        }

        let waiters = self.waiters.lock().remove(&key).unwrap_or_default();
        trace!(%locator, waiters = waiters.len(), ok = result.is_ok(), "Load finished");
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }

    async fn fetch_and_decode(&self, locator: &Locator) -> LoadResult {
        let bytes = self.fetcher.fetch(locator).await?;
        let owned = locator.clone();
        let decoded = tokio::task::spawn_blocking(move || {
            image_loader::decode_image(&bytes).map(|img| img.to_rgba8())
        })
        .await
        .map_err(|_| PipelineError::Cancelled(locator.as_str().to_string()))?;

        match decoded {
            Ok(pixels) => {
                debug!(%locator, width = pixels.width(), height = pixels.height(), "Decoded image");
                Ok(DecodedImage::new(owned, pixels))
            }
            Err(e) => Err(PipelineError::Decode {
                locator: locator.as_str().to_string(),
                reason: format!("{e:#}"),
            }),
        }
    }
}

#[async_trait]
impl ImagePipeline for CachingImagePipeline {
    async fn load(&self, locator: &Locator) -> LoadResult {
        let key = CacheKey::new(locator);

        if let Some(image) = self.shared.cache.get(&key) {
            trace!(%locator, "Memory cache hit");
            return Ok(image);
        }

        let (tx, rx) = flume::bounded(1);
        let leader = match self.shared.waiters.lock().entry(key) {
            Entry::Occupied(mut waiters) => {
                waiters.get_mut().push(tx);
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(vec![tx]);
                true
            }
        };

        if leader {
            tokio::spawn(Arc::clone(&self.shared).resolve(locator.clone(), key));
        } else {
            trace!(%locator, "Joined in-flight load");
        }

        rx.recv_async()
            .await
            .map_err(|_| PipelineError::Cancelled(locator.as_str().to_string()))?
    }
}
