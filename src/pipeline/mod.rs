//! Image pipeline used by feed rows.
//!
//! - `ImagePipeline` - the contract rows load images through
//! - `CachingImagePipeline` - fetch + decode with LRU memory cache and request coalescing
//! - `ImageHolder` - private, never displayed slot for the save path

pub mod cache;
pub mod fetch;
pub mod loader;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use image::RgbaImage;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::models::Locator;

pub use cache::ImageCache;
pub use loader::CachingImagePipeline;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("unsupported locator: {0}")]
    InvalidLocator(String),
    #[error("failed to fetch {locator}: {reason}")]
    Fetch { locator: String, reason: String },
    #[error("{locator} answered with HTTP {status}")]
    Http { locator: String, status: u16 },
    #[error("failed to decode {locator}: {reason}")]
    Decode { locator: String, reason: String },
    #[error("load of {0} was cancelled")]
    Cancelled(String),
}

/// A decoded image, cheap to clone.
#[derive(Clone)]
pub struct DecodedImage {
    pub locator: Locator,
    pub pixels: Arc<RgbaImage>,
}

impl DecodedImage {
    pub fn new(locator: Locator, pixels: RgbaImage) -> Self {
        Self {
            locator,
            pixels: Arc::new(pixels),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Estimated memory usage in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.pixels.as_raw().len()
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("locator", &self.locator)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

impl PartialEq for DecodedImage {
    fn eq(&self, other: &Self) -> bool {
        self.locator == other.locator && Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

/// Off-screen slot the save path loads assets into.
#[derive(Debug, Default)]
pub struct ImageHolder {
    image: Mutex<Option<DecodedImage>>,
}

impl ImageHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, image: Option<DecodedImage>) {
        *self.image.lock() = image;
    }

    pub fn take(&self) -> Option<DecodedImage> {
        self.image.lock().take()
    }
}

#[async_trait]
pub trait ImagePipeline: Send + Sync + 'static {
    /// Resolve a locator to a decoded image.
    async fn load(&self, locator: &Locator) -> Result<DecodedImage, PipelineError>;

    /// Best-effort load: failures are logged and absorbed.
    async fn load_or_empty(&self, locator: &Locator) -> Option<DecodedImage> {
        match self.load(locator).await {
            Ok(image) => Some(image),
            Err(e) => {
                debug!(%locator, error = %e, "Image load failed, leaving slot empty");
                None
            }
        }
    }

    /// Load into a private holder. The holder is cleared first and only set on success.
    async fn load_into(&self, locator: &Locator, holder: &ImageHolder) -> Result<(), PipelineError> {
        holder.set(None);
        let image = self.load(locator).await?;
        holder.set(Some(image));
        Ok(())
    }
}
