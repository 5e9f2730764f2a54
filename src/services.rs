//! External collaborators the viewer engine talks to.
//!
//! - [`ImageService`]: builds frame/mask URLs (pure, URLs double as cache keys)
//! - [`ConfigService`]: frame table and part metadata for a product
//! - [`RasterSource`]: fetches and decodes a URL into an RGBA raster
//! - [`Executor`]: runs blocking fetch jobs off the UI thread
//!
//! None of these touch widget state. Results travel back to the UI thread
//! as messages and are applied in `Configurator::pump`.

use image::RgbaImage;
use std::fmt;

use crate::entities::{FrameAddress, FrameTable, ProductMeta, ProductState, RenderOptions};

/// Fetch/decode failure (the NetworkError family).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Network(String),
    Decode(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Network(e) => write!(f, "Network error: {}", e),
            FetchError::Decode(e) => write!(f, "Decode error: {}", e),
        }
    }
}

impl std::error::Error for FetchError {}

/// URL construction for frames and masks.
///
/// Both methods must be pure functions of their inputs.
pub trait ImageService: Send + Sync {
    fn image_url(&self, address: &FrameAddress, state: &ProductState, render: &RenderOptions) -> String;

    /// Mask URL; `part` selects a single-part highlight mask instead of the
    /// indexed hit-test mask.
    fn mask_url(
        &self,
        address: &FrameAddress,
        state: &ProductState,
        render: &RenderOptions,
        part: Option<&str>,
    ) -> String;
}

/// Product configuration lookups. Called from worker jobs, may block.
pub trait ConfigService: Send + Sync {
    fn frame_table(&self, state: &ProductState) -> Result<FrameTable, FetchError>;
    fn product_meta(&self, state: &ProductState) -> Result<ProductMeta, FetchError>;
}

/// Fetch + decode of a raster. Called from worker jobs, may block.
pub trait RasterSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<RgbaImage, FetchError>;
}

impl<F> RasterSource for F
where
    F: Fn(&str) -> Result<RgbaImage, FetchError> + Send + Sync,
{
    fn fetch(&self, url: &str) -> Result<RgbaImage, FetchError> {
        self(url)
    }
}

/// Decode PNG/JPEG bytes into RGBA8.
///
/// Helper for `RasterSource` implementations that get raw bytes off the wire.
pub fn decode_raster(bytes: &[u8]) -> Result<RgbaImage, FetchError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| FetchError::Decode(e.to_string()))
}

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs fetch jobs. Completion order is up to the implementation.
pub trait Executor: Send + Sync {
    fn execute(&self, job: Job);
}

/// Runs every job immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) {
        job();
    }
}
