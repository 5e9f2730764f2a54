//! Deterministic collaborators for configurator tests.
//!
//! - [`ManualExecutor`] queues jobs until the test runs them, in any order
//! - [`StubImages`] builds `img/<key>?<signature>` and `mask/<key>[/<part>]?<signature>`
//! - [`stub_fetch`] renders those URLs: frames are solid, hit-test masks are
//!   index 1 on the left half and index 2 on the right half

use image::{Rgba, RgbaImage};
use std::sync::{Arc, Mutex};

use crate::core::{Context, EventBus};
use crate::entities::{
    FrameAddress, FrameTable, ProductMeta, ProductState, RenderOptions, compute_mask_signature, compute_signature,
};
use crate::services::{ConfigService, Executor, FetchError, ImageService, Job, RasterSource};

#[derive(Default)]
pub struct ManualExecutor {
    jobs: Mutex<Vec<Job>>,
}

impl ManualExecutor {
    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// Run every queued job in issue order
    pub fn run_all(&self) {
        let jobs = std::mem::take(&mut *self.jobs.lock().unwrap());
        for job in jobs {
            job();
        }
    }

    /// Run the job at `index` of the queue
    pub fn run(&self, index: usize) {
        let job = self.jobs.lock().unwrap().remove(index);
        job();
    }
}

impl Executor for ManualExecutor {
    fn execute(&self, job: Job) {
        self.jobs.lock().unwrap().push(job);
    }
}

pub struct StubImages;

impl ImageService for StubImages {
    fn image_url(&self, address: &FrameAddress, state: &ProductState, render: &RenderOptions) -> String {
        format!("img/{}?{}", address.key(), compute_signature(state, render))
    }

    fn mask_url(
        &self,
        address: &FrameAddress,
        state: &ProductState,
        render: &RenderOptions,
        part: Option<&str>,
    ) -> String {
        let signature = compute_mask_signature(state, render);
        match part {
            Some(part) => format!("mask/{}/{}?{}", address.key(), part, signature),
            None => format!("mask/{}?{}", address.key(), signature),
        }
    }
}

pub struct StubConfig {
    pub table: FrameTable,
    pub meta: ProductMeta,
}

impl ConfigService for StubConfig {
    fn frame_table(&self, _state: &ProductState) -> Result<FrameTable, FetchError> {
        Ok(self.table.clone())
    }

    fn product_meta(&self, _state: &ProductState) -> Result<ProductMeta, FetchError> {
        Ok(self.meta.clone())
    }
}

/// Solid frame whose color is derived from the whole URL, so that
/// different signatures give different rasters.
pub fn stub_fetch(url: &str) -> Result<RgbaImage, FetchError> {
    if url.contains("fail") {
        return Err(FetchError::Network(format!("404 {}", url)));
    }
    if url.starts_with("mask/") {
        let (path, _) = url.split_once('?').unwrap_or((url, ""));
        if path.matches('/').count() > 1 {
            // Single-part highlight mask
            return Ok(RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255])));
        }
        return Ok(RgbaImage::from_fn(8, 8, |x, _| {
            if x < 4 { Rgba([1, 0, 0, 255]) } else { Rgba([2, 0, 0, 255]) }
        }));
    }
    let hash = url.bytes().fold(7u32, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(b)));
    let [r, g, b, _] = hash.to_le_bytes();
    Ok(RgbaImage::from_pixel(4, 4, Rgba([r, g, b, 255])))
}

pub fn meta() -> ProductMeta {
    ProductMeta {
        default_parts: vec!["sole".into(), "front".into()],
        hidden_parts: vec![],
    }
}

pub fn state() -> ProductState {
    let mut state = ProductState::new("swear", "vyner");
    state.set_part("front", "nappa", "white");
    state.set_part("sole", "rubber", "white");
    state
}

/// Context over a manual executor and the stubs above
pub fn context(table: FrameTable, source: Arc<dyn RasterSource>) -> (Context, Arc<ManualExecutor>, EventBus) {
    let _ = env_logger::builder().is_test(true).try_init();
    let executor = Arc::new(ManualExecutor::default());
    let bus = EventBus::new();
    let ctx = Context::from_parts(
        executor.clone(),
        Arc::new(StubImages),
        source,
        Arc::new(StubConfig { table, meta: meta() }),
        bus.clone(),
    );
    (ctx, executor, bus)
}
