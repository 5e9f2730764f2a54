//! Shared collaborators handed to every widget of a page.
//!
//! Built once by the host and cloned into each configurator. Nothing here is
//! global: two contexts never see each other's bus or pool.

use std::sync::Arc;

use crate::core::event_bus::EventBus;
use crate::core::workers::Workers;
use crate::services::{ConfigService, Executor, ImageService, RasterSource};

#[derive(Clone)]
pub struct Context {
    pub executor: Arc<dyn Executor>,
    pub images: Arc<dyn ImageService>,
    pub source: Arc<dyn RasterSource>,
    pub config: Arc<dyn ConfigService>,
    pub bus: EventBus,
}

impl Context {
    /// Context backed by a default-sized worker pool and a fresh bus
    pub fn new(
        images: Arc<dyn ImageService>,
        source: Arc<dyn RasterSource>,
        config: Arc<dyn ConfigService>,
    ) -> Self {
        Self {
            executor: Arc::new(Workers::default()),
            images,
            source,
            config,
            bus: EventBus::new(),
        }
    }

    /// Context from explicit parts
    pub fn from_parts(
        executor: Arc<dyn Executor>,
        images: Arc<dyn ImageService>,
        source: Arc<dyn RasterSource>,
        config: Arc<dyn ConfigService>,
        bus: EventBus,
    ) -> Self {
        Self {
            executor,
            images,
            source,
            config,
            bus,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    /// Share an existing bus (several widgets on one page)
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("bus_queue", &self.bus.queue_len())
            .finish_non_exhaustive()
    }
}
