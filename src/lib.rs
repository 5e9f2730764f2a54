//! SPINFRAME - product configurator frame viewer library
//!
//! Rotates a customizable product through server-rendered frames: signature
//! keyed frame/mask cache, crossfading double buffer, mask hit testing, drag
//! rotation and background preloading.

// Core engine (bus, workers, cache, preload)
pub mod core;

pub mod config;
pub mod entities;
pub mod services;
pub mod widgets;

// Re-export commonly used types from core
pub use core::event_bus::{BoxedEvent, EventBus, EventEmitter, downcast_event};
pub use core::{Context, FrameCache, PreloadScheduler, Workers};

// Re-export entities
pub use entities::{FrameAddress, FrameTable, PartSelection, ProductMeta, ProductState, RenderOptions, Signature};

pub use config::ConfiguratorOptions;
pub use services::{ConfigService, Executor, FetchError, ImageService, InlineExecutor, RasterSource};
pub use widgets::configurator::{Configurator, ConfiguratorError};
