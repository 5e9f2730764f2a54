//! Engine plumbing, independent of any widget: bus, workers, cache, preload.

pub mod context;
pub mod event_bus;
pub mod frame_cache;
pub mod inbox;
pub mod preloader;
pub mod workers;

pub use context::Context;
pub use event_bus::{EventBus, EventEmitter, WidgetEmitter, downcast_event};
pub use frame_cache::{CacheStats, FrameCache, Layer, SlotState};
pub use preloader::{DrainMode, PreloadScheduler};
pub use workers::Workers;
