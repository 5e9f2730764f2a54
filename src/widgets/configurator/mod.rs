//! Configurator widget - product rotation viewer with part picking
//!
//! Double-buffered frame compositor, mask hit testing and drag rotation

pub mod animation;
pub mod compositor;
mod configurator;
pub mod configurator_events;
pub mod gesture;
pub mod highlight;
pub mod mask;
#[cfg(test)]
pub(crate) mod test_support;

pub use compositor::{AnimateMode, Compositor, DrawReport, DrawTag, Surface};
pub use configurator::{
    ChangeFrameOptions, Configurator, ConfiguratorError, FullscreenOptions, HighlightOptions, UpdateOptions,
};
pub use configurator_events::{
    ChangedFrameEvent, DeselectedPartEvent, HighlightedPartEvent, LoadedEvent, PartsEvent, SelectedPartEvent,
};
pub use gesture::{GestureController, GestureState, PointerEvent, PointerKind, PointerTarget, TouchKind};
pub use highlight::Overlay;
pub use mask::{MaskIndex, PartHitMap};
