//! UI Widgets
//!
//! Each widget is self-contained and communicates via EventBus

pub mod configurator;
