//! Configurator options, loadable from JSON.

use anyhow::{Context, Result};
use std::path::Path;

use crate::core::preloader::DrainMode;
use crate::entities::{FrameAddress, RenderOptions};

/// Widget settings. Missing fields fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ConfiguratorOptions {
    // Geometry
    pub size: u32,     // Render/canvas size in px (square)
    pub max_size: u32, // Size used by enter_fullscreen without override

    // Drag
    pub sensitivity: f32,
    pub vertical_threshold: f32, // sensitivity * percentY needed to switch view

    // Initial frame
    pub view: String,
    pub position: u32,

    // Preload
    pub use_chain: bool, // Chained drain instead of parallel
    pub preload_delay_ms: u64,

    // Highlight overlay
    pub use_masks: bool,
    pub mask_opacity: f32,
    pub mask_duration_ms: u64,

    pub crossfade_ms: u64, // Default compositor animation duration

    // Forwarded to the Image Service
    pub format: Option<String>,
    pub background: Option<String>,
}

impl Default for ConfiguratorOptions {
    fn default() -> Self {
        Self {
            size: 1000,
            max_size: 1000,
            sensitivity: 40.0,
            vertical_threshold: 15.0,
            view: "side".to_string(),
            position: 0,
            use_chain: false,
            preload_delay_ms: 250,
            use_masks: true,
            mask_opacity: 0.4,
            mask_duration_ms: 150,
            crossfade_ms: 500,
            format: None,
            background: None,
        }
    }
}

impl ConfiguratorOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse configurator options")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configurator options: {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid options file: {}", path.display()))
    }

    pub fn initial_frame(&self) -> FrameAddress {
        FrameAddress::new(self.view.clone(), self.position)
    }

    pub fn drain_mode(&self) -> DrainMode {
        if self.use_chain { DrainMode::Chained } else { DrainMode::Parallel }
    }

    /// Render options for a square canvas of `size`
    pub fn render_options(&self, size: u32) -> RenderOptions {
        RenderOptions {
            format: self.format.clone(),
            background: self.background.clone(),
            ..RenderOptions::square(size)
        }
    }
}
