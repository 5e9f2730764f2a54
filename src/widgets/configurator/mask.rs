//! Mask-based hit testing.
//!
//! Every frame has a companion mask raster whose red channel holds
//! `part_index + 1` per region, 0 being background. The mask of the frame
//! on screen is drawn onto an offscreen canvas the size of the widget and
//! sampled at the pointer position.
//!
//! Index assignment is a contract with the server: index `k` is the k-th
//! part name of the product defaults in lexicographic order.

use image::RgbaImage;
use image::imageops::{self, FilterType};
use log::trace;
use std::collections::HashSet;
use std::sync::Arc;

use crate::entities::{FrameAddress, ProductMeta};

/// Mask pixel index -> part name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHitMap {
    parts: Vec<String>,
    hidden: HashSet<String>,
}

impl PartHitMap {
    pub fn new(default_parts: impl IntoIterator<Item = String>, hidden: impl IntoIterator<Item = String>) -> Self {
        let mut parts: Vec<String> = default_parts.into_iter().collect();
        parts.sort();
        parts.dedup();
        Self {
            parts,
            hidden: hidden.into_iter().collect(),
        }
    }

    pub fn from_meta(meta: &ProductMeta) -> Self {
        Self::new(meta.default_parts.iter().cloned(), meta.hidden_parts.iter().cloned())
    }

    /// Part at mask index; `None` for background, unknown indices and
    /// hidden parts.
    pub fn resolve(&self, index: u8) -> Option<&str> {
        if index == 0 {
            return None;
        }
        let part = self.parts.get(usize::from(index) - 1)?;
        if self.hidden.contains(part) {
            return None;
        }
        Some(part)
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn is_hidden(&self, part: &str) -> bool {
        self.hidden.contains(part)
    }
}

/// Offscreen hit-test canvas
#[derive(Debug)]
pub struct MaskIndex {
    canvas: RgbaImage,
    bound: Option<(FrameAddress, Arc<RgbaImage>)>,
}

impl MaskIndex {
    pub fn new(size: u32) -> Self {
        Self {
            canvas: RgbaImage::new(size, size),
            bound: None,
        }
    }

    /// Draw `mask` onto the canvas, scaled to its size.
    ///
    /// Nearest-neighbour only: any blending would invent indices that do not
    /// belong to either neighbour.
    pub fn bind(&mut self, address: FrameAddress, mask: Arc<RgbaImage>) {
        self.canvas = scale_to(&mask, self.canvas.width(), self.canvas.height());
        trace!("Mask bound for {}", address);
        self.bound = Some((address, mask));
    }

    /// Forget the current mask; every lookup reports background.
    pub fn unbind(&mut self) {
        self.bound = None;
        self.canvas = RgbaImage::new(self.canvas.width(), self.canvas.height());
    }

    pub fn bound_address(&self) -> Option<&FrameAddress> {
        self.bound.as_ref().map(|(a, _)| a)
    }

    /// `mask` is already drawn for `address`
    pub fn is_bound(&self, address: &FrameAddress, mask: &Arc<RgbaImage>) -> bool {
        self.bound
            .as_ref()
            .is_some_and(|(a, m)| a == address && Arc::ptr_eq(m, mask))
    }

    /// Re-provision the canvas and redraw the bound mask at the new size.
    pub fn resize(&mut self, size: u32) {
        self.canvas = match &self.bound {
            Some((_, mask)) => scale_to(mask, size, size),
            None => RgbaImage::new(size, size),
        };
    }

    /// Mask index under `(x, y)` given in display coordinates of a surface
    /// `display_width` pixels wide. Out of bounds reads as background.
    pub fn index_at(&self, x: f32, y: f32, display_width: f32) -> u8 {
        if self.bound.is_none() || display_width <= 0.0 || x < 0.0 || y < 0.0 {
            return 0;
        }
        let ratio = self.canvas.width() as f32 / display_width;
        let (px, py) = ((x * ratio) as u32, (y * ratio) as u32);
        self.canvas.get_pixel_checked(px, py).map_or(0, |p| p.0[0])
    }
}

fn scale_to(mask: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if mask.dimensions() == (width, height) {
        return mask.clone();
    }
    imageops::resize(mask, width, height, FilterType::Nearest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit_map() -> PartHitMap {
        PartHitMap::new(
            ["sole", "front", "shadow", "laces"].map(String::from),
            ["shadow".to_string()],
        )
    }

    /// Left half index 1, right half index 3
    fn split_mask(w: u32, h: u32) -> Arc<RgbaImage> {
        Arc::new(RgbaImage::from_fn(w, h, |x, _| {
            if x < w / 2 { image::Rgba([1, 0, 0, 255]) } else { image::Rgba([3, 0, 0, 255]) }
        }))
    }

    #[test]
    fn test_index_mapping() {
        let map = hit_map();
        assert_eq!(map.parts(), &["front", "laces", "shadow", "sole"]);
        assert_eq!(map.resolve(0), None);
        assert_eq!(map.resolve(1), Some("front"));
        assert_eq!(map.resolve(2), Some("laces"));
        assert_eq!(map.resolve(3), None); // hidden
        assert_eq!(map.resolve(4), Some("sole"));
        assert_eq!(map.resolve(5), None);
        assert_eq!(map.resolve(255), None);
    }

    #[test]
    fn test_from_meta() {
        let meta = ProductMeta {
            default_parts: vec!["b".into(), "a".into(), "a".into()],
            hidden_parts: vec!["b".into()],
        };
        let map = PartHitMap::from_meta(&meta);
        assert_eq!(map.parts(), &["a", "b"]);
        assert!(map.is_hidden("b"));
    }

    #[test]
    fn test_unbound_is_background() {
        let index = MaskIndex::new(100);
        assert_eq!(index.index_at(10.0, 10.0, 100.0), 0);
    }

    #[test]
    fn test_sampling_scales_to_display() {
        let mut index = MaskIndex::new(200);
        // Mask served at a different resolution than the canvas
        index.bind(FrameAddress::new("side", 0), split_mask(50, 50));
        // Displayed at 100px wide
        assert_eq!(index.index_at(10.0, 50.0, 100.0), 1);
        assert_eq!(index.index_at(90.0, 50.0, 100.0), 3);
        assert_eq!(index.index_at(150.0, 50.0, 100.0), 0);
        assert_eq!(index.index_at(-1.0, 50.0, 100.0), 0);
    }

    #[test]
    fn test_nearest_keeps_exact_indices() {
        let mut index = MaskIndex::new(37);
        index.bind(FrameAddress::new("side", 0), split_mask(64, 64));
        for x in 0..37 {
            let v = index.index_at(x as f32, 3.0, 37.0);
            assert!(v == 1 || v == 3, "blended index {} at {}", v, x);
        }
    }

    #[test]
    fn test_resize_and_unbind() {
        let mut index = MaskIndex::new(100);
        index.bind(FrameAddress::new("top", 0), split_mask(100, 100));
        index.resize(400);
        assert_eq!(index.index_at(390.0, 10.0, 400.0), 3);
        assert_eq!(index.bound_address(), Some(&FrameAddress::new("top", 0)));
        index.unbind();
        assert_eq!(index.index_at(10.0, 10.0, 400.0), 0);
        assert!(index.bound_address().is_none());
    }
}
