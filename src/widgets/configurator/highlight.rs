//! Single-part highlight overlay drawn above the frame surfaces.

use image::RgbaImage;
use std::time::{Duration, Instant};

use super::animation::Tween;

#[derive(Debug, Default)]
pub struct Overlay {
    part: Option<String>,
    /// URL of the mask shown (or being fetched)
    src: Option<String>,
    raster: Option<RgbaImage>,
    loaded: bool,
    opacity: f32,
    fade: Option<Tween>,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the overlay at `url` and restart the fade-in.
    ///
    /// Returns false when `url` is already the overlay source, in which case
    /// nothing needs fetching.
    pub fn show(&mut self, part: &str, url: String, opacity: f32, duration: Duration, now: Instant) -> bool {
        if self.src.as_deref() == Some(url.as_str()) {
            return false;
        }
        self.part = Some(part.to_string());
        self.src = Some(url);
        self.loaded = false;
        self.opacity = 0.0;
        self.fade = Some(Tween::new(0.0, opacity, duration, now));
        true
    }

    /// Fetched mask arrived. Returns true if it belongs to the current source.
    pub fn on_loaded(&mut self, url: &str, raster: RgbaImage) -> bool {
        if self.src.as_deref() != Some(url) {
            return false;
        }
        self.raster = Some(raster);
        self.loaded = true;
        true
    }

    /// Fetch failed: drop the source so the same part can be retried.
    pub fn on_failed(&mut self, url: &str) {
        if self.src.as_deref() == Some(url) {
            self.clear();
        }
    }

    /// Hide the overlay.
    pub fn clear(&mut self) {
        self.part = None;
        self.src = None;
        self.raster = None;
        self.loaded = false;
        self.opacity = 0.0;
        self.fade = None;
    }

    pub fn tick(&mut self, now: Instant) {
        if let Some(fade) = self.fade.as_mut() {
            let (value, done) = fade.advance(now);
            self.opacity = value;
            if done {
                self.fade = None;
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.fade.as_ref().map(Tween::end)
    }

    pub fn part(&self) -> Option<&str> {
        self.part.as_deref()
    }

    pub fn src(&self) -> Option<&str> {
        self.src.as_deref()
    }

    pub fn raster(&self) -> Option<&RgbaImage> {
        self.raster.as_ref()
    }

    /// Mask loaded and shown
    pub fn is_active(&self) -> bool {
        self.loaded
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_fade_and_load() {
        let t0 = Instant::now();
        let mut overlay = Overlay::new();
        assert!(overlay.show("sole", "mask?part=sole".into(), 0.4, Duration::from_millis(150), t0));
        // Same source again: nothing to fetch
        assert!(!overlay.show("sole", "mask?part=sole".into(), 0.4, Duration::from_millis(150), t0));

        overlay.tick(t0 + Duration::from_millis(75));
        assert!((overlay.opacity() - 0.2).abs() < 1e-4);
        overlay.tick(t0 + Duration::from_millis(500));
        assert_eq!(overlay.opacity(), 0.4);
        assert!(overlay.next_deadline().is_none());

        assert!(!overlay.is_active());
        assert!(!overlay.on_loaded("mask?part=front", RgbaImage::new(1, 1)));
        assert!(overlay.on_loaded("mask?part=sole", RgbaImage::new(1, 1)));
        assert!(overlay.is_active());
        assert_eq!(overlay.part(), Some("sole"));
    }

    #[test]
    fn test_failure_and_clear() {
        let t0 = Instant::now();
        let mut overlay = Overlay::new();
        overlay.show("sole", "a".into(), 0.4, Duration::ZERO, t0);
        overlay.on_failed("other");
        assert_eq!(overlay.src(), Some("a"));
        overlay.on_failed("a");
        assert!(overlay.src().is_none());
        // Retry allowed
        assert!(overlay.show("sole", "a".into(), 0.4, Duration::ZERO, t0));
        overlay.clear();
        assert!(overlay.part().is_none());
        assert_eq!(overlay.opacity(), 0.0);
    }
}
