//! Double-buffered frame compositor.
//!
//! Two stacked surfaces, exactly one of them visible. Every draw paints the
//! hidden surface and flips the flag; the opacity transition depends on the
//! [`AnimateMode`]:
//!
//! | mode | new surface | old surface |
//! |---|---|---|
//! | `None` | 1 now | 0 now |
//! | `Cross` | 0 -> 1 | 1 -> 0, concurrently |
//! | `Simple` / `Immediate` | 0 -> 1 | snapped to 0 when the new one lands |
//!
//! A draw is identified by an optional [`DrawTag`]; its completion (or its
//! cancellation by a newer draw) is collected with [`Compositor::take_finished`].

use image::RgbaImage;
use log::trace;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::animation::Tween;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnimateMode {
    #[default]
    None,
    Simple,
    Immediate,
    Cross,
}

impl AnimateMode {
    pub fn is_animated(self) -> bool {
        self != AnimateMode::None
    }

    /// Duration used when the caller gives none (or zero)
    pub fn default_duration(self, crossfade: Duration) -> Duration {
        match self {
            AnimateMode::None | AnimateMode::Immediate => Duration::ZERO,
            AnimateMode::Simple | AnimateMode::Cross => crossfade,
        }
    }
}

/// Caller token identifying one draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawTag(pub u64);

/// A tagged draw settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawReport {
    pub tag: DrawTag,
    /// False when a newer draw cancelled this one mid-transition
    pub completed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Surface {
    raster: Option<Arc<RgbaImage>>,
    opacity: f32,
    z_index: u8,
    visible: bool,
    animation: Option<Tween>,
}

impl Surface {
    pub fn raster(&self) -> Option<&Arc<RgbaImage>> {
        self.raster.as_ref()
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn z_index(&self) -> u8 {
        self.z_index
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveDraw {
    tag: Option<DrawTag>,
    target: usize,
}

#[derive(Debug)]
pub struct Compositor {
    surfaces: [Surface; 2],
    visible: usize,
    crossfade: Duration,
    width: u32,
    height: u32,
    active: Option<ActiveDraw>,
    finished: Vec<DrawReport>,
    draws: u64,
}

impl Compositor {
    pub fn new(width: u32, height: u32, crossfade: Duration) -> Self {
        let mut surfaces: [Surface; 2] = Default::default();
        surfaces[0].visible = true;
        surfaces[0].opacity = 1.0;
        surfaces[0].z_index = 2;
        surfaces[1].z_index = 1;
        Self {
            surfaces,
            visible: 0,
            crossfade,
            width,
            height,
            active: None,
            finished: Vec::new(),
            draws: 0,
        }
    }

    /// Paint `raster` on the hidden surface and make it the visible one.
    pub fn draw_frame(
        &mut self,
        raster: Arc<RgbaImage>,
        mode: AnimateMode,
        duration: Option<Duration>,
        tag: Option<DrawTag>,
        now: Instant,
    ) {
        let current = self.visible;
        let target = 1 - current;
        self.cancel_animations();

        self.surfaces[target].raster = Some(raster);
        self.surfaces[target].visible = true;
        self.surfaces[current].visible = false;
        self.visible = target;
        self.draws += 1;

        if !mode.is_animated() {
            self.snap(target);
            if let Some(tag) = tag {
                self.finished.push(DrawReport { tag, completed: true });
            }
            trace!("Draw #{} committed without animation", self.draws);
            return;
        }

        let duration = duration
            .filter(|d| !d.is_zero())
            .unwrap_or_else(|| mode.default_duration(self.crossfade));
        trace!("Draw #{} {:?} over {}ms", self.draws, mode, duration.as_millis());

        if mode == AnimateMode::Cross {
            self.surfaces[current].animation = Some(Tween::new(1.0, 0.0, duration, now));
        }
        self.surfaces[target].opacity = 0.0;
        self.surfaces[target].z_index = 2;
        self.surfaces[current].z_index = 1;
        self.surfaces[target].animation = Some(Tween::new(0.0, 1.0, duration, now));
        self.active = Some(ActiveDraw { tag, target });

        // Zero-length transitions land right away
        self.tick(now);
    }

    /// Advance running transitions to `now`.
    pub fn tick(&mut self, now: Instant) {
        for index in 0..2 {
            let Some(tween) = self.surfaces[index].animation.as_mut() else {
                continue;
            };
            let (value, done) = tween.advance(now);
            self.surfaces[index].opacity = value;
            if !done {
                continue;
            }
            self.surfaces[index].animation = None;

            if let Some(active) = self.active.filter(|a| a.target == index) {
                self.active = None;
                self.snap(index);
                if let Some(tag) = active.tag {
                    self.finished.push(DrawReport { tag, completed: true });
                }
            }
        }
    }

    /// Reports of draws settled since the last call
    pub fn take_finished(&mut self) -> Vec<DrawReport> {
        std::mem::take(&mut self.finished)
    }

    /// Earliest instant a running transition ends
    pub fn next_deadline(&self) -> Option<Instant> {
        self.surfaces
            .iter()
            .filter_map(|s| s.animation.as_ref().map(Tween::end))
            .min()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_animating(&self) -> bool {
        self.surfaces.iter().any(Surface::is_animating)
    }

    pub fn visible_index(&self) -> usize {
        self.visible
    }

    pub fn visible(&self) -> &Surface {
        &self.surfaces[self.visible]
    }

    pub fn surface(&self, index: usize) -> Option<&Surface> {
        self.surfaces.get(index)
    }

    /// Committed draws so far (one flip each)
    pub fn draw_count(&self) -> u64 {
        self.draws
    }

    fn snap(&mut self, target: usize) {
        let other = 1 - target;
        self.surfaces[target].opacity = 1.0;
        self.surfaces[target].z_index = 2;
        self.surfaces[other].opacity = 0.0;
        self.surfaces[other].z_index = 1;
    }

    /// Drop running transitions on both surfaces, reporting a cut-off draw
    fn cancel_animations(&mut self) {
        for surface in &mut self.surfaces {
            surface.animation = None;
        }
        if let Some(ActiveDraw { tag: Some(tag), .. }) = self.active.take() {
            trace!("Draw {:?} superseded", tag);
            self.finished.push(DrawReport { tag, completed: false });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(v: u8) -> Arc<RgbaImage> {
        Arc::new(RgbaImage::from_pixel(2, 2, image::Rgba([v, v, v, 255])))
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_unanimated_draw_flips_once() {
        let t0 = Instant::now();
        let mut comp = Compositor::new(100, 100, ms(500));
        assert_eq!(comp.visible_index(), 0);

        comp.draw_frame(raster(1), AnimateMode::None, None, Some(DrawTag(1)), t0);
        assert_eq!(comp.visible_index(), 1);
        assert_eq!(comp.draw_count(), 1);
        assert_eq!(comp.visible().opacity(), 1.0);
        assert_eq!(comp.surface(0).unwrap().opacity(), 0.0);
        assert!(comp.visible().z_index() > comp.surface(0).unwrap().z_index());
        assert_eq!(comp.take_finished(), vec![DrawReport { tag: DrawTag(1), completed: true }]);

        let visible: Vec<bool> = (0..2).map(|i| comp.surface(i).unwrap().is_visible()).collect();
        assert_eq!(visible, vec![false, true]);
    }

    #[test]
    fn test_cross_animates_both() {
        let t0 = Instant::now();
        let mut comp = Compositor::new(100, 100, ms(500));
        comp.draw_frame(raster(1), AnimateMode::None, None, None, t0);
        comp.draw_frame(raster(2), AnimateMode::Cross, Some(ms(200)), Some(DrawTag(7)), t0);

        comp.tick(t0 + ms(100));
        let old = comp.surface(1).unwrap().opacity();
        let new = comp.surface(0).unwrap().opacity();
        assert!((old - 0.5).abs() < 1e-3 && (new - 0.5).abs() < 1e-3);
        assert!(comp.take_finished().is_empty());

        comp.tick(t0 + ms(250));
        assert_eq!(comp.surface(0).unwrap().opacity(), 1.0);
        assert_eq!(comp.surface(1).unwrap().opacity(), 0.0);
        assert_eq!(comp.take_finished(), vec![DrawReport { tag: DrawTag(7), completed: true }]);
        assert!(!comp.is_animating());
    }

    #[test]
    fn test_simple_snaps_old_at_end() {
        let t0 = Instant::now();
        let mut comp = Compositor::new(100, 100, ms(500));
        comp.draw_frame(raster(1), AnimateMode::None, None, None, t0);
        comp.draw_frame(raster(2), AnimateMode::Simple, None, Some(DrawTag(3)), t0);

        comp.tick(t0 + ms(250));
        // Old surface untouched until the new one lands
        assert_eq!(comp.surface(1).unwrap().opacity(), 1.0);
        assert!(comp.take_finished().is_empty());

        comp.tick(t0 + ms(500));
        assert_eq!(comp.surface(1).unwrap().opacity(), 0.0);
        assert_eq!(comp.surface(0).unwrap().opacity(), 1.0);
        assert_eq!(comp.take_finished().len(), 1);
    }

    #[test]
    fn test_immediate_lands_on_draw() {
        let t0 = Instant::now();
        let mut comp = Compositor::new(100, 100, ms(500));
        comp.draw_frame(raster(1), AnimateMode::Immediate, None, Some(DrawTag(1)), t0);
        assert_eq!(comp.take_finished(), vec![DrawReport { tag: DrawTag(1), completed: true }]);
        assert_eq!(comp.visible().opacity(), 1.0);
    }

    #[test]
    fn test_new_draw_cancels_running_transition() {
        let t0 = Instant::now();
        let mut comp = Compositor::new(100, 100, ms(500));
        comp.draw_frame(raster(1), AnimateMode::Cross, None, Some(DrawTag(1)), t0);
        comp.tick(t0 + ms(100));
        comp.draw_frame(raster(2), AnimateMode::Cross, None, Some(DrawTag(2)), t0 + ms(100));

        assert_eq!(comp.take_finished(), vec![DrawReport { tag: DrawTag(1), completed: false }]);
        assert_eq!(comp.draw_count(), 2);

        comp.tick(t0 + ms(700));
        assert_eq!(comp.take_finished(), vec![DrawReport { tag: DrawTag(2), completed: true }]);
        assert_eq!(comp.visible().opacity(), 1.0);
        assert_eq!(comp.visible().raster().unwrap().get_pixel(0, 0).0[0], 2);
    }
}
